//! Contract entity - read-only operational view of a delinquent contract.
//!
//! `credit_status` 1 means active credit. `current_agency_id` is the agency
//! currently collecting the contract, if any.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Credit status value for an active credit.
pub const CREDIT_STATUS_ACTIVE: i32 = 1;

/// Contract database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contracts")]
pub struct Model {
    /// Operational contract identifier (`fkContratoSISCTR`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub contract_id: i64,
    /// Human-facing contract number
    pub contract_no: String,
    /// Debtor CPF or CNPJ, digits only
    pub debtor_cpf_cnpj: String,
    /// Outstanding balance
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub outstanding_balance: Decimal,
    /// Credit status code
    pub credit_status: i32,
    /// Agency currently collecting the contract
    pub current_agency_id: Option<i32>,
    /// Short product name
    pub product: String,
    /// Days past due
    pub days_overdue: i32,
    /// When the row was created
    pub created_at: DateTime,
    /// When the row was last modified
    pub updated_at: Option<DateTime>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
