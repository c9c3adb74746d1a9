//! Distribution entity - immutable assignment of a contract to an agency.
//!
//! Rows are append-only per `dt_ref`: a redistribution adds new rows with its
//! own date and leaves the earlier ones in place for history.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Distribution database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "distributions")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Reference date of the run that produced the row
    pub dt_ref: Date,
    /// Edital of the run
    pub edital_id: i32,
    /// Period of the run
    pub period_id: i32,
    /// Assigned contract
    pub contract_id: i64,
    /// Receiving agency
    pub agency_id: i32,
    /// Criterion code explaining the assignment
    pub criterion: i32,
    /// Debtor CPF or CNPJ
    pub cpf_cnpj: String,
    /// Outstanding balance at assignment time
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub balance: Decimal,
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
