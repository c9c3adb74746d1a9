//! Non-distributable residue entity - contracts that passed the eligibility
//! predicate but were held back by a configured exclusion rule.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Residue row with the reason the contract was held back
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "non_distributable_contracts")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Edital of the run that held the contract back
    pub edital_id: i32,
    /// Period of the run that held the contract back
    pub period_id: i32,
    /// Contract held back
    pub contract_id: i64,
    /// Debtor CPF or CNPJ
    pub cpf_cnpj: String,
    /// Outstanding balance at selection time
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub balance: Decimal,
    /// Exclusion rule that matched (e.g. `"PRODUTO EXCLUIDO: CCFACIL"`)
    pub reason: String,
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
