//! Distributable set entity - contracts eligible for allocation in the current run.
//!
//! This is process-wide working state; only the distribution run mutates it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Working-set row
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "distributable_contracts")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Contract in the set
    pub contract_id: i64,
    /// Debtor CPF or CNPJ
    pub cpf_cnpj: String,
    /// Outstanding balance at selection time
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub balance: Decimal,
    /// When the row was created
    pub created_at: DateTime,
    /// When the row was last modified
    pub updated_at: Option<DateTime>,
    /// Stamped when the pipeline places the contract
    pub deleted_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
