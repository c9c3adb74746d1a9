//! Agreement entity - a repayment plan linking a contract to an agency.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an agreement. Only [`AgreementState::Active`] affects distribution.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum AgreementState {
    /// Being paid
    #[sea_orm(num_value = 1)]
    Active,
    /// Fully paid
    #[sea_orm(num_value = 2)]
    Settled,
    /// Broken by the debtor
    #[sea_orm(num_value = 3)]
    Broken,
    /// Cancelled administratively
    #[sea_orm(num_value = 4)]
    Cancelled,
}

/// Agreement database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "agreements")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Contract under the agreement
    pub contract_id: i64,
    /// Agency that negotiated the agreement
    pub agency_id: i32,
    /// Current state
    pub state: AgreementState,
    /// When the row was created
    pub created_at: DateTime,
    /// When the row was last modified
    pub updated_at: Option<DateTime>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime>,
}

/// Each agreement belongs to one contract
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::contract::Entity",
        from = "Column::ContractId",
        to = "super::contract::Column::ContractId"
    )]
    Contract,
}

impl Related<super::contract::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contract.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
