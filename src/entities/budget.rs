//! Budget entity - SISCOR monthly budget figures by budget phase.
//!
//! Several phases may exist for one month; the highest phase is the one in force.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Budget database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Year and month as `YYYYMM`
    pub year_month: i32,
    /// Budget phase; later phases supersede earlier ones
    pub phase: i32,
    /// Budgeted amount
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub amount: Decimal,
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
