//! Limit entity - per-agency ceiling for one `(edital, period, criterion)`.
//!
//! For every rowset of one criterion, `final_percent` over the active agencies
//! sums to exactly 100.00.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Limit database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "distribution_limits")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Edital
    pub edital_id: i32,
    /// Period
    pub period_id: i32,
    /// Agency the ceiling applies to
    pub agency_id: i32,
    /// Criterion code (7 for the initial distribution, 8 and up for redistributions)
    pub criterion: i32,
    /// Maximum number of contracts
    pub max_count: i64,
    /// Maximum outstanding balance
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub max_value: Decimal,
    /// Share of the distribution, two decimals
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub final_percent: Decimal,
    /// Revenue (or prior share) the percentage was computed from
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub revenue: Decimal,
    /// Date the ceiling was computed
    pub apuration_date: Date,
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
