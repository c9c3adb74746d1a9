//! Calendar entity - one row per day with a precomputed working-day flag.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Calendar day database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "calendar_days")]
pub struct Model {
    /// The day
    #[sea_orm(primary_key, auto_increment = false)]
    pub date: Date,
    /// Year of `date`, indexed for month lookups
    pub year: i32,
    /// Month of `date` (1-12)
    pub month: i32,
    /// Whether the day counts as a business day
    pub is_business_day: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
