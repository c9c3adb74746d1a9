//! Period goal entity - the period-level SISCOR total and stretch factor.
//!
//! A new row is appended whenever the stretch factor changes; the latest
//! `dt_ref` wins.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Period goal database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "period_goals")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Date from which the goal applies
    pub dt_ref: Date,
    /// Edital
    pub edital_id: i32,
    /// Period
    pub period_id: i32,
    /// Sum of the monthly SISCOR values attributed to the period
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub siscor_total: Decimal,
    /// Business days inside the period window
    pub business_days: i32,
    /// Multiplier applied to the period meta
    #[sea_orm(column_type = "Decimal(Some((6, 4)))")]
    pub stretch_factor: Decimal,
    /// Stretched value distributed among agencies
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub distributable_value: Decimal,
    /// Distributable value per business day
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub per_business_day: Decimal,
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
