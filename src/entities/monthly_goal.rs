//! Monthly goal entity - SISCOR value and business days per competence.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Monthly goal database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monthly_goals")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Projection date
    pub dt_ref: Date,
    /// Edital
    pub edital_id: i32,
    /// Period
    pub period_id: i32,
    /// Competence, `YYYY-MM`
    pub competence: String,
    /// SISCOR budget value for the month
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub siscor_value: Decimal,
    /// Business days of the full month
    pub business_days: i32,
    /// Business days of the month inside the period window
    pub period_business_days: i32,
    /// Period meta for the month after the stretch factor
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub stretched_value: Decimal,
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
