//! Agency monthly goal entity - targets per agency per competence.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Agency monthly goal database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "agency_monthly_goals")]
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
    /// Agency
    pub agency_id: i32,
    /// Competence, `YYYY-MM`
    pub competence: String,
    /// Collection target
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub arrecadacao: Decimal,
    /// Bonus target, 5% of `arrecadacao`
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub bonificacao: Decimal,
    /// Actuation target, not computed
    pub actuation: Option<i32>,
    /// Liquidation target, not computed
    pub liquidation: Option<i32>,
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
