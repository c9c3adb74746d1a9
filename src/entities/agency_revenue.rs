//! Agency revenue entity - amounts collected by an agency, dated.
//!
//! Share computation sums these over the prior period's window.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Agency revenue database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "agency_revenues")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Agency that collected the amount
    pub agency_id: i32,
    /// Collection date
    pub collected_on: Date,
    /// Amount collected
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
