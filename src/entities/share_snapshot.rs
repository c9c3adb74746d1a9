//! Share snapshot entity - per-agency saldo devedor and percent at a `dt_ref`.
//!
//! A period has the initial snapshot plus one per mid-period exit.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Share snapshot database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "share_snapshots")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Date from which the snapshot is in effect
    pub dt_ref: Date,
    /// Edital
    pub edital_id: i32,
    /// Period
    pub period_id: i32,
    /// Agency
    pub agency_id: i32,
    /// Outstanding balance held by the agency
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub saldo_devedor: Decimal,
    /// Share percentage
    #[sea_orm(column_type = "Decimal(Some((12, 8)))")]
    pub percent: Decimal,
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
