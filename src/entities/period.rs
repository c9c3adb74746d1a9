//! Period entity - an evaluation window `[dt_begin, dt_end]` inside an edital.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Period database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "periods")]
pub struct Model {
    /// Unique identifier, referenced by every per-period table
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Edital this period belongs to
    pub edital_id: i32,
    /// Business key of the period within its edital
    pub period_no: i32,
    /// First day of the window (inclusive)
    pub dt_begin: Date,
    /// Last day of the window (inclusive)
    pub dt_end: Date,
    /// When the row was created
    pub created_at: DateTime,
    /// When the row was last modified
    pub updated_at: Option<DateTime>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime>,
}

/// Each period belongs to one edital
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::edital::Entity",
        from = "Column::EditalId",
        to = "super::edital::Column::Id"
    )]
    Edital,
}

impl Related<super::edital::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Edital.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
