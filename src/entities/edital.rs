//! Edital entity - a procurement cycle under which agencies compete.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Edital database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "editais")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Public edital number
    pub nu_edital: i32,
    /// Year the edital was published
    pub year: i32,
    /// Free-form description
    pub description: String,
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
