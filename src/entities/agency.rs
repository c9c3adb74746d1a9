//! Agency entity - an external collection firm (*assessoria*).
//!
//! The primary key is the agency's business code, which is also what the
//! operational export files carry.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Agency database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "agencies")]
pub struct Model {
    /// Business code of the agency
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    /// Legal name
    pub name: String,
    /// Abbreviated name used in reports and file names
    pub short_name: String,
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
