//! Criterion entity - description of each selection criterion code.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Criterion database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "criteria")]
pub struct Model {
    /// Criterion code as stored on distribution and limit rows
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: i32,
    /// Description printed in analytical files
    pub description: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
