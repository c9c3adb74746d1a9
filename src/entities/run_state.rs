//! Run state entity - key/value progress records for resumable runs.
//!
//! Keys look like `"distribution:{edital}:{period}"`; the value holds the
//! run's reference date and the last committed phase.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Run state database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "run_state")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Run key
    #[sea_orm(unique)]
    pub key: String,
    /// Progress value, `"YYYY-MM-DD|phase"`
    pub value: String,
    /// When this record was last modified
    pub updated_at: DateTime,
}

/// `RunState` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
