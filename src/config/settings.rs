//! Engine settings loading from `cobranca.toml`.
//!
//! Every section is optional. A missing file yields [`Settings::default`], while a
//! file that exists but does not parse is a configuration error.

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default settings file name, looked up in the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "cobranca.toml";

/// Structure of the whole settings file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Contract selection rules
    pub eligibility: EligibilitySettings,
    /// Goal projection defaults
    pub goals: GoalSettings,
    /// Export file locations
    pub export: ExportSettings,
}

/// Contract selection rules applied on top of the eligibility predicate
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EligibilitySettings {
    /// Carrier codes whose contracts are never distributed
    pub excluded_agencies: Vec<i32>,
    /// Contracts below this balance go to the non-distributable set
    pub min_balance: Option<Decimal>,
    /// Products whose contracts go to the non-distributable set
    pub excluded_products: Vec<String>,
}

impl Default for EligibilitySettings {
    fn default() -> Self {
        Self {
            excluded_agencies: vec![407, 422],
            min_balance: None,
            excluded_products: Vec::new(),
        }
    }
}

/// Goal projection defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoalSettings {
    /// Stretch factor used when the period has no goal row yet
    pub default_stretch: Decimal,
}

impl Default for GoalSettings {
    fn default() -> Self {
        Self {
            default_stretch: Decimal::ONE,
        }
    }
}

/// Export file locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Directory where export files are written
    pub output_dir: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("exports"),
        }
    }
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A value has the wrong type
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read {}: {e}", path.as_ref().display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path.as_ref().display()),
    })
}

/// Loads settings from `path`, falling back to defaults when the file does not exist.
pub fn load_settings_or_default<P: AsRef<Path>>(path: P) -> Result<Settings> {
    if path.as_ref().exists() {
        load_settings(path)
    } else {
        Ok(Settings::default())
    }
}
