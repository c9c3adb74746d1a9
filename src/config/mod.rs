/// Database configuration and connection management
pub mod database;

/// Engine settings loaded from `cobranca.toml`
pub mod settings;
