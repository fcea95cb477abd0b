//! Engine process configuration.
//!
//! `APP_ENV` (dev/prod/local/test) selects `configurations/<env>.ini`;
//! environment variables prefixed `MINIFLOW__` override file values
//! (`MINIFLOW__DATABASE__URL=…`), and a bare `DB_TYPE` overrides the
//! database kind. Each section deserializes into the owning crate's config
//! struct, so every handler key documented there works here.

use miniflow_resolver::TypeAliases;
use miniflow_scheduler::{InputHandlerConfig, OutputHandlerConfig, QueueTopology};
use serde::Deserialize;

/// Expected value of the `[test] value` self-check key.
const CONFIG_TEST_VALUE: &str = "ThisKeyIsForConfigTest";

/// Database settings (the `[database]` section).
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Database kind; only `postgresql` is served.
    #[serde(default = "default_db_type")]
    pub db_type: String,
    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_type() -> String {
    "postgresql".to_string()
}

fn default_max_connections() -> u32 {
    10
}

/// Script storage settings (the `[resources]` section).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Directory holding `global_scripts/` and `custom_scripts/`.
    pub root: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            root: "resources".to_string(),
        }
    }
}

/// Config self-check section; guards against a wrong or corrupted file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestSection {
    /// Must equal the well-known test value.
    #[serde(default)]
    pub value: Option<String>,
}

/// The whole engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Worker queue topology.
    pub queue: QueueTopology,
    /// Input handler settings.
    #[serde(default)]
    pub input_handler: InputHandlerConfig,
    /// Output handler settings.
    #[serde(default)]
    pub output_handler: OutputHandlerConfig,
    /// Resolver type-alias sets.
    #[serde(default)]
    pub scheduler_service: TypeAliases,
    /// Script storage settings.
    #[serde(default)]
    pub resources: ResourceConfig,
    /// Config self-check.
    #[serde(default)]
    pub test: TestSection,
}

impl EngineConfig {
    /// Loads configuration for the current `APP_ENV`.
    ///
    /// # Errors
    ///
    /// Returns an error when `APP_ENV` is unknown, the file is missing,
    /// a value fails to parse, the self-check key mismatches, or the
    /// database kind is unsupported.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let app_env = app_env.to_ascii_lowercase();

        if !matches!(app_env.as_str(), "dev" | "prod" | "local" | "test") {
            return Err(config::ConfigError::Message(format!(
                "invalid APP_ENV value '{app_env}'. Expected one of: dev, prod, local, test"
            )));
        }

        let mut engine_config: Self = config::Config::builder()
            .add_source(config::File::new(
                &format!("configurations/{app_env}.ini"),
                config::FileFormat::Ini,
            ))
            .add_source(
                config::Environment::with_prefix("MINIFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if let Ok(db_type) = std::env::var("DB_TYPE") {
            engine_config.database.db_type = db_type;
        }

        engine_config.validate()?;
        Ok(engine_config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.test.value.as_deref() != Some(CONFIG_TEST_VALUE) {
            return Err(config::ConfigError::Message(
                "configuration self-check failed: [test] value mismatch, \
                 the file may be corrupted or for another deployment"
                    .to_string(),
            ));
        }

        if self.database.db_type != "postgresql" {
            return Err(config::ConfigError::Message(format!(
                "unsupported db_type '{}': only postgresql is supported",
                self.database.db_type
            )));
        }

        Ok(())
    }
}
