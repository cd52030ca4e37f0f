use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::FulfillmentStatus;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_BOARD_API_URL: &str = "https://api.monday.com/v2";
const DEFAULT_BOARD_API_VERSION: &str = "2024-10";
const DEFAULT_BOARD_TIMEOUT_SECS: u64 = 30;
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// JWT secret key used to verify bearer tokens
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// School year used for new orders; the current calendar year when unset
    #[serde(default)]
    pub school_year: Option<i32>,

    #[serde(default)]
    pub board: BoardConfig,
}

/// Connection and schema mapping for the external order-tracking board.
#[derive(Clone, Debug, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_board_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_token: String,

    #[serde(default = "default_board_api_version")]
    pub api_version: String,

    #[serde(default = "default_board_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub orders_board_id: String,

    #[serde(default)]
    pub orders_group_id: Option<String>,

    #[serde(default)]
    pub columns: OrderColumnMapping,

    #[serde(default)]
    pub subitem_columns: SubitemColumnMapping,

    /// Board label to fulfillment status. Empty means the built-in table.
    #[serde(default)]
    pub status_labels: HashMap<String, FulfillmentStatus>,

    /// Label written to the status column of freshly pushed orders
    #[serde(default)]
    pub submitted_label: Option<String>,

    #[serde(default)]
    pub presale: PreSaleImportConfig,

    #[serde(default)]
    pub inventory: Option<InventoryBoardConfig>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_board_api_url(),
            api_token: String::new(),
            api_version: default_board_api_version(),
            request_timeout_secs: DEFAULT_BOARD_TIMEOUT_SECS,
            orders_board_id: String::new(),
            orders_group_id: None,
            columns: OrderColumnMapping::default(),
            subitem_columns: SubitemColumnMapping::default(),
            status_labels: HashMap::new(),
            submitted_label: None,
            presale: PreSaleImportConfig::default(),
            inventory: None,
        }
    }
}

/// Column ids on the orders board for each order field. Unset fields are not written.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderColumnMapping {
    pub student: Option<String>,
    pub grade: Option<String>,
    pub guardian: Option<String>,
    pub email: Option<String>,
    pub total: Option<String>,
    pub status: Option<String>,
    pub books: Option<String>,
    pub date: Option<String>,
    pub order_reference: Option<String>,
}

/// Column ids on order subitems (one per book line).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubitemColumnMapping {
    pub code: Option<String>,
    pub quantity: Option<String>,
    pub price: Option<String>,
    /// Status column read by manual reconciliation
    pub status: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PreSaleImportConfig {
    /// Status column that flags board items ready for import
    pub trigger_column: Option<String>,
    #[serde(default = "default_ready_label")]
    pub ready_label: String,
    #[serde(default = "default_done_label")]
    pub done_label: String,
    /// Text column holding the student name; the item name is used when unset
    pub student_column: Option<String>,
    pub grade_column: Option<String>,
}

impl Default for PreSaleImportConfig {
    fn default() -> Self {
        Self {
            trigger_column: None,
            ready_label: default_ready_label(),
            done_label: default_done_label(),
            student_column: None,
            grade_column: None,
        }
    }
}

/// Secondary board counting orders per title.
#[derive(Clone, Debug, Deserialize)]
pub struct InventoryBoardConfig {
    pub board_id: String,
    pub group_id: Option<String>,
    /// Item column holding the book code
    pub code_column: String,
    pub subitem_quantity_column: Option<String>,
    pub subitem_student_column: Option<String>,
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Checks if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// School year new orders belong to.
    pub fn current_school_year(&self) -> i32 {
        use chrono::Datelike;
        self.school_year
            .unwrap_or_else(|| chrono::Utc::now().year())
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.board.enabled {
            if self.board.api_token.trim().is_empty() {
                let mut err = ValidationError::new("board_api_token_required");
                err.message = Some("Set APP__BOARD__API_TOKEN or disable the board".into());
                errors.add("board", err);
            }
            if self.board.orders_board_id.trim().is_empty() {
                let mut err = ValidationError::new("board_orders_board_id_required");
                err.message = Some("Set APP__BOARD__ORDERS_BOARD_ID or disable the board".into());
                errors.add("board", err);
            }
            if self.board.request_timeout_secs == 0 {
                errors.add("board", ValidationError::new("board_request_timeout_zero"));
            }
        }

        if let Some(inventory) = &self.board.inventory {
            if inventory.board_id.trim().is_empty() || inventory.code_column.trim().is_empty() {
                let mut err = ValidationError::new("inventory_board_incomplete");
                err.message = Some("Inventory board needs board_id and code_column".into());
                errors.add("board", err);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Runs field and cross-field validation.
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.validate_additional_constraints()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_board_api_url() -> String {
    DEFAULT_BOARD_API_URL.to_string()
}

fn default_board_api_version() -> String {
    DEFAULT_BOARD_API_VERSION.to_string()
}

fn default_board_timeout_secs() -> u64 {
    DEFAULT_BOARD_TIMEOUT_SECS
}

fn default_ready_label() -> String {
    "Listo para importar".to_string()
}

fn default_done_label() -> String {
    "Importado".to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("textbook_orders={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

fn base_builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Config::builder()
        .set_default("database_url", "sqlite://textbook_orders.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = base_builder()?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET environment variable.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate_all().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!(
        board_enabled = app_config.board.enabled,
        inventory_board = app_config.board.inventory.is_some(),
        "Configuration loaded successfully"
    );
    Ok(app_config)
}
