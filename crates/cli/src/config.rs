use config::{Config, ConfigError, Environment, File};
use engine::platform::PageSelectors;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub collection: CollectionConfig,
    pub surface: SurfaceConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CollectionConfig {
    /// Settle delay after clear, select and compute.
    pub delay_ms: u64,
    pub read_retries: u32,
    pub header: bool,
    /// Ask before runs estimated to take longer than this.
    pub confirm_above_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SurfaceConfig {
    pub webdriver_url: String,
    pub page_url: String,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub selectors: PageSelectors,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExportConfig {
    pub format: String,
    pub out_dir: PathBuf,
    pub file_stem: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub format: LoggingFormatConfig,
    pub levels: LoggingLevelsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingFormatConfig {
    pub show_time: bool,
    #[serde(default)]
    pub json: bool,
    pub location: LoggingLocationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLocationConfig {
    pub show_file: bool,
    pub show_line: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLevelsConfig {
    pub debug: bool,
    pub info: bool,
    pub warning: bool,
    pub error: bool,
    pub critical: bool,
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    load_config_from(Path::new(&manifest_dir))
}

fn load_config_from(base_path: &Path) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .set_default("collection.delay_ms", 10)?
        .set_default("collection.read_retries", 0)?
        .set_default("collection.header", true)?
        .set_default("collection.confirm_above_secs", 600)?
        .set_default("surface.webdriver_url", "http://localhost:4444")?
        .set_default("surface.page_url", "https://pokemondb.net/tools/type-coverage")?
        .set_default("surface.request_timeout_ms", 30_000)?
        .set_default("export.format", "csv")?
        .set_default("export.out_dir", ".")?
        .set_default("export.file_stem", "type-coverage")?
        .set_default("logging.format.show_time", true)?
        .set_default("logging.format.json", false)?
        .set_default("logging.format.location.show_file", false)?
        .set_default("logging.format.location.show_line", false)?
        .set_default("logging.levels.debug", false)?
        .set_default("logging.levels.info", true)?
        .set_default("logging.levels.warning", true)?
        .set_default("logging.levels.error", true)?
        .set_default("logging.levels.critical", true)?
        // Shipped defaults next to the manifest, then the working directory
        .add_source(File::from(base_path.join("typecov_config.yaml")).required(false))
        .add_source(File::with_name("typecov_config.yaml").required(false))
        // Local override
        .add_source(File::with_name(".typecov_config.yaml").required(false))
        // Map nested env vars like TYPECOV__COLLECTION__DELAY_MS=25
        .add_source(
            Environment::with_prefix("TYPECOV")
                .separator("__")
                .try_parsing(true),
        );

    builder.build()?.try_deserialize()
}
