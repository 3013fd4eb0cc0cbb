//! Ingest service configuration
//!
//! Three layers, later wins: built-in defaults, the platform config file,
//! environment variables. Credentials come exclusively from the
//! environment; thresholds and paths can live in the file. The loaded
//! value is immutable and handed to each stage at construction.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use corkboard_common::config::{
    default_data_folder, default_database_path, find_config_file, resolve_data_folder,
};
use corkboard_common::{Error, Result};

pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_MODERATION_MODEL: &str = "gpt-4o-mini";

/// Complete runtime configuration for the ingest service
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// SQLite database location
    pub database_path: PathBuf,

    /// OpenAI API key; powers extraction and moderation
    pub openai_api_key: Option<String>,
    pub openai_vision_model: String,
    pub openai_moderation_model: String,
    pub extraction_timeout_secs: u64,
    pub moderation_timeout_secs: u64,

    /// Mapbox API key; absent selects the deterministic stub geocoder
    pub mapbox_api_key: Option<String>,
    pub geocoding_timeout_secs: u64,

    /// Score at or above which an appropriate candidate auto-publishes
    pub auto_publish_threshold: f64,

    /// Geocode confidence at or above which venue locations are written
    pub geo_confidence_threshold: f64,

    /// Upload size cap in bytes
    pub max_image_bytes: usize,

    /// Domain suffix for calendar-export UIDs
    pub ics_uid_domain: String,

    /// PRODID line for calendar exports
    pub ics_prod_id: String,

    /// Event bus buffer size
    pub event_bus_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let data_folder = default_data_folder();
        Self {
            database_path: default_database_path(&data_folder),
            openai_api_key: None,
            openai_vision_model: DEFAULT_VISION_MODEL.to_string(),
            openai_moderation_model: DEFAULT_MODERATION_MODEL.to_string(),
            extraction_timeout_secs: 90,
            moderation_timeout_secs: 15,
            mapbox_api_key: None,
            geocoding_timeout_secs: 10,
            auto_publish_threshold: 0.80,
            geo_confidence_threshold: 0.75,
            max_image_bytes: 18 * 1024 * 1024,
            ics_uid_domain: "corkboard.app".to_string(),
            ics_prod_id: "-//Corkboard//Ingest//EN".to_string(),
            event_bus_capacity: 256,
        }
    }
}

/// Partial overrides read from the TOML config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    openai_vision_model: Option<String>,
    openai_moderation_model: Option<String>,
    extraction_timeout_secs: Option<u64>,
    moderation_timeout_secs: Option<u64>,
    geocoding_timeout_secs: Option<u64>,
    auto_publish_threshold: Option<f64>,
    geo_confidence_threshold: Option<f64>,
    max_image_bytes: Option<usize>,
    ics_uid_domain: Option<String>,
    ics_prod_id: Option<String>,
    event_bus_capacity: Option<usize>,
}

impl IngestConfig {
    /// Load and validate the full configuration
    ///
    /// `cli_data_folder` is the command-line override for the data folder;
    /// the database lands inside the resolved folder unless a config key
    /// or `CORKBOARD_DATABASE_PATH` names an explicit file.
    pub fn load(cli_data_folder: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        let data_folder =
            resolve_data_folder(cli_data_folder, "CORKBOARD_DATA_FOLDER", Some("data_folder"))?;
        config.database_path = default_database_path(&data_folder);

        if let Ok(path) = find_config_file() {
            let content = std::fs::read_to_string(&path)?;
            config.apply_file_content(&content, &path.display().to_string())?;
            tracing::debug!(path = %path.display(), "Applied config file");
        }

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file_content(&mut self, content: &str, origin: &str) -> Result<()> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", origin, e)))?;

        if let Some(v) = file.database_path {
            self.database_path = v;
        }
        if let Some(v) = file.openai_vision_model {
            self.openai_vision_model = v;
        }
        if let Some(v) = file.openai_moderation_model {
            self.openai_moderation_model = v;
        }
        if let Some(v) = file.extraction_timeout_secs {
            self.extraction_timeout_secs = v;
        }
        if let Some(v) = file.moderation_timeout_secs {
            self.moderation_timeout_secs = v;
        }
        if let Some(v) = file.geocoding_timeout_secs {
            self.geocoding_timeout_secs = v;
        }
        if let Some(v) = file.auto_publish_threshold {
            self.auto_publish_threshold = v;
        }
        if let Some(v) = file.geo_confidence_threshold {
            self.geo_confidence_threshold = v;
        }
        if let Some(v) = file.max_image_bytes {
            self.max_image_bytes = v;
        }
        if let Some(v) = file.ics_uid_domain {
            self.ics_uid_domain = v;
        }
        if let Some(v) = file.ics_prod_id {
            self.ics_prod_id = v;
        }
        if let Some(v) = file.event_bus_capacity {
            self.event_bus_capacity = v;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.openai_api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("MAPBOX_API_KEY") {
            if !key.trim().is_empty() {
                self.mapbox_api_key = Some(key);
            }
        }
        if let Ok(path) = std::env::var("CORKBOARD_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(v) = std::env::var("CORKBOARD_VISION_MODEL") {
            self.openai_vision_model = v;
        }
        if let Ok(v) = std::env::var("CORKBOARD_MODERATION_MODEL") {
            self.openai_moderation_model = v;
        }
        self.auto_publish_threshold =
            env_f64("CORKBOARD_AUTO_PUBLISH_THRESHOLD", self.auto_publish_threshold)?;
        self.geo_confidence_threshold =
            env_f64("CORKBOARD_GEO_CONFIDENCE_THRESHOLD", self.geo_confidence_threshold)?;
        Ok(())
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.auto_publish_threshold) {
            return Err(Error::Config(format!(
                "auto_publish_threshold must be in [0, 1], got {}",
                self.auto_publish_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.geo_confidence_threshold) {
            return Err(Error::Config(format!(
                "geo_confidence_threshold must be in [0, 1], got {}",
                self.geo_confidence_threshold
            )));
        }
        if self.max_image_bytes == 0 {
            return Err(Error::Config("max_image_bytes must be positive".to_string()));
        }
        if self.extraction_timeout_secs == 0
            || self.moderation_timeout_secs == 0
            || self.geocoding_timeout_secs == 0
        {
            return Err(Error::Config("capability timeouts must be positive".to_string()));
        }
        if self.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be positive".to_string()));
        }
        if self.ics_uid_domain.trim().is_empty() {
            return Err(Error::Config("ics_uid_domain must not be empty".to_string()));
        }
        Ok(())
    }

    /// Directory the database file lives in, for startup creation
    pub fn database_dir(&self) -> Option<&Path> {
        self.database_path.parent()
    }
}

fn env_f64(name: &str, current: f64) -> Result<f64> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| Error::Config(format!("{} is not a number: {}", name, value))),
        Err(_) => Ok(current),
    }
}
