//! Runtime settings.
//!
//! Sources, later ones winning: built-in defaults, an optional YAML file,
//! then environment variables. The API key is not part of [`Settings`]; the
//! provider reads it from `GOOGLE_API_KEY` through its credential loader.
//!
//! ```yaml
//! gemini_model: gemini-3-flash-preview
//! output_dir: ./output
//! max_regenerations: 3
//! request_timeout: 2m
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::providers::{GenerationConfig, TransportPolicy};

/// Errors loading settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// All tunables of the pipeline and extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Model for analysis, generation and judging
    pub gemini_model: String,

    /// Model for illustrations
    pub image_model: String,

    /// Root of every artifact written
    pub output_dir: PathBuf,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Most zoom/crop code-execution steps the model is told it may take
    pub max_vision_actions: u32,

    /// Generation attempts per image
    pub max_regenerations: u32,

    /// Extracted page items below this confidence are dropped
    pub min_confidence: f64,

    pub temperature: f32,

    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,

    /// Resends of a request after a transient error
    pub transport_retries: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_model: "gemini-3-flash-preview".to_string(),
            image_model: "gemini-3-pro-image-preview".to_string(),
            output_dir: PathBuf::from("./output"),
            log_level: "info".to_string(),
            max_vision_actions: 5,
            max_regenerations: 3,
            min_confidence: 0.7,
            temperature: 0.7,
            request_timeout: Duration::from_secs(120),
            transport_retries: 2,
        }
    }
}

impl Settings {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, SettingsError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Override fields from environment variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("GEMINI_MODEL") {
            self.gemini_model = v;
        }
        if let Some(v) = get("IMAGE_MODEL") {
            self.image_model = v;
        }
        if let Some(v) = get("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("MAX_VISION_ACTIONS") {
            self.max_vision_actions = parse_number("MAX_VISION_ACTIONS", &v)?;
        }
        if let Some(v) = get("MAX_REGENERATIONS") {
            self.max_regenerations = parse_number("MAX_REGENERATIONS", &v)?;
        }
        if let Some(v) = get("MIN_CONFIDENCE") {
            self.min_confidence = parse_number("MIN_CONFIDENCE", &v)?;
        }
        if let Some(v) = get("TEMPERATURE") {
            self.temperature = parse_number("TEMPERATURE", &v)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT") {
            self.request_timeout = humantime::parse_duration(&v).map_err(|e| SettingsError::InvalidValue {
                key: "REQUEST_TIMEOUT",
                value: v.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(v) = get("TRANSPORT_RETRIES") {
            self.transport_retries = parse_number("TRANSPORT_RETRIES", &v)?;
        }
        Ok(())
    }

    /// Range checks that serde cannot express.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(SettingsError::InvalidValue {
                key: "min_confidence",
                value: self.min_confidence.to_string(),
                reason: "must be between 0 and 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(SettingsError::InvalidValue {
                key: "temperature",
                value: self.temperature.to_string(),
                reason: "must be between 0 and 2".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(SettingsError::InvalidValue {
                key: "request_timeout",
                value: "0s".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Call settings for the analysis model.
    pub fn vision_config(&self) -> GenerationConfig {
        GenerationConfig {
            model: self.gemini_model.clone(),
            temperature: self.temperature,
            timeout: self.request_timeout,
            code_execution: false,
            image_output: false,
        }
    }

    /// Call settings for the illustration model.
    pub fn image_config(&self) -> GenerationConfig {
        GenerationConfig {
            model: self.image_model.clone(),
            image_output: true,
            ..self.vision_config()
        }
    }

    pub fn transport_policy(&self) -> TransportPolicy {
        TransportPolicy::with_retries(self.transport_retries)
    }
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T, SettingsError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| SettingsError::InvalidValue {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn serialize_duration<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&humantime::format_duration(*d).to_string())
}

fn deserialize_duration<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(d)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}
