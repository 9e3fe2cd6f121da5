//! Configuration store for playlist-dl
//!
//! Loads the provider list and the location source from a JSON document,
//! validates it once, and rewrites the document when the request interval
//! changes.

use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{Error, Result};
use crate::core::transport::RetryPolicy;

/// Default spacing between outbound requests, in milliseconds
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 1000;

/// Default per-request timeout, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of transport attempts per request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Placeholder substituted with the playlist id
pub const LIST_ID_PLACEHOLDER: &str = "{list_id}";

/// Placeholder substituted with the song id
pub const SONG_ID_PLACEHOLDER: &str = "{song_id}";

/// Placeholder substituted with the requested quality
pub const QUALITY_PLACEHOLDER: &str = "{quality}";

/// How a provider lays out its playlist response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// Root is already an array of item objects
    FlatList,
    /// Root is an object holding `result.tracks` or `tracks`
    #[default]
    NestedResult,
}

/// Where each item field lives inside one raw playlist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPaths {
    #[serde(rename = "song_name")]
    pub title: String,
    pub artist: String,
    #[serde(rename = "song_id")]
    pub id_or_url: String,
}

/// One playlist provider, in fallback priority order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    #[serde(rename = "request_format")]
    pub request_template: String,
    #[serde(default)]
    pub response_shape: ResponseShape,
    #[serde(rename = "data_paths")]
    pub field_paths: FieldPaths,
}

impl ProviderDescriptor {
    /// Build the request URL for a playlist id
    pub fn request_url(&self, list_id: &str) -> String {
        self.request_template.replace(LIST_ID_PLACEHOLDER, list_id)
    }
}

/// How the location source encodes its answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationResponseType {
    /// Trimmed body is the location
    Text,
    /// Location is a named field of a JSON object
    Json,
}

fn default_url_field() -> String {
    "url".to_string()
}

fn default_request_interval() -> u64 {
    DEFAULT_REQUEST_INTERVAL_MS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// The single source used to turn an item id into a download location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSource {
    #[serde(rename = "request_format")]
    pub request_template: String,
    pub response_type: LocationResponseType,
    #[serde(default = "default_url_field")]
    pub url_field: String,
    pub default_quality: String,
    pub quality_options: Vec<String>,
    /// Minimum spacing between requests, in milliseconds
    #[serde(default = "default_request_interval")]
    pub request_interval: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl LocationSource {
    /// Build the request URL for a song id and quality
    pub fn request_url(&self, song_id: &str, quality: &str) -> String {
        self.request_template
            .replace(SONG_ID_PLACEHOLDER, song_id)
            .replace(QUALITY_PLACEHOLDER, quality)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Apis {
    playlists: Vec<ProviderDescriptor>,
    song_download: LocationSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Document {
    apis: Apis,
}

/// Validated configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    providers: Vec<ProviderDescriptor>,
    location: LocationSource,
}

impl Config {
    /// Build a configuration from parts, applying the same validation as `load`
    pub fn new(providers: Vec<ProviderDescriptor>, location: LocationSource) -> Result<Self> {
        let config = Self {
            providers,
            location,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration document
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a configuration document
    pub fn from_json(text: &str) -> Result<Self> {
        let document: Document = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("invalid configuration document: {e}")))?;
        Self::new(document.apis.playlists, document.apis.song_download)
    }

    fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(Error::Config(
                "apis.playlists must list at least one provider".to_string(),
            ));
        }

        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(Error::Config("provider with empty name".to_string()));
            }
            if !provider.request_template.contains(LIST_ID_PLACEHOLDER) {
                return Err(Error::Config(format!(
                    "provider '{}': request_format lacks {LIST_ID_PLACEHOLDER}",
                    provider.name
                )));
            }
            let paths = &provider.field_paths;
            for (key, value) in [
                ("song_name", &paths.title),
                ("artist", &paths.artist),
                ("song_id", &paths.id_or_url),
            ] {
                if value.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "provider '{}': data_paths.{key} is empty",
                        provider.name
                    )));
                }
            }
        }

        let location = &self.location;
        if !location.request_template.contains(SONG_ID_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "song_download.request_format lacks {SONG_ID_PLACEHOLDER}"
            )));
        }
        if location.quality_options.is_empty() {
            return Err(Error::Config(
                "song_download.quality_options is empty".to_string(),
            ));
        }
        if !location.quality_options.contains(&location.default_quality) {
            return Err(Error::Config(format!(
                "song_download.default_quality '{}' is not one of {:?}",
                location.default_quality, location.quality_options
            )));
        }
        if location.max_attempts == 0 {
            return Err(Error::Config(
                "song_download.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Providers in fallback priority order
    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /// The location source descriptor
    pub fn location(&self) -> &LocationSource {
        &self.location
    }

    /// Minimum spacing between outbound requests
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.location.request_interval)
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.location.request_timeout_secs)
    }

    /// Transport retry policy derived from the request interval
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.location.max_attempts, self.request_interval())
    }

    /// Configured quality values
    pub fn quality_options(&self) -> &[String] {
        &self.location.quality_options
    }

    /// Quality used when the caller does not pick one
    pub fn default_quality(&self) -> &str {
        &self.location.default_quality
    }

    /// Whether `quality` is one of the configured values
    pub fn is_valid_quality(&self, quality: &str) -> bool {
        self.location.quality_options.iter().any(|q| q == quality)
    }

    /// Persist a new request interval
    ///
    /// Reads the whole document at `path`, replaces
    /// `apis.song_download.request_interval` and writes the document back,
    /// keeping keys this crate does not model.
    pub fn set_request_interval(&mut self, path: impl AsRef<Path>, interval_ms: u64) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut document: Value = serde_json::from_str(&text)?;

        let song_download = document
            .get_mut("apis")
            .and_then(|apis| apis.get_mut("song_download"))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                Error::Config(format!("{} has no apis.song_download object", path.display()))
            })?;
        song_download.insert("request_interval".to_string(), Value::from(interval_ms));

        let rendered = serde_json::to_string_pretty(&document)?;
        std::fs::write(path, rendered)?;

        self.location.request_interval = interval_ms;
        info!("Request interval set to {interval_ms} ms");
        Ok(())
    }
}
