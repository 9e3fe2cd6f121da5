//! Download location lookup for playlist-dl

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::core::config::{Config, LocationResponseType, LocationSource};
use crate::core::error::Result;
use crate::core::transport::Transport;

/// Asks the location source where an item's content can be fetched
pub struct LocationFetcher {
    source: LocationSource,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl LocationFetcher {
    pub fn new(source: LocationSource, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            source,
            transport,
            timeout,
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::new(config.location().clone(), transport, config.request_timeout())
    }

    /// Fetch the location for `item_id`
    ///
    /// An empty string means the source answered without a location; the
    /// caller decides whether that is fatal. Quality is not validated here.
    pub async fn fetch_location(&self, item_id: &str, quality: Option<&str>) -> Result<String> {
        let quality = quality.unwrap_or(&self.source.default_quality);
        let url = self.source.request_url(item_id, quality);
        debug!("Looking up location for {item_id} ({quality})");

        let body = self.transport.fetch(&url, self.timeout).await?;

        let location = match self.source.response_type {
            LocationResponseType::Text => body.trim().to_string(),
            LocationResponseType::Json => {
                let json: Value = serde_json::from_str(&body)?;
                json.get(&self.source.url_field)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string()
            }
        };
        Ok(location)
    }
}
