//! Playlist resolution for playlist-dl
//!
//! Turns a playlist id into an ordered list of items by asking each
//! configured provider in turn, normalizing whatever shape the provider
//! answers with.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::config::{Config, FieldPaths, ProviderDescriptor, ResponseShape};
use crate::core::error::{Error, ProviderFailure, Result};
use crate::core::transport::Transport;

static ID_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"id=([0-9]+)").expect("valid regex"));
static TRAILING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)$").expect("valid regex"));

/// Failure detail for a provider that answered without any valid item
pub const NO_USABLE_ITEMS: &str = "returned no usable items";

/// A playlist entry in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedItem {
    pub title: String,
    pub artist: String,
    pub id: String,
}

impl ResolvedItem {
    /// Label used in progress reporting
    pub fn label(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

/// Pull a numeric id out of a URL-shaped value
///
/// Prefers an `id=<digits>` marker, then a trailing run of digits. Returns
/// an empty string when neither is present.
pub fn extract_id(url: &str) -> String {
    if let Some(captures) = ID_PARAM.captures(url) {
        return captures[1].to_string();
    }
    if let Some(captures) = TRAILING_DIGITS.captures(url) {
        return captures[1].to_string();
    }
    String::new()
}

/// Walk a dotted path such as `ar[0].name` through a JSON value
pub fn extract_path<'v>(value: &'v Value, path: &str) -> Result<&'v Value> {
    let mut current = value;
    let mut walked = String::new();

    for segment in path.split('.') {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);

        let (key, index) = match segment.split_once('[') {
            Some((key, rest)) => {
                let index = rest
                    .strip_suffix(']')
                    .and_then(|i| i.parse::<usize>().ok())
                    .ok_or_else(|| {
                        Error::ItemExtraction(format!("malformed index in path '{path}'"))
                    })?;
                (key, Some(index))
            }
            None => (segment, None),
        };

        if !key.is_empty() {
            current = current.get(key).ok_or_else(|| {
                Error::ItemExtraction(format!("no value at '{walked}' (path '{path}')"))
            })?;
        }
        if let Some(index) = index {
            current = current.get(index).ok_or_else(|| {
                Error::ItemExtraction(format!("no element at '{walked}' (path '{path}')"))
            })?;
        }
    }

    Ok(current)
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Map one raw entry onto a [`ResolvedItem`]
pub fn extract_item(raw: &Value, paths: &FieldPaths) -> Result<ResolvedItem> {
    let text_at = |path: &str| -> Result<String> {
        value_to_text(extract_path(raw, path)?)
            .ok_or_else(|| Error::ItemExtraction(format!("null value at '{path}'")))
    };

    let title = text_at(&paths.title)?;
    let artist = text_at(&paths.artist)?;

    let id = match extract_path(raw, &paths.id_or_url)? {
        Value::String(s) if s.contains("http") => extract_id(s),
        other => value_to_text(other).unwrap_or_default().trim().to_string(),
    };
    if id.is_empty() {
        return Err(Error::ItemExtraction(format!(
            "no id found at '{}' for '{title}'",
            paths.id_or_url
        )));
    }

    Ok(ResolvedItem { title, artist, id })
}

/// Locate the raw entry list according to the provider's declared shape
pub fn raw_entries<'v>(shape: ResponseShape, provider: &str, body: &'v Value) -> Result<&'v [Value]> {
    let mismatch = |detail: &str| Error::ShapeMismatch {
        provider: provider.to_string(),
        detail: detail.to_string(),
    };

    let tracks = match shape {
        ResponseShape::FlatList => body,
        ResponseShape::NestedResult => {
            if !body.is_object() {
                return Err(mismatch("expected a JSON object"));
            }
            body.get("result")
                .and_then(|result| result.get("tracks"))
                .or_else(|| body.get("tracks"))
                .ok_or_else(|| mismatch("missing 'result.tracks' and 'tracks'"))?
        }
    };

    tracks
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| mismatch("track list is not an array"))
}

/// Normalize a provider response body into items, skipping bad entries
pub fn normalize_response(provider: &ProviderDescriptor, body: &str) -> Result<Vec<ResolvedItem>> {
    let json: Value = serde_json::from_str(body).map_err(|e| Error::ShapeMismatch {
        provider: provider.name.clone(),
        detail: format!("response is not JSON: {e}"),
    })?;

    let entries = raw_entries(provider.response_shape, &provider.name, &json)?;

    let mut items = Vec::with_capacity(entries.len());
    for (index, raw) in entries.iter().enumerate() {
        match extract_item(raw, &provider.field_paths) {
            Ok(item) => items.push(item),
            Err(e) => warn!("{}: skipping entry {}: {e}", provider.name, index + 1),
        }
    }
    Ok(items)
}

/// Resolves playlist ids through the configured provider chain
pub struct Resolver {
    providers: Vec<ProviderDescriptor>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Resolver {
    pub fn new(providers: Vec<ProviderDescriptor>, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            providers,
            transport,
            timeout,
        }
    }

    /// Build a resolver from the loaded configuration
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::new(config.providers().to_vec(), transport, config.request_timeout())
    }

    /// Resolve `list_id` into items using the first provider that yields any
    ///
    /// The token is checked before each provider; an in-flight request is
    /// never interrupted.
    pub async fn resolve(&self, list_id: &str, cancel: &CancellationToken) -> Result<Vec<ResolvedItem>> {
        let mut failures = Vec::new();

        for provider in &self.providers {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match self.try_provider(provider, list_id).await {
                Ok(items) if !items.is_empty() => {
                    info!("Resolved {} items from {}", items.len(), provider.name);
                    return Ok(items);
                }
                Ok(_) => {
                    warn!("{} {NO_USABLE_ITEMS} for {list_id}", provider.name);
                    failures.push(ProviderFailure {
                        provider: provider.name.clone(),
                        detail: NO_USABLE_ITEMS.to_string(),
                    });
                }
                Err(e) => {
                    warn!("{} failed for {list_id}: {e}", provider.name);
                    failures.push(ProviderFailure {
                        provider: provider.name.clone(),
                        detail: e.to_string(),
                    });
                }
            }
        }

        Err(Error::AllProvidersExhausted {
            list_id: list_id.to_string(),
            failures,
        })
    }

    async fn try_provider(&self, provider: &ProviderDescriptor, list_id: &str) -> Result<Vec<ResolvedItem>> {
        let url = provider.request_url(list_id);
        debug!("Asking {} at {url}", provider.name);
        let body = self.transport.fetch(&url, self.timeout).await?;
        normalize_response(provider, &body)
    }
}
