
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use crate::VidsearchError;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("duration pattern is valid")
});

/// A single item in the caller-supplied catalog snapshot. IDs are opaque,
/// stable, and externally assigned; the snapshot is treated as authoritative
/// for the duration of one rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub published_at: DateTime<Utc>,
    /// ISO-8601 duration as supplied by the upstream API, e.g. `PT4M13S`.
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub is_live_content: bool,
    #[serde(default)]
    pub is_short: bool,
}

impl CatalogItem {
    /// Seconds represented by the ISO-8601 duration string. Malformed input
    /// yields 0 rather than an error.
    #[inline]
    pub fn duration_seconds(&self) -> u64 {
        parse_duration_seconds(&self.duration)
    }

    /// Human-readable content-type label used in embedding payloads.
    #[inline]
    pub fn content_type_label(&self) -> &'static str {
        if self.is_live_content {
            "live stream"
        } else if self.is_short {
            "short video"
        } else {
            "regular video"
        }
    }
}

/// Parse an ISO-8601 `PT#H#M#S` duration into seconds.
#[inline]
pub fn parse_duration_seconds(duration: &str) -> u64 {
    let Ok(Some(caps)) = DURATION_RE.captures(duration) else {
        return 0;
    };

    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };

    part(1) * 3600 + part(2) * 60 + part(3)
}

/// Render an ISO-8601 duration as `H:MM:SS` or `M:SS`.
#[inline]
pub fn format_duration(duration: &str) -> String {
    let total = parse_duration_seconds(duration);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Load a catalog snapshot from a JSON file containing an array of items.
/// Duplicate IDs violate the snapshot invariant and are rejected.
#[inline]
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Vec<CatalogItem>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog snapshot: {}", path.display()))?;

    let items: Vec<CatalogItem> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalog snapshot: {}", path.display()))?;

    let mut seen = HashSet::new();
    for item in &items {
        if !seen.insert(item.id.as_str()) {
            return Err(VidsearchError::Catalog(format!(
                "duplicate item id in snapshot: {}",
                item.id
            ))
            .into());
        }
    }

    debug!("Loaded catalog snapshot with {} items", items.len());
    Ok(items)
}
