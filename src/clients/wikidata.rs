//! Wikipedia URL to Wikidata item resolution.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use url::Url;

use super::http::{body_text, json_client, send_with_retry, RetryMode};
use super::StableIdLookup;

/// Blocking lookup against the Wikidata `wbgetentities` action.
#[derive(Clone)]
pub struct WikidataLookup {
    client: Client,
    endpoint: String,
    max_retries: usize,
}

impl WikidataLookup {
    /// Builds a lookup client for the given action API endpoint.
    pub fn new(endpoint: String, timeout: Duration, max_retries: usize) -> Result<Self> {
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "Wikidata endpoint must be an http(s) URL"
        );
        let client = json_client(HeaderMap::new(), timeout, "Wikidata")?;
        Ok(Self {
            client,
            endpoint,
            max_retries,
        })
    }
}

impl StableIdLookup for WikidataLookup {
    fn resolve(&self, external_ref: &str) -> Result<Option<String>> {
        let Some(link) = SiteLink::from_url(external_ref) else {
            return Ok(None);
        };
        let resp = send_with_retry(
            self.max_retries,
            RetryMode::Idempotent,
            "Wikidata",
            || {
                self.client.get(&self.endpoint).query(&[
                    ("action", "wbgetentities"),
                    ("format", "json"),
                    ("props", "info"),
                    ("normalize", "1"),
                    ("sites", link.site.as_str()),
                    ("titles", link.title.as_str()),
                ])
            },
        )?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Wikidata lookup failed ({}): {}", status, body_text(resp));
        }
        let parsed: EntitiesResponse = resp
            .json()
            .with_context(|| format!("failed to parse Wikidata response for {external_ref}"))?;
        parsed.into_item_id()
    }
}

/// Wikipedia site code and article title extracted from an article URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SiteLink {
    site: String,
    title: String,
}

impl SiteLink {
    fn from_url(raw: &str) -> Option<Self> {
        let url = Url::parse(raw.trim()).ok()?;
        let host = url.host_str()?;
        let lang = host
            .strip_suffix(".wikipedia.org")?
            .trim_end_matches(".m");
        if lang.is_empty() || lang.contains('.') {
            return None;
        }
        let segment = url.path().strip_prefix("/wiki/")?;
        let title = decode_title(segment);
        if title.trim().is_empty() {
            return None;
        }
        Some(Self {
            site: format!("{}wiki", lang.replace('-', "_")),
            title,
        })
    }
}

fn decode_title(segment: &str) -> String {
    // Path segments may carry raw `+`, `&` or `=`; keep them literal before
    // running the form decoder.
    let escaped = segment
        .replace('+', "%2B")
        .replace('&', "%26")
        .replace('=', "%3D");
    url::form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(title, _)| title.replace('_', " "))
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    #[serde(default)]
    entities: HashMap<String, EntityStub>,
    #[serde(default)]
    error: Option<ApiError>,
}

impl EntitiesResponse {
    fn into_item_id(self) -> Result<Option<String>> {
        if let Some(error) = self.error {
            anyhow::bail!("Wikidata returned {}: {}", error.code, error.info);
        }
        Ok(self
            .entities
            .into_values()
            .filter(|entity| entity.missing.is_none())
            .find_map(|entity| entity.id))
    }
}

#[derive(Debug, Deserialize)]
struct EntityStub {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    missing: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}
