//! Google Cloud Natural Language entity analysis client.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{body_text, json_client, send_with_retry, RetryMode};
use super::{AnalyzedEntity, AnalyzedMention, EntityAnalyzer};

/// Blocking client for the `documents:analyzeEntities` endpoint.
#[derive(Clone)]
pub struct GoogleEntityAnalyzer {
    client: Client,
    endpoint: String,
    api_key: String,
    max_retries: usize,
}

impl GoogleEntityAnalyzer {
    /// Builds a new analysis client.
    ///
    /// # Arguments
    /// * `api_key` - Google Cloud API key (usually from `GOOGLE_API_KEY`)
    /// * `endpoint` - Full method URL, e.g. `https://language.googleapis.com/v1/documents:analyzeEntities`
    pub fn new(
        api_key: String,
        endpoint: String,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Google API key");
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "Google endpoint must be an http(s) URL"
        );
        let client = json_client(HeaderMap::new(), timeout, "Google Natural Language")?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.trim().to_string(),
            max_retries,
        })
    }
}

impl EntityAnalyzer for GoogleEntityAnalyzer {
    fn analyze(&self, text: &str) -> Result<Vec<AnalyzedEntity>> {
        let request = AnalyzeRequest {
            document: RequestDocument {
                kind: "PLAIN_TEXT",
                content: text,
            },
            encoding_type: "UTF32",
        };
        let resp = send_with_retry(
            self.max_retries,
            RetryMode::Idempotent,
            "Google Natural Language",
            || {
                self.client
                    .post(&self.endpoint)
                    .query(&[("key", self.api_key.as_str())])
                    .json(&request)
            },
        )?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!(
                "Google entity analysis failed ({}): {}",
                status,
                body_text(resp)
            );
        }
        let parsed: AnalyzeResponse = resp
            .json()
            .context("failed to parse Google entity analysis response")?;
        debug!(
            entities = parsed.entities.len(),
            language = parsed.language.as_deref().unwrap_or("unknown"),
            "analyzed chunk"
        );
        Ok(parsed.into_entities())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    document: RequestDocument<'a>,
    encoding_type: &'a str,
}

#[derive(Serialize)]
struct RequestDocument<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    entities: Vec<ResponseEntity>,
    #[serde(default)]
    language: Option<String>,
}

impl AnalyzeResponse {
    fn into_entities(self) -> Vec<AnalyzedEntity> {
        self.entities
            .into_iter()
            .map(|entity| AnalyzedEntity {
                name: entity.name,
                external_ref: entity
                    .metadata
                    .wikipedia_url
                    .filter(|url| !url.trim().is_empty()),
                salience: entity.salience,
                mentions: entity
                    .mentions
                    .into_iter()
                    .map(|mention| AnalyzedMention {
                        content: mention.text.content,
                        begin_offset: mention.text.begin_offset,
                    })
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ResponseEntity {
    name: String,
    #[serde(default)]
    salience: f64,
    #[serde(default)]
    metadata: EntityMetadata,
    #[serde(default)]
    mentions: Vec<ResponseMention>,
}

#[derive(Debug, Default, Deserialize)]
struct EntityMetadata {
    #[serde(default)]
    wikipedia_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMention {
    text: TextSpan,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextSpan {
    content: String,
    #[serde(default)]
    begin_offset: usize,
}
