//! DocumentCloud client: page text loading and the entity catalog.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::http::{body_text, json_client, send_with_retry, RetryMode};
use super::{EntityCatalog, PageTextSource, SubmitError, TextError};
use crate::model::{CatalogEntry, CatalogId, DocumentRef, OccurrenceRecord, Page};

const DEFAULT_ASSET_URL: &str = "https://s3.documentcloud.org/";

/// Blocking client for the DocumentCloud REST API.
#[derive(Clone)]
pub struct DocumentCloudClient {
    api: Client,
    assets: Client,
    api_base: Url,
    max_retries: usize,
}

impl DocumentCloudClient {
    /// Builds a new client.
    ///
    /// # Arguments
    /// * `token` - Bearer access token (usually from `DOCUMENTCLOUD_TOKEN`)
    /// * `api_base` - API root, e.g. `https://api.www.documentcloud.org/api/`
    pub fn new(
        token: String,
        api_base: String,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!token.trim().is_empty(), "missing DocumentCloud token");
        let mut base = api_base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let api_base = Url::parse(&base).context("invalid DocumentCloud API URL")?;
        anyhow::ensure!(
            matches!(api_base.scheme(), "http" | "https"),
            "DocumentCloud API must be an http(s) URL"
        );

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", token.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid DocumentCloud token")?,
        );
        let api = json_client(headers, timeout, "DocumentCloud")?;
        // Asset storage rejects foreign Authorization headers.
        let assets = json_client(HeaderMap::new(), timeout, "DocumentCloud assets")?;
        Ok(Self {
            api,
            assets,
            api_base,
            max_retries,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .with_context(|| format!("invalid DocumentCloud path {path}"))
    }

    fn get_paginated<T: DeserializeOwned>(&self, first: Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let resp = send_with_retry(
                self.max_retries,
                RetryMode::Idempotent,
                "DocumentCloud",
                || self.api.get(url.clone()),
            )?;
            let status = resp.status();
            if !status.is_success() {
                anyhow::bail!(
                    "DocumentCloud GET {} failed ({}): {}",
                    url,
                    status,
                    body_text(resp)
                );
            }
            let page: Paginated<T> = resp
                .json()
                .with_context(|| format!("failed to parse DocumentCloud page {url}"))?;
            items.extend(page.results);
            next = match page.next {
                Some(link) if link != url.as_str() => {
                    Some(Url::parse(&link).context("invalid pagination link")?)
                }
                _ => None,
            };
        }
        Ok(items)
    }

    fn document_meta(&self, document: &DocumentRef) -> Result<DocumentMeta, TextError> {
        let url = self.endpoint(&format!("documents/{}/", document.id))?;
        let resp = send_with_retry(
            self.max_retries,
            RetryMode::Idempotent,
            "DocumentCloud",
            || self.api.get(url.clone()),
        )?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TextError::Missing {
                document: *document,
            });
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "DocumentCloud document lookup failed ({}): {}",
                status,
                body_text(resp)
            )
            .into());
        }
        let meta = resp
            .json()
            .with_context(|| format!("failed to parse metadata for document {document}"))?;
        Ok(meta)
    }
}

impl PageTextSource for DocumentCloudClient {
    fn page_texts(&self, document: &DocumentRef) -> Result<Vec<Page>, TextError> {
        let meta = self.document_meta(document)?;
        if meta.status.as_deref().is_some_and(|status| status != "success") {
            return Err(TextError::Missing {
                document: *document,
            });
        }
        debug!(
            document = document.id,
            title = meta.title.as_deref().unwrap_or(""),
            "loading page text"
        );

        let asset_base = meta.asset_url.as_deref().unwrap_or(DEFAULT_ASSET_URL);
        let url = Url::parse(asset_base)
            .and_then(|base| base.join(&format!("documents/{}/{}.txt.json", meta.id, meta.slug)))
            .context("invalid DocumentCloud asset URL")?;
        let resp = send_with_retry(
            self.max_retries,
            RetryMode::Idempotent,
            "DocumentCloud assets",
            || self.assets.get(url.clone()),
        )?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            return Err(TextError::Missing {
                document: *document,
            });
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "DocumentCloud text download failed ({}): {}",
                status,
                body_text(resp)
            )
            .into());
        }
        let text: DocumentText = resp
            .json()
            .with_context(|| format!("failed to parse text for document {document}"))?;
        Ok(text.into_pages())
    }
}

impl EntityCatalog for DocumentCloudClient {
    fn find_entities(&self, stable_ids: &[&str]) -> Result<Vec<CatalogEntry>> {
        if stable_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut url = self.endpoint("entities/")?;
        url.query_pairs_mut()
            .append_pair("wikidata_id__in", &stable_ids.join(","));
        self.get_paginated(url)
    }

    fn create_entities(&self, stable_ids: &[&str]) -> Result<Vec<CatalogEntry>> {
        if stable_ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.endpoint("entities/")?;
        let body: Vec<NewEntity<'_>> = stable_ids
            .iter()
            .map(|&wikidata_id| NewEntity { wikidata_id })
            .collect();
        let resp = send_with_retry(
            self.max_retries,
            RetryMode::Write,
            "DocumentCloud",
            || self.api.post(url.clone()).json(&body),
        )?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!(
                "DocumentCloud entity creation failed ({}): {}",
                status,
                body_text(resp)
            );
        }
        resp.json()
            .context("failed to parse DocumentCloud entity creation response")
    }

    fn document_entities(&self, document: &DocumentRef) -> Result<Vec<CatalogId>> {
        let url = self.endpoint(&format!("documents/{}/entities/", document.id))?;
        let rows: Vec<DocumentEntityRow> = self.get_paginated(url)?;
        Ok(rows.into_iter().map(|row| row.entity.id()).collect())
    }

    fn submit_occurrences(
        &self,
        document: &DocumentRef,
        records: &[OccurrenceRecord],
    ) -> Result<(), SubmitError> {
        let url = self.endpoint(&format!("documents/{}/entities/", document.id))?;
        let resp = send_with_retry(
            self.max_retries,
            RetryMode::Write,
            "DocumentCloud",
            || self.api.post(url.clone()).json(records),
        )?;
        let status = resp.status();
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::BAD_REQUEST => Err(SubmitError::Validation {
                status,
                body: body_text(resp),
            }),
            StatusCode::FORBIDDEN => Err(SubmitError::Permission {
                status,
                body: body_text(resp),
            }),
            _ => Err(anyhow::anyhow!(
                "DocumentCloud occurrence submission failed ({}): {}",
                status,
                body_text(resp)
            )
            .into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Paginated<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DocumentMeta {
    id: u64,
    slug: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    asset_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentText {
    pages: Vec<TextPage>,
}

impl DocumentText {
    /// Sorts by page number and renumbers by position, so gaps in the
    /// asset never shift offsets onto the wrong page.
    fn into_pages(self) -> Vec<Page> {
        let mut pages = self.pages;
        pages.sort_by_key(|page| page.page);
        pages
            .into_iter()
            .enumerate()
            .map(|(position, page)| Page::new(position, page.contents))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct TextPage {
    page: usize,
    #[serde(default)]
    contents: String,
}

#[derive(Serialize)]
struct NewEntity<'a> {
    wikidata_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct DocumentEntityRow {
    entity: EntityField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EntityField {
    Id(CatalogId),
    Expanded { id: CatalogId },
}

impl EntityField {
    fn id(self) -> CatalogId {
        match self {
            Self::Id(id) | Self::Expanded { id } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn text_pages_are_sorted() {
        let body = r#"{"updated": 1, "pages": [
            {"page": 1, "contents": "second"},
            {"page": 0, "contents": "first"}
        ]}"#;
        let text: DocumentText = serde_json::from_str(body).unwrap();
        assert_eq!(
            text.into_pages(),
            vec![Page::new(0, "first"), Page::new(1, "second")]
        );
    }

    #[test]
    fn pages_are_renumbered_by_position() {
        let body = r#"{"pages": [
            {"page": 4, "contents": "later"},
            {"page": 1, "contents": "earlier"}
        ]}"#;
        let text: DocumentText = serde_json::from_str(body).unwrap();
        assert_eq!(
            text.into_pages(),
            vec![Page::new(0, "earlier"), Page::new(1, "later")]
        );
    }

    #[test]
    fn document_entity_rows_accept_both_shapes() {
        let body = r#"{"next": null, "results": [
            {"entity": 3, "relevance": 0.2},
            {"entity": {"id": 5, "wikidata_id": "Q5", "name": "Human"}, "relevance": 0.1}
        ]}"#;
        let page: Paginated<DocumentEntityRow> = serde_json::from_str(body).unwrap();
        let ids: Vec<CatalogId> = page.results.into_iter().map(|row| row.entity.id()).collect();
        assert_eq!(ids, vec![CatalogId(3), CatalogId(5)]);
    }

    #[test]
    fn endpoint_joins_under_api_root() {
        let client = DocumentCloudClient::new(
            "token".into(),
            "https://api.example.test/api".into(),
            Duration::from_secs(1),
            1,
        )
        .unwrap();
        assert_eq!(
            client.endpoint("documents/7/entities/").unwrap().as_str(),
            "https://api.example.test/api/documents/7/entities/"
        );
    }

    #[test]
    fn new_entity_payload_shape() {
        let body = vec![NewEntity { wikidata_id: "Q1" }];
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!([{"wikidata_id": "Q1"}])
        );
    }
}
