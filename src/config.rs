//! Pipeline limits and the command-line surface shared by binaries.

use clap::Parser;
use std::time::Duration;

use crate::model::DocumentRef;

/// Maximum UTF-8 bytes submitted in a single entity-analysis call.
pub const BYTE_LIMIT: usize = 1_000_000;
/// Group size for every batched catalog request.
pub const BULK_LIMIT: usize = 25;

/// Tunable knobs that bound per-document processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    byte_limit: usize,
    bulk_limit: usize,
}

impl PipelineConfig {
    /// Constructs a new config; both limits are clamped to at least 1.
    pub fn new(byte_limit: usize, bulk_limit: usize) -> Self {
        Self {
            byte_limit: byte_limit.max(1),
            bulk_limit: bulk_limit.max(1),
        }
    }

    /// Maximum encoded bytes per chunk.
    pub fn byte_limit(&self) -> usize {
        self.byte_limit
    }

    /// Maximum items per catalog request.
    pub fn bulk_limit(&self) -> usize {
        self.bulk_limit
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            byte_limit: BYTE_LIMIT,
            bulk_limit: BULK_LIMIT,
        }
    }
}

/// Command-line interface for the extraction binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "docentity",
    version,
    about = "Extract entities from documents and record their occurrences"
)]
pub struct Cli {
    /// Document ids to process, in order (repeatable or comma separated)
    #[arg(
        long = "document",
        env = "DOCENTITY_DOCUMENTS",
        value_delimiter = ',',
        required = true
    )]
    pub documents: Vec<u64>,

    /// Base URL of the DocumentCloud API
    #[arg(
        long,
        env = "DOCENTITY_DOCUMENTCLOUD_API",
        default_value = "https://api.www.documentcloud.org/api/"
    )]
    pub documentcloud_api: String,

    /// Bearer token used for DocumentCloud calls
    #[arg(long, env = "DOCUMENTCLOUD_TOKEN", hide_env_values = true)]
    pub documentcloud_token: String,

    /// Google Cloud API key for the Natural Language API
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: String,

    /// Entity analysis endpoint
    #[arg(
        long,
        env = "DOCENTITY_GOOGLE_ENDPOINT",
        default_value = "https://language.googleapis.com/v1/documents:analyzeEntities"
    )]
    pub google_endpoint: String,

    /// Wikidata action API endpoint
    #[arg(
        long,
        env = "DOCENTITY_WIKIDATA_ENDPOINT",
        default_value = "https://www.wikidata.org/w/api.php"
    )]
    pub wikidata_endpoint: String,

    /// Seconds before any remote request times out
    #[arg(long, env = "DOCENTITY_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Retries after the first attempt for rate limits or transient errors
    #[arg(long, env = "DOCENTITY_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: usize,

    /// Maximum UTF-8 bytes per analysis call
    #[arg(long, env = "DOCENTITY_BYTE_LIMIT", default_value_t = BYTE_LIMIT)]
    pub byte_limit: usize,

    /// Items per batched catalog request
    #[arg(long, env = "DOCENTITY_BULK_LIMIT", default_value_t = BULK_LIMIT)]
    pub bulk_limit: usize,
}

impl Cli {
    /// Converts the parsed CLI into a `PipelineConfig`.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new(self.byte_limit, self.bulk_limit)
    }

    /// Requested documents, duplicates removed while keeping order.
    pub fn document_refs(&self) -> Vec<DocumentRef> {
        let mut seen = std::collections::HashSet::new();
        self.documents
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .map(DocumentRef::new)
            .collect()
    }

    /// Per-request timeout for every HTTP client.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}
