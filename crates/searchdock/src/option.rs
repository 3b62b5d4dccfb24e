use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use searchdock_auth::{AuthConfig, AuthMode};
use searchdock_core::search::{FusionKind, FusionOptions};
use searchdock_core::{SearchOptions, VectorConfig};
use searchdock_indexer::IndexerDefaults;
use searchdock_types::index::HnswParameters;
use serde::Deserialize;

const DEFAULT_HTTP_ADDR: &str = "localhost:7750";
const DEFAULT_DATA_DIRECTORY: &str = "./searchdock-data";
const DEFAULT_ENV: &str = "development";
const POSSIBLE_ENV: [&str; 2] = ["development", "production"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fusion {
    #[default]
    Rrf,
    Weighted,
}

impl fmt::Display for Fusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fusion::Rrf => f.write_str("rrf"),
            Fusion::Weighted => f.write_str("weighted"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("`{0}` is not a valid fusion kind. Accepted values are `rrf` and `weighted`.")]
pub struct FusionError(String);

impl FromStr for Fusion {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rrf" => Ok(Fusion::Rrf),
            "weighted" => Ok(Fusion::Weighted),
            other => Err(FusionError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Parser, Deserialize)]
#[clap(version, next_display_order = None)]
#[serde(rename_all = "snake_case", default)]
pub struct Opt {
    /// Address the HTTP server binds to.
    #[clap(long, env = "SEARCHDOCK_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    pub http_addr: String,

    /// Root directory for all persisted state.
    #[clap(long, env = "SEARCHDOCK_DATA_DIRECTORY", default_value = DEFAULT_DATA_DIRECTORY)]
    pub data_directory: PathBuf,

    /// `development` includes inner error details in responses.
    #[clap(long, env = "SEARCHDOCK_ENV", default_value = DEFAULT_ENV, value_parser = POSSIBLE_ENV)]
    #[serde(default = "default_env")]
    pub env: String,

    /// API key granting full access.
    #[clap(long, env = "SEARCHDOCK_ADMIN_API_KEY")]
    pub admin_api_key: Option<String>,

    /// API key granting query-only access.
    #[clap(long, env = "SEARCHDOCK_QUERY_API_KEY")]
    pub query_api_key: Option<String>,

    /// Comma-separated authentication modes: `apiKey`, `simulated`, `entraId`.
    #[clap(
        long,
        env = "SEARCHDOCK_AUTH_ENABLED_MODES",
        default_value = "apiKey,simulated",
        value_delimiter = ','
    )]
    pub authentication_enabled_modes: Vec<AuthMode>,

    /// When both credentials are present, a valid API key wins.
    #[clap(long, env = "SEARCHDOCK_AUTH_API_KEY_TAKES_PRECEDENCE", default_value_t = true)]
    #[serde(default = "default_true")]
    pub authentication_api_key_takes_precedence: bool,

    #[clap(long, env = "SEARCHDOCK_MAX_INDEXES", default_value_t = 50)]
    #[serde(default = "default_max_indexes")]
    pub max_indexes: usize,

    #[clap(long, env = "SEARCHDOCK_MAX_DOCUMENTS_PER_INDEX", default_value_t = 100_000)]
    #[serde(default = "default_max_documents_per_index")]
    pub max_documents_per_index: u64,

    #[clap(long, env = "SEARCHDOCK_MAX_FIELDS_PER_INDEX", default_value_t = 1000)]
    #[serde(default = "default_max_fields_per_index")]
    pub max_fields_per_index: usize,

    #[clap(long, env = "SEARCHDOCK_DEFAULT_PAGE_SIZE", default_value_t = 50)]
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    #[clap(long, env = "SEARCHDOCK_MAX_PAGE_SIZE", default_value_t = 1000)]
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Use HNSW graphs for vector fields that request them; `false` forces
    /// brute-force scans everywhere.
    #[clap(long, env = "SEARCHDOCK_VECTOR_USE_HNSW", default_value_t = true)]
    #[serde(default = "default_true")]
    pub vector_use_hnsw: bool,

    #[clap(long, env = "SEARCHDOCK_VECTOR_HNSW_M", default_value_t = 16)]
    #[serde(default = "default_hnsw_m")]
    pub vector_hnsw_m: usize,

    #[clap(long, env = "SEARCHDOCK_VECTOR_HNSW_EF_CONSTRUCTION", default_value_t = 200)]
    #[serde(default = "default_hnsw_ef_construction")]
    pub vector_hnsw_ef_construction: usize,

    #[clap(long, env = "SEARCHDOCK_VECTOR_HNSW_EF_SEARCH", default_value_t = 64)]
    #[serde(default = "default_hnsw_ef_search")]
    pub vector_hnsw_ef_search: usize,

    #[clap(long, env = "SEARCHDOCK_VECTOR_HNSW_OVERSAMPLE_MULTIPLIER", default_value_t = 4)]
    #[serde(default = "default_oversample")]
    pub vector_hnsw_oversample_multiplier: usize,

    /// Hybrid fusion strategy: `rrf` or `weighted`.
    #[clap(long, env = "SEARCHDOCK_VECTOR_HYBRID_FUSION", default_value_t = Fusion::Rrf)]
    pub vector_hybrid_fusion: Fusion,

    #[clap(long, env = "SEARCHDOCK_VECTOR_HYBRID_RRF_K", default_value_t = 60.0)]
    #[serde(default = "default_rrf_k")]
    pub vector_hybrid_rrf_k: f64,

    #[clap(long, env = "SEARCHDOCK_VECTOR_HYBRID_TEXT_WEIGHT", default_value_t = 0.3)]
    #[serde(default = "default_text_weight")]
    pub vector_hybrid_text_weight: f64,

    #[clap(long, env = "SEARCHDOCK_VECTOR_HYBRID_VECTOR_WEIGHT", default_value_t = 0.7)]
    #[serde(default = "default_vector_weight")]
    pub vector_hybrid_vector_weight: f64,

    /// Run the background scheduler that triggers scheduled indexers.
    #[clap(long, env = "SEARCHDOCK_INDEXER_ENABLE_SCHEDULER", default_value_t = true)]
    #[serde(default = "default_true")]
    pub indexer_enable_scheduler: bool,

    #[clap(long, env = "SEARCHDOCK_INDEXER_DEFAULT_BATCH_SIZE", default_value_t = 100)]
    #[serde(default = "default_batch_size")]
    pub indexer_default_batch_size: usize,

    #[clap(long, env = "SEARCHDOCK_INDEXER_DEFAULT_TIMEOUT_MINUTES", default_value_t = 5)]
    #[serde(default = "default_timeout_minutes")]
    pub indexer_default_timeout_minutes: u64,

    /// Log directives, e.g. `info` or `searchdock=debug,tantivy=warn`.
    #[clap(long, env = "SEARCHDOCK_LOG_LEVEL", default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// TOML configuration file; explicitly-set flags and env vars override
    /// its values.
    #[clap(long, env = "SEARCHDOCK_CONFIG_FILE_PATH")]
    #[serde(skip)]
    pub config_file_path: Option<PathBuf>,
}

impl Default for Opt {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            data_directory: PathBuf::from(DEFAULT_DATA_DIRECTORY),
            env: DEFAULT_ENV.to_string(),
            admin_api_key: None,
            query_api_key: None,
            authentication_enabled_modes: vec![AuthMode::ApiKey, AuthMode::Simulated],
            authentication_api_key_takes_precedence: true,
            max_indexes: default_max_indexes(),
            max_documents_per_index: default_max_documents_per_index(),
            max_fields_per_index: default_max_fields_per_index(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            vector_use_hnsw: true,
            vector_hnsw_m: default_hnsw_m(),
            vector_hnsw_ef_construction: default_hnsw_ef_construction(),
            vector_hnsw_ef_search: default_hnsw_ef_search(),
            vector_hnsw_oversample_multiplier: default_oversample(),
            vector_hybrid_fusion: Fusion::Rrf,
            vector_hybrid_rrf_k: default_rrf_k(),
            vector_hybrid_text_weight: default_text_weight(),
            vector_hybrid_vector_weight: default_vector_weight(),
            indexer_enable_scheduler: true,
            indexer_default_batch_size: default_batch_size(),
            indexer_default_timeout_minutes: default_timeout_minutes(),
            log_level: default_log_level(),
            config_file_path: None,
        }
    }
}

impl Opt {
    /// Build the effective options: CLI and env values, with a TOML config
    /// file (when given) supplying anything left at its default.
    pub fn try_build() -> anyhow::Result<Opt> {
        let cli = Opt::parse();
        let Some(path) = cli.config_file_path.clone() else { return Ok(cli) };

        let content = fs::read_to_string(&path)?;
        let mut merged: Opt = toml::from_str(&content)?;
        merged.config_file_path = Some(path);

        // anything the caller set explicitly wins over the file
        let defaults = Opt::default();
        macro_rules! keep_cli {
            ($($field:ident),* $(,)?) => {
                $(if cli.$field != defaults.$field {
                    merged.$field = cli.$field.clone();
                })*
            };
        }
        keep_cli!(
            http_addr,
            data_directory,
            env,
            admin_api_key,
            query_api_key,
            authentication_enabled_modes,
            authentication_api_key_takes_precedence,
            max_indexes,
            max_documents_per_index,
            max_fields_per_index,
            default_page_size,
            max_page_size,
            vector_use_hnsw,
            vector_hnsw_m,
            vector_hnsw_ef_construction,
            vector_hnsw_ef_search,
            vector_hnsw_oversample_multiplier,
            vector_hybrid_fusion,
            vector_hybrid_rrf_k,
            vector_hybrid_text_weight,
            vector_hybrid_vector_weight,
            indexer_enable_scheduler,
            indexer_default_batch_size,
            indexer_default_timeout_minutes,
            log_level,
        );
        Ok(merged)
    }

    pub fn is_development(&self) -> bool {
        self.env == "development"
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            admin_api_key: self.admin_api_key.clone(),
            query_api_key: self.query_api_key.clone(),
            enabled_modes: self.authentication_enabled_modes.clone(),
            api_key_takes_precedence: self.authentication_api_key_takes_precedence,
        }
    }

    pub fn vector_config(&self) -> VectorConfig {
        VectorConfig {
            use_hnsw: self.vector_use_hnsw,
            oversample_multiplier: self.vector_hnsw_oversample_multiplier,
            default_hnsw: HnswParameters {
                m: self.vector_hnsw_m,
                ef_construction: self.vector_hnsw_ef_construction,
                ef_search: self.vector_hnsw_ef_search,
                metric: Default::default(),
            },
        }
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
            fusion: FusionOptions {
                kind: match self.vector_hybrid_fusion {
                    Fusion::Rrf => FusionKind::ReciprocalRank,
                    Fusion::Weighted => FusionKind::Weighted,
                },
                rrf_k: self.vector_hybrid_rrf_k,
                text_weight: self.vector_hybrid_text_weight,
                vector_weight: self.vector_hybrid_vector_weight,
            },
        }
    }

    pub fn indexer_defaults(&self) -> IndexerDefaults {
        IndexerDefaults {
            batch_size: self.indexer_default_batch_size,
            max_failed_items: 0,
            run_timeout: Duration::from_secs(self.indexer_default_timeout_minutes * 60),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_indexes() -> usize {
    50
}
fn default_max_documents_per_index() -> u64 {
    100_000
}
fn default_max_fields_per_index() -> usize {
    1000
}
fn default_page_size() -> usize {
    50
}
fn default_max_page_size() -> usize {
    1000
}
fn default_hnsw_m() -> usize {
    16
}
fn default_hnsw_ef_construction() -> usize {
    200
}
fn default_hnsw_ef_search() -> usize {
    64
}
fn default_oversample() -> usize {
    4
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_text_weight() -> f64 {
    0.3
}
fn default_vector_weight() -> f64 {
    0.7
}
fn default_batch_size() -> usize {
    100
}
fn default_timeout_minutes() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_env() -> String {
    DEFAULT_ENV.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let opt = Opt::default();
        assert_eq!(opt.http_addr, DEFAULT_HTTP_ADDR);
        assert_eq!(opt.default_page_size, 50);
        assert!(opt.is_development());
        assert_eq!(opt.vector_hybrid_fusion, Fusion::Rrf);
        assert_eq!(
            opt.authentication_enabled_modes,
            vec![AuthMode::ApiKey, AuthMode::Simulated]
        );
    }

    #[test]
    fn fusion_parses() {
        assert_eq!("weighted".parse::<Fusion>().unwrap(), Fusion::Weighted);
        assert!("blend".parse::<Fusion>().is_err());
    }
}
