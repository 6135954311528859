use std::collections::BTreeMap;
use std::env;

use crate::Platform;

/// Process-wide configuration loaded once from environment variables at
/// startup (`spec.md` §6, §9 — "initialize them once at startup from
/// configuration; never mutate at runtime").
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub vector_db_url: String,

    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_base_url: Option<String>,
    pub embedding_api_key: String,
    pub embedding_model: String,

    pub halfday_merge_min_occurrence: u32,
    pub halfday_merge_similarity_threshold: f64,
    pub halfday_merge_jaccard_threshold: f64,
    pub halfday_merge_llm_confidence: f64,

    pub global_merge_topk_candidates: usize,
    pub global_merge_min_similarity: f64,
    pub global_merge_confidence_threshold: f64,
    pub global_merge_max_batch_size: usize,
    pub global_merge_concurrent: usize,
    pub global_merge_new_topic_keep_ratio: f64,

    pub summary_concurrent_size: usize,

    pub platform_weights: BTreeMap<Platform, f64>,
}

impl Config {
    /// Load configuration from environment variables. Panics with a clear
    /// message if a required var is missing, matching the teacher's
    /// `Config::from_env` convention.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            vector_db_url: env::var("VECTOR_DB_URL").unwrap_or_else(|_| required_env("DATABASE_URL")),

            llm_api_key: required_env("LLM_API_KEY"),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_base_url: env::var("LLM_BASE_URL").ok(),
            embedding_api_key: env::var("EMBEDDING_API_KEY").unwrap_or_else(|_| required_env("LLM_API_KEY")),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),

            halfday_merge_min_occurrence: parse_env_or("HALFDAY_MERGE_MIN_OCCURRENCE", 2),
            halfday_merge_similarity_threshold: parse_env_or(
                "HALFDAY_MERGE_SIMILARITY_THRESHOLD",
                0.80,
            ),
            halfday_merge_jaccard_threshold: parse_env_or("HALFDAY_MERGE_JACCARD_THRESHOLD", 0.40),
            halfday_merge_llm_confidence: parse_env_or("HALFDAY_MERGE_LLM_CONFIDENCE", 0.80),

            global_merge_topk_candidates: 3,
            global_merge_min_similarity: parse_env_or("GLOBAL_MERGE_MIN_SIMILARITY", 0.50),
            global_merge_confidence_threshold: parse_env_or(
                "GLOBAL_MERGE_CONFIDENCE_THRESHOLD",
                0.75,
            ),
            global_merge_max_batch_size: parse_env_or("GLOBAL_MERGE_MAX_BATCH_SIZE", 200),
            global_merge_concurrent: parse_env_or("GLOBAL_MERGE_CONCURRENT", 1),
            global_merge_new_topic_keep_ratio: parse_env_or(
                "GLOBAL_MERGE_NEW_TOPIC_KEEP_RATIO",
                1.0,
            ),

            summary_concurrent_size: parse_env_or("SUMMARY_CONCURRENT_SIZE", 5),

            platform_weights: parse_platform_weights(),
        }
    }

    /// Weight for a platform, falling back to the built-in default if not
    /// overridden via `PLATFORM_WEIGHTS` (`spec.md` §4.2, §6).
    pub fn platform_weight(&self, platform: Platform) -> f64 {
        self.platform_weights
            .get(&platform)
            .copied()
            .unwrap_or_else(|| platform.default_weight())
    }

    /// Log the presence (not value) of sensitive config, matching the
    /// teacher's `Config::log_redacted`.
    pub fn log_redacted(&self) {
        for (name, value) in [
            ("DATABASE_URL", &self.database_url),
            ("LLM_API_KEY", &self.llm_api_key),
            ("EMBEDDING_API_KEY", &self.embedding_api_key),
        ] {
            tracing::info!("{name} = ({} chars)", value.len());
        }
    }
}

/// Parse `PLATFORM_WEIGHTS` as `platform=weight,platform=weight,...`.
fn parse_platform_weights() -> BTreeMap<Platform, f64> {
    let raw = match env::var("PLATFORM_WEIGHTS") {
        Ok(v) => v,
        Err(_) => return BTreeMap::new(),
    };
    let mut weights = BTreeMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((name, weight)) = pair.split_once('=') {
            if let (Ok(platform), Ok(weight)) = (name.trim().parse(), weight.trim().parse()) {
                weights.insert(platform, weight);
            } else {
                tracing::warn!(entry = pair, "ignoring malformed PLATFORM_WEIGHTS entry");
            }
        }
    }
    weights
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_weight_falls_back_to_default() {
        let cfg = Config {
            database_url: String::new(),
            vector_db_url: String::new(),
            llm_api_key: String::new(),
            llm_model: String::new(),
            llm_base_url: None,
            embedding_api_key: String::new(),
            embedding_model: String::new(),
            halfday_merge_min_occurrence: 2,
            halfday_merge_similarity_threshold: 0.80,
            halfday_merge_jaccard_threshold: 0.40,
            halfday_merge_llm_confidence: 0.80,
            global_merge_topk_candidates: 3,
            global_merge_min_similarity: 0.50,
            global_merge_confidence_threshold: 0.75,
            global_merge_max_batch_size: 200,
            global_merge_concurrent: 1,
            global_merge_new_topic_keep_ratio: 1.0,
            summary_concurrent_size: 5,
            platform_weights: BTreeMap::new(),
        };
        assert_eq!(cfg.platform_weight(Platform::Weibo), 1.2);
    }
}
