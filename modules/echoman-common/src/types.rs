//! Closed enumerations and small shared value types (`spec.md` §3, §9).
//!
//! The source material treats `merge_status` and friends as open strings;
//! here they're closed Rust enums so every transition is exhaustively
//! handled at the type level instead of by convention.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One of the seven platforms this system ingests from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Weibo,
    Zhihu,
    Toutiao,
    Sina,
    Netease,
    Baidu,
    Hupu,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::Weibo,
        Platform::Zhihu,
        Platform::Toutiao,
        Platform::Sina,
        Platform::Netease,
        Platform::Baidu,
        Platform::Hupu,
    ];

    /// Default platform weight used by the normalizer's second pass
    /// (`spec.md` §4.2, overridable via `PLATFORM_WEIGHTS`).
    pub fn default_weight(self) -> f64 {
        match self {
            Platform::Weibo => 1.2,
            Platform::Zhihu => 1.1,
            Platform::Baidu => 1.1,
            Platform::Toutiao => 1.0,
            Platform::Netease => 0.9,
            Platform::Sina => 0.8,
            Platform::Hupu => 0.8,
        }
    }

    /// Platforms that never carry a `heat_value` at all, per `spec.md` §4.2 step 1.
    pub fn never_reports_heat(self) -> bool {
        matches!(self, Platform::Sina | Platform::Hupu)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Weibo => "weibo",
            Platform::Zhihu => "zhihu",
            Platform::Toutiao => "toutiao",
            Platform::Sina => "sina",
            Platform::Netease => "netease",
            Platform::Baidu => "baidu",
            Platform::Hupu => "hupu",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Platform {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weibo" => Ok(Platform::Weibo),
            "zhihu" => Ok(Platform::Zhihu),
            "toutiao" => Ok(Platform::Toutiao),
            "sina" => Ok(Platform::Sina),
            "netease" => Ok(Platform::Netease),
            "baidu" => Ok(Platform::Baidu),
            "hupu" => Ok(Platform::Hupu),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// `SourceItem.merge_status` state machine (`spec.md` §4.6).
///
/// ```text
///     pending_event_merge ──occurrence=1──▶ discarded
///             │
///             │ occurrence>=2
///             ▼
///     pending_global_merge ──stage two──▶ merged
/// ```
/// No transition moves an item backward; `discarded`/`merged` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    PendingEventMerge,
    PendingGlobalMerge,
    Merged,
    Discarded,
}

impl MergeStatus {
    /// Terminal states may never be re-processed (`spec.md` §3 Lifecycle).
    pub fn is_terminal(self) -> bool {
        matches!(self, MergeStatus::Merged | MergeStatus::Discarded)
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeStatus::PendingEventMerge => "pending_event_merge",
            MergeStatus::PendingGlobalMerge => "pending_global_merge",
            MergeStatus::Merged => "merged",
            MergeStatus::Discarded => "discarded",
        };
        write!(f, "{s}")
    }
}

/// Topic lifecycle status (`spec.md` §3, §4.7). The core never transitions
/// a topic to `Ended` itself — that's an out-of-scope aging process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    Active,
    Ended,
}

impl fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicStatus::Active => write!(f, "active"),
            TopicStatus::Ended => write!(f, "ended"),
        }
    }
}

/// `Summary.method` (`spec.md` §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "lowercase")]
pub enum SummaryMethod {
    Placeholder,
    Full,
    Incremental,
}

impl fmt::Display for SummaryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryMethod::Placeholder => write!(f, "placeholder"),
            SummaryMethod::Full => write!(f, "full"),
            SummaryMethod::Incremental => write!(f, "incremental"),
        }
    }
}

/// Object kinds stored in the vector index (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingObjectType {
    SourceItem,
    TopicSummary,
}

impl fmt::Display for EmbeddingObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingObjectType::SourceItem => write!(f, "source_item"),
            EmbeddingObjectType::TopicSummary => write!(f, "topic_summary"),
        }
    }
}

/// `RunRecord.kind` (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Ingest,
    EventMerge,
    GlobalMerge,
    MergeCompleted,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunKind::Ingest => "ingest",
            RunKind::EventMerge => "event_merge",
            RunKind::GlobalMerge => "global_merge",
            RunKind::MergeCompleted => "merge_completed",
        };
        write!(f, "{s}")
    }
}

/// `RunRecord.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// `LLMJudgement.type` (`spec.md` §3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum JudgementKind {
    EventGroupConfirmation,
    TopicAssociation,
    RagAnswer,
}

/// `LLMJudgement.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum JudgementStatus {
    Ok,
    MalformedResponse,
    ProviderError,
}

/// Bounded key/value metric map for `SourceItem.interactions` (`spec.md` §3,
/// §9 — "a bounded key/value metric map for interactions" in place of an
/// opaque JSON payload).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InteractionMetrics(BTreeMap<String, i64>);

impl InteractionMetrics {
    pub const MAX_KEYS: usize = 32;

    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a metric, silently dropping new keys past the cap so one
    /// malformed upstream payload can't blow out a row.
    pub fn insert(&mut self, key: impl Into<String>, value: i64) {
        let key = key.into();
        if self.0.len() >= Self::MAX_KEYS && !self.0.contains_key(&key) {
            return;
        }
        self.0.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.0.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, i64>> for InteractionMetrics {
    fn from(mut map: BTreeMap<String, i64>) -> Self {
        while map.len() > Self::MAX_KEYS {
            if let Some(k) = map.keys().next().cloned() {
                map.remove(&k);
            }
        }
        InteractionMetrics(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_weight_roundtrip_display() {
        for p in Platform::ALL {
            let s = p.to_string();
            assert_eq!(s.parse::<Platform>().unwrap(), p);
        }
    }

    #[test]
    fn merge_status_terminal_states() {
        assert!(MergeStatus::Merged.is_terminal());
        assert!(MergeStatus::Discarded.is_terminal());
        assert!(!MergeStatus::PendingEventMerge.is_terminal());
        assert!(!MergeStatus::PendingGlobalMerge.is_terminal());
    }

    #[test]
    fn interaction_metrics_caps_at_max_keys() {
        let mut m = InteractionMetrics::new();
        for i in 0..64 {
            m.insert(format!("k{i}"), i as i64);
        }
        assert!(m.iter().count() <= InteractionMetrics::MAX_KEYS);
    }
}
