//! Topic category assignment (`spec.md` §4.6 new path: "category assigned
//! by the external classifier using the items' text (may fail; see §7)").
//!
//! Kept as a trait, same isolation as [`echoman_ai::LlmAdjudicator`], so a
//! real classifier service can be swapped in without touching stage two.
//! The heuristic implementation here is a placeholder worth replacing with
//! a provider-backed one; failure of either is non-fatal to topic creation.

use echoman_common::Result;

#[derive(Debug, Clone)]
pub struct TopicClassification {
    pub category: String,
    pub confidence: f64,
    pub method: String,
}

#[async_trait::async_trait]
pub trait TopicClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<TopicClassification>;
}

/// Keyword-bucket classifier. A real deployment would call out to a
/// trained model; this keeps stage two functional without one.
pub struct KeywordTopicClassifier {
    buckets: Vec<(&'static str, &'static [&'static str])>,
}

impl Default for KeywordTopicClassifier {
    fn default() -> Self {
        Self {
            buckets: vec![
                ("entertainment", &["电影", "明星", "演员", "综艺"]),
                ("sports", &["比赛", "球", "奥运", "联赛"]),
                ("finance", &["股市", "经济", "融资", "财报"]),
                ("technology", &["芯片", "人工智能", "科技", "发布会"]),
                ("society", &["事故", "警方", "法院", "调查"]),
            ],
        }
    }
}

#[async_trait::async_trait]
impl TopicClassifier for KeywordTopicClassifier {
    async fn classify(&self, text: &str) -> Result<TopicClassification> {
        for (category, keywords) in &self.buckets {
            if keywords.iter().any(|kw| text.contains(kw)) {
                return Ok(TopicClassification {
                    category: category.to_string(),
                    confidence: 0.6,
                    method: "keyword_bucket".to_string(),
                });
            }
        }
        Ok(TopicClassification {
            category: "uncategorized".to_string(),
            confidence: 0.0,
            method: "keyword_bucket".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn matches_known_keyword() {
        let classifier = KeywordTopicClassifier::default();
        let result = classifier.classify("某明星新电影票房破纪录").await.unwrap();
        assert_eq!(result.category, "entertainment");
    }

    #[tokio::test]
    async fn falls_back_to_uncategorized() {
        let classifier = KeywordTopicClassifier::default();
        let result = classifier.classify("今天天气晴朗适合出行").await.unwrap();
        assert_eq!(result.category, "uncategorized");
    }
}
