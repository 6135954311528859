//! Stage-one candidate grouping (`spec.md` §4.5 step 3): connected
//! components over an undirected similarity graph, built the way the
//! teacher's `SimilarityBuilder` builds `SIMILAR_TO` edges (pairwise cosine
//! above a threshold) but using `petgraph::unionfind::UnionFind` in place of
//! Leiden-over-Neo4j — single-period candidate sets here are small enough
//! that full community detection is overkill.

use chrono::{DateTime, Utc};
use petgraph::unionfind::UnionFind;

#[derive(Debug, Clone)]
pub struct ClusterItem {
    pub id: i64,
    pub title: String,
    pub fetched_at: DateTime<Utc>,
    pub embedding: Vec<f32>,
}

/// Group `items` into connected components. Two items are linked when
/// cosine similarity >= `cosine_threshold` *and* their normalized titles
/// share 2-gram Jaccard >= `jaccard_threshold` (`spec.md` §6
/// `HALFDAY_MERGE_SIMILARITY_THRESHOLD`/`HALFDAY_MERGE_JACCARD_THRESHOLD`).
/// Returns groups as vectors of `ClusterItem` indices sorted by
/// `fetched_at`, each sorted with the earliest item first so the
/// representative is always `group[0]`.
pub fn cluster(items: &[ClusterItem], cosine_threshold: f64, jaccard_threshold: f64) -> Vec<Vec<usize>> {
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }

    let normalized_titles: Vec<String> = items.iter().map(|i| normalize_title(&i.title)).collect();
    let bigrams: Vec<std::collections::HashSet<String>> =
        normalized_titles.iter().map(|t| char_bigrams(t)).collect();

    let mut uf = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let cos = cosine_similarity(&items[i].embedding, &items[j].embedding);
            if cos < cosine_threshold {
                continue;
            }
            let jaccard = set_jaccard(&bigrams[i], &bigrams[j]);
            if jaccard >= jaccard_threshold {
                uf.union(i, j);
            }
        }
    }

    let mut groups: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
    for idx in 0..n {
        groups.entry(uf.find(idx)).or_default().push(idx);
    }

    groups
        .into_values()
        .map(|mut members| {
            members.sort_by_key(|&idx| items[idx].fetched_at);
            members
        })
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn set_jaccard(a: &std::collections::HashSet<String>, b: &std::collections::HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn char_bigrams(s: &str) -> std::collections::HashSet<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 2 {
        return chars.iter().map(|c| c.to_string()).collect();
    }
    chars.windows(2).map(|w| w.iter().collect()).collect()
}

/// Full-width -> half-width, lowercase, punctuation stripped, digits kept
/// as-is (full-width digits fold into half-width via the width conversion).
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter_map(|c| {
            let folded = fullwidth_to_halfwidth(c);
            if folded.is_ascii_punctuation() || folded.is_whitespace() {
                None
            } else {
                Some(folded.to_ascii_lowercase())
            }
        })
        .collect()
}

fn fullwidth_to_halfwidth(c: char) -> char {
    let code = c as u32;
    if (0xFF01..=0xFF5E).contains(&code) {
        char::from_u32(code - 0xFEE0).unwrap_or(c)
    } else if c == '\u{3000}' {
        ' '
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, title: &str, secs: i64, embedding: Vec<f32>) -> ClusterItem {
        ClusterItem {
            id,
            title: title.to_string(),
            fetched_at: DateTime::from_timestamp(secs, 0).unwrap(),
            embedding,
        }
    }

    #[test]
    fn identical_titles_and_vectors_form_one_group() {
        let items = vec![
            item(1, "王传君获东京电影节影帝", 100, vec![1.0, 0.0]),
            item(2, "王传君获东京电影节影帝", 200, vec![1.0, 0.0]),
        ];
        let groups = cluster(&items, 0.80, 0.40);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0][0], 0); // earlier fetched_at first
    }

    #[test]
    fn dissimilar_titles_stay_singletons() {
        let items = vec![
            item(1, "王传君获东京电影节影帝", 100, vec![1.0, 0.0]),
            item(2, "今日股市大幅下跌", 200, vec![1.0, 0.0]),
        ];
        let groups = cluster(&items, 0.80, 0.40);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn low_cosine_similarity_prevents_grouping_despite_title_match() {
        let items = vec![
            item(1, "王传君获东京电影节影帝", 100, vec![1.0, 0.0]),
            item(2, "王传君获东京电影节影帝", 200, vec![0.0, 1.0]),
        ];
        let groups = cluster(&items, 0.80, 0.40);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn title_normalization_folds_fullwidth_and_punctuation() {
        let normalized = normalize_title("Ａbc，Test！");
        assert_eq!(normalized, "abctest");
    }

    #[test]
    fn empty_input_produces_no_groups() {
        assert!(cluster(&[], 0.80, 0.40).is_empty());
    }
}
