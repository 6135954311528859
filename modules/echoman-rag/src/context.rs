//! Token-budgeted context packing (`spec.md` §4.9 step 1): available
//! context tokens are the 32,000-token model envelope minus a 2,000-token
//! safety margin, the system prompt, the query, and the completion budget.
//! Whole chunks are packed in recall order; only the final chunk that would
//! overflow is truncated, and only if at least 100 tokens of budget remain.

use echoman_ai::{budgets, TokenCounter};

use crate::events::Citation;

/// Per `spec.md` §4.9: don't bother truncating a tail chunk into fewer than
/// this many tokens — the result would be noise, not evidence.
pub const MIN_TRUNCATION_TOKENS: u32 = 100;

#[derive(Debug, Clone)]
pub struct ContextChunk {
    pub text: String,
    pub citation: Option<Citation>,
}

pub struct PackedContext {
    pub text: String,
    pub citations: Vec<Citation>,
    pub chunk_count: u32,
    pub dropped_chunks: u32,
}

/// `32,000 − safety_margin − system − query − completion`, floored at 0.
pub fn available_context_tokens(
    counter: &dyn TokenCounter,
    system_prompt: &str,
    query: &str,
    completion_tokens: u32,
) -> u32 {
    let reserved = budgets::RAG_SAFETY_MARGIN_TOKENS
        + counter.count(system_prompt)
        + counter.count(query)
        + completion_tokens;
    budgets::RAG_ENVELOPE_TOKENS.saturating_sub(reserved)
}

pub fn pack_context(chunks: Vec<ContextChunk>, counter: &dyn TokenCounter, available_tokens: u32) -> PackedContext {
    let mut used = 0u32;
    let mut parts = Vec::new();
    let mut citations = Vec::new();
    let mut chunk_count = 0u32;
    let total = chunks.len();
    let mut consumed = 0usize;

    for chunk in chunks {
        let tokens = counter.count(&chunk.text);
        if used.saturating_add(tokens) <= available_tokens {
            used += tokens;
            parts.push(chunk.text);
            chunk_count += 1;
            consumed += 1;
            if let Some(c) = chunk.citation {
                citations.push(c);
            }
            continue;
        }

        let remaining = available_tokens.saturating_sub(used);
        if remaining >= MIN_TRUNCATION_TOKENS {
            let truncated = counter.truncate(&chunk.text, remaining);
            if !truncated.is_empty() {
                parts.push(truncated);
                chunk_count += 1;
                consumed += 1;
                if let Some(c) = chunk.citation {
                    citations.push(c);
                }
            }
        }
        break;
    }

    PackedContext {
        text: parts.join("\n\n"),
        citations,
        chunk_count,
        dropped_chunks: (total - consumed) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echoman_ai::HeuristicTokenCounter;

    fn chunk(text: &str) -> ContextChunk {
        ContextChunk { text: text.to_string(), citation: None }
    }

    #[test]
    fn packs_all_chunks_under_budget() {
        let counter = HeuristicTokenCounter;
        let chunks = vec![chunk("short one"), chunk("short two")];
        let packed = pack_context(chunks, &counter, 1000);
        assert_eq!(packed.chunk_count, 2);
        assert_eq!(packed.dropped_chunks, 0);
    }

    #[test]
    fn truncates_the_overflowing_tail_chunk() {
        let counter = HeuristicTokenCounter;
        let long_tail = "x".repeat(4000);
        let chunks = vec![chunk("head"), chunk(&long_tail)];
        let packed = pack_context(chunks, &counter, counter.count("head") + 500);
        assert_eq!(packed.chunk_count, 2);
        assert!(packed.text.len() < long_tail.len());
    }

    #[test]
    fn drops_tail_chunk_entirely_when_too_little_budget_remains() {
        let counter = HeuristicTokenCounter;
        let chunks = vec![chunk("head"), chunk(&"y".repeat(4000))];
        let packed = pack_context(chunks, &counter, counter.count("head") + 10);
        assert_eq!(packed.chunk_count, 1);
        assert_eq!(packed.dropped_chunks, 1);
    }
}
