pub mod adjudicator;
pub mod answerer;
pub mod client;
pub mod embedding;
pub mod schema;
pub mod token;
pub mod wire;

pub use adjudicator::{
    EventGroupConfirmation, LlmAdjudicator, OpenAiAdjudicator, SummaryGenerator,
    TopicAssociationCandidate, TopicAssociationDecision, TopicAssociationOutcome,
};
pub use answerer::{OpenAiRagAnswerer, RagAnswerer, TokenStream};
pub use client::ProviderClient;
pub use embedding::{EmbeddingProvider, OpenAiEmbeddingProvider};
pub use token::{budgets, HeuristicTokenCounter, TokenCounter};
