pub mod context;
pub mod events;
pub mod reader;
pub mod retrieval;

pub use events::{Citation, RagDiagnostics, RagEvent};
pub use reader::RagReader;
pub use retrieval::{RetrievalResult, Retriever};
