pub mod index;
pub mod postgres;

pub use index::{VectorIndex, VectorMatch, VectorMetadata, VectorQuery};
pub use postgres::PgVectorIndex;
