mod blob;
mod chunk_set;
mod lease;
mod quota;

pub use blob::Blob;
pub use chunk_set::{ChunkRecord, ChunkSet};
pub use lease::Lease;
pub use quota::{QuotaRecord, QuotaSnapshot};
