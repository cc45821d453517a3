//! File archive handling: traversal, packing and verified extraction.

pub mod extract;
pub mod pack;
pub mod walk;

pub use extract::{ExtractSummary, Extractor, RecordMatch};
pub use pack::{pack_directory, CompressionLevel, PackedFiles};
pub use walk::{DirectoryWalker, WalkedFile};
