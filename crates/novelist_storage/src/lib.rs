//! Run persistence and source loading for Novelist.
//!
//! - [`FileRunStore`] keeps each run in its own directory with atomically
//!   replaced JSON documents and append-only draft histories.
//! - [`InMemoryRunStore`] mirrors the same semantics without touching disk.
//! - [`TextFileSource`] loads a plain-text novel as paragraph segments.

mod file_store;
mod in_memory;
mod text_source;

pub use file_store::FileRunStore;
pub use in_memory::InMemoryRunStore;
pub use text_source::{TextFileSource, split_segments};
