//! Trait definitions for the Novelist pipeline.
//!
//! The pipeline is written against these seams so the completion endpoint,
//! the source of the novel, and the durable store can each be swapped or
//! mocked independently.

mod driver;
mod source;
mod store;

pub use driver::CompletionDriver;
pub use source::SourceProvider;
pub use store::RunStore;
