//! Local persistence primitives: a JSON metadata key/value store and
//! append-only JSONL conversation history with inactivity windowing.

pub mod history;
pub mod meta;

pub use history::{HistoryLine, HistoryStore};
pub use meta::MetaStore;
