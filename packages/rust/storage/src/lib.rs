//! Durable dataset storage.
//!
//! The dataset is a JSON Lines file holding one [`DatasetRecord`] per line,
//! sorted by question identifier. [`Dataset`] loads and renders it,
//! [`DatasetWriter`] merges new records into it atomically, and
//! [`DedupStore`] answers "have we seen this question before?".
//!
//! **Access rules:** a run assumes it is the only writer of the dataset file.
//!
//! [`DatasetRecord`]: answerbank_shared::DatasetRecord

mod dataset;
mod dedup;

pub use dataset::{Dataset, DatasetStats, DatasetWriter, UpsertKind, WriteResult};
pub use dedup::DedupStore;
