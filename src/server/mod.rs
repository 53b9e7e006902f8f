//! Index server access: uncached endpoints, batching and the cached client.

pub mod api;
pub mod batch;
mod client;
mod installed;

pub use api::ServerApi;
pub use batch::{plan_batches, run_batched, BatchAccumulator, DEFAULT_MAX_BATCH_SIZE};
pub use client::ServerClient;
pub use installed::InstalledMods;
