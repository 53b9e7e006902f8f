//! # modindex
//!
//! Caching client for mod index servers.
//!
//! Every resource fetched from the server is handed out as a shared
//! [`ServerRequest`](request::ServerRequest) handle. Cached fetches go
//! through a per-resource request cache that starts at most one fetch per
//! distinct set of arguments, and update checks over large installations are
//! split into batches sent one after another.
//!
//! ## Modules
//!
//! - [`cache`] - FIFO-bounded request caches and their registry
//! - [`request`] - Shared, cancellable request handles
//! - [`server`] - Endpoints, batching and the cached client
//! - [`transport`] - HTTP transport abstraction
//! - [`types`] - Configuration, errors and payload types
//! - `cli` - Command line interface (feature `cli`)

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod request;
pub mod server;
pub mod transport;
pub mod types;

pub use server::ServerClient;
pub use types::config::Config;
pub use types::errors::{ModIndexError, ModIndexResult, ServerError, ServerResult};
