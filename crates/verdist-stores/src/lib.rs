//! Upload sinks for Verdist
//!
//! Packaged artifacts are handed to one or more sinks once their packaging
//! step has succeeded. The transport behind a sink is opaque to the rest of
//! the pipeline: the upload pool only sees the [`UploadSink`] trait.
//!
//! ## Built-in sinks
//!
//! - **directory**: copies artifacts into a local or mounted directory tree
//! - **command**: hands artifacts to an external upload program
//!
//! ## Usage
//!
//! ```ignore
//! use verdist_stores::{SinkRegistry, UploadRequest};
//!
//! let registry = SinkRegistry::from_config(&upload_config);
//! for sink in registry.all() {
//!     sink.upload(&artifact, &request).await?;
//! }
//! ```

pub mod command;
pub mod directory;
pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use command::CommandSink;
pub use directory::DirectorySink;
pub use error::StoreError;
pub use registry::SinkRegistry;
pub use traits::UploadSink;
pub use types::*;
