#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod cache_list;
pub mod catalog;
pub mod collector;
pub mod config;
pub mod dom;
pub mod error;
pub mod file;
pub mod remote;
pub mod rewrite;
pub mod selection;
pub mod server;
pub mod templates;

pub use catalog::{Catalog, InputMode};
pub use config::ServiceWorkerOptions;
pub use error::{OfflineError, Result, TemplateError};
pub use file::{RewrittenFile, add_service_worker_to_file, cache_list_from_file};
pub use rewrite::{Transformed, add_service_worker, cache_list, transform};
pub use selection::{IncludeAll, PathInclusion, PathSelection};
