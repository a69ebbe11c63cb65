//! Localization staleness tracking over a git working copy.

pub mod backend;
pub mod cancel;
pub mod config;
pub mod daemon;
pub mod detect;
pub mod graph;
pub mod store;
pub mod types;

pub use backend::{BackendError, GitBackend, RepositoryBackend};
pub use cancel::Cancel;
pub use config::{Config, ContentLayout};
pub use detect::{FileTranslationState, OriginStatus, OriginUpdate, StalenessDetector};
pub use graph::{CommitGraph, GraphError, MainBranch, RefreshOutcome};
pub use store::{CachePaths, FileStore, KeyedCache, Store, StoreError};
pub use types::{CommitId, CommitRecord};
