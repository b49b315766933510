//! Batched, request-scoped data access for field resolution
//!
//! Resolvers call `load`/`load_all` on the relation they need; concurrent
//! calls within one settled round collapse into a single multi-key query:
//! `SELECT ... WHERE performer_id IN (...)`.

mod batch;
mod fetchers;
mod registry;

pub use batch::{BatchFn, BatchLoader, LoadError, LoadResult, LoaderConfig, LoaderStats};
pub use fetchers::{EntityById, JoinByParent};
pub use registry::Loaders;
