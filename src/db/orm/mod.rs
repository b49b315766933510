//! Persistence ORM layer
//!
//! Table descriptors, the row mapping / row collection traits, and the
//! generic operations built on them:
//!
//! ```rust,ignore
//! let mut tx = db.begin().await?;
//! let mut qb = QueryBuilder::new(&mut tx, db.registry());
//! let performer = qb.create(performer).await?;
//! qb.create_joins(&PERFORMER_ALIAS_TABLE, &aliases).await?;
//! tx.commit().await?;
//! ```

mod builder;
mod registry;
mod traits;

pub use builder::*;
pub use registry::*;
pub use traits::*;
