//! Concrete entities and the registry that describes them to the store

pub mod enums;
pub mod image;
pub mod performer;
pub mod user;

use chrono::{DateTime, Utc};

use crate::db::orm::TableRegistry;

pub use enums::*;
pub use image::*;
pub use performer::*;
pub use user::*;

/// Every table this service stores, parents before their join tables
pub fn registry() -> TableRegistry {
    TableRegistry::new()
        .table(&USER_TABLE)
        .table(&INVITE_KEY_TABLE)
        .table(&PENDING_ACTIVATION_TABLE)
        .table(&IMAGE_TABLE)
        .table(&PERFORMER_TABLE)
        .join(&PERFORMER_ALIASES)
        .join(&PERFORMER_URLS)
        .join(&PERFORMER_TATTOOS)
        .join(&PERFORMER_PIERCINGS)
        .join(&PERFORMER_IMAGES)
}

/// Timestamps default to the epoch until the store assigns them
pub(crate) fn is_unset(ts: &DateTime<Utc>) -> bool {
    *ts == DateTime::<Utc>::default()
}
