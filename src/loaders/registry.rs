use uuid::Uuid;

use super::batch::{BatchLoader, LoaderConfig};
use super::fetchers::{EntityById, JoinByParent};
use crate::db::Database;
use crate::models::{
    Image, PERFORMER_ALIASES, PERFORMER_IMAGES, PERFORMER_PIERCINGS, PERFORMER_TATTOOS,
    PERFORMER_URLS, Performer, PerformerAliases, PerformerBodyMods, PerformerImages,
    PerformerUrls,
};

/// One batching loader per relation, created at the start of a request and
/// dropped at its end. Never shared between requests.
pub struct Loaders {
    pub performer_by_id: BatchLoader<Uuid, Performer>,
    pub image_by_id: BatchLoader<Uuid, Image>,
    pub performer_aliases_by_id: BatchLoader<Uuid, PerformerAliases>,
    pub performer_urls_by_id: BatchLoader<Uuid, PerformerUrls>,
    pub performer_tattoos_by_id: BatchLoader<Uuid, PerformerBodyMods>,
    pub performer_piercings_by_id: BatchLoader<Uuid, PerformerBodyMods>,
    pub performer_image_ids_by_id: BatchLoader<Uuid, PerformerImages>,
}

impl Loaders {
    pub fn new(db: &Database, config: LoaderConfig) -> Self {
        Self {
            performer_by_id: BatchLoader::new(
                "performer_by_id",
                EntityById::new(db.clone()),
                config,
            ),
            image_by_id: BatchLoader::new("image_by_id", EntityById::new(db.clone()), config),
            performer_aliases_by_id: BatchLoader::new(
                "performer_aliases_by_id",
                JoinByParent::new(db.clone(), &PERFORMER_ALIASES),
                config,
            ),
            performer_urls_by_id: BatchLoader::new(
                "performer_urls_by_id",
                JoinByParent::new(db.clone(), &PERFORMER_URLS),
                config,
            ),
            performer_tattoos_by_id: BatchLoader::new(
                "performer_tattoos_by_id",
                JoinByParent::new(db.clone(), &PERFORMER_TATTOOS),
                config,
            ),
            performer_piercings_by_id: BatchLoader::new(
                "performer_piercings_by_id",
                JoinByParent::new(db.clone(), &PERFORMER_PIERCINGS),
                config,
            ),
            performer_image_ids_by_id: BatchLoader::new(
                "performer_image_ids_by_id",
                JoinByParent::new(db.clone(), &PERFORMER_IMAGES),
                config,
            ),
        }
    }

    /// Drop everything cached for one performer, after it was written
    pub fn clear_performer(&self, id: Uuid) {
        self.performer_by_id.clear(&id);
        self.performer_aliases_by_id.clear(&id);
        self.performer_urls_by_id.clear(&id);
        self.performer_tattoos_by_id.clear(&id);
        self.performer_piercings_by_id.clear(&id);
        self.performer_image_ids_by_id.clear(&id);
    }
}
