//! Performer field resolvers
//!
//! Every relation goes through the request's [`Loaders`], so resolving the
//! same field for many performers costs one query per relation.

use async_graphql::{ComplexObject, Context, Result};
use chrono::Utc;

use super::loaders;
use crate::models::{
    BodyModification, BreastTypeEnum, EthnicityEnum, EyeColorEnum, FuzzyDate, GenderEnum,
    HairColorEnum, Image, Measurements, Performer, Url,
};

#[ComplexObject]
impl Performer {
    async fn aliases(&self, ctx: &Context<'_>) -> Result<Vec<String>> {
        let aliases = loaders(ctx)?.performer_aliases_by_id.load(self.id).await?;
        Ok(aliases.map(|a| a.to_aliases()).unwrap_or_default())
    }

    async fn urls(&self, ctx: &Context<'_>) -> Result<Vec<Url>> {
        let urls = loaders(ctx)?.performer_urls_by_id.load(self.id).await?;
        Ok(urls.map(|u| u.to_urls()).unwrap_or_default())
    }

    async fn tattoos(&self, ctx: &Context<'_>) -> Result<Vec<BodyModification>> {
        let tattoos = loaders(ctx)?.performer_tattoos_by_id.load(self.id).await?;
        Ok(tattoos.map(|t| t.to_body_modifications()).unwrap_or_default())
    }

    async fn piercings(&self, ctx: &Context<'_>) -> Result<Vec<BodyModification>> {
        let piercings = loaders(ctx)?.performer_piercings_by_id.load(self.id).await?;
        Ok(piercings
            .map(|p| p.to_body_modifications())
            .unwrap_or_default())
    }

    /// Image ids first, then the images themselves in one batch
    async fn images(&self, ctx: &Context<'_>) -> Result<Vec<Image>> {
        let loaders = loaders(ctx)?;
        let ids = loaders
            .performer_image_ids_by_id
            .load(self.id)
            .await?
            .map(|i| i.image_ids())
            .unwrap_or_default();

        let mut images = Vec::with_capacity(ids.len());
        for image in loaders.image_by_id.load_all(&ids).await {
            // Deleted images resolve empty and are left out
            if let Some(image) = image? {
                images.push(image);
            }
        }
        Ok(images)
    }

    async fn gender(&self) -> Option<GenderEnum> {
        self.gender_enum()
    }

    async fn ethnicity(&self) -> Option<EthnicityEnum> {
        self.ethnicity_enum()
    }

    async fn eye_color(&self) -> Option<EyeColorEnum> {
        self.eye_color_enum()
    }

    async fn hair_color(&self) -> Option<HairColorEnum> {
        self.hair_color_enum()
    }

    async fn breast_type(&self) -> Option<BreastTypeEnum> {
        self.breast_type_enum()
    }

    async fn birthdate(&self) -> Option<FuzzyDate> {
        self.resolve_birthdate()
    }

    #[graphql(name = "age")]
    async fn current_age(&self) -> Option<i32> {
        self.age(Utc::now().date_naive())
    }

    async fn measurements(&self) -> Measurements {
        self.resolve_measurements()
    }

    async fn height(&self) -> Option<i32> {
        self.height.map(|h| h as i32)
    }

    async fn career_start_year(&self) -> Option<i32> {
        self.career_start_year.map(|y| y as i32)
    }

    async fn career_end_year(&self) -> Option<i32> {
        self.career_end_year.map(|y| y as i32)
    }
}
