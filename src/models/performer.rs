//! Performer entity, its join collections and the create/update input merge

use async_graphql::{InputObject, SimpleObject};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::enums::{
    BreastTypeEnum, DateAccuracyEnum, EthnicityEnum, EyeColorEnum, GenderEnum, HairColorEnum,
    StoredEnum, resolve_enum,
};
use super::is_unset;
use crate::db::error::DbResult;
use crate::db::orm::{
    ColumnDef, DatabaseEntity, JoinRow, RowCollection, SqlRow, SqlValue, Table, TableJoin,
};
use crate::db::sqlite_helpers::{int_to_bool, str_to_datetime, str_to_uuid};

// ============================================================================
// Descriptors
// ============================================================================

pub static PERFORMER_TABLE: Table = Table::new(
    "performers",
    &[
        ColumnDef::text("id").primary_key(),
        ColumnDef::text("name"),
        ColumnDef::text("disambiguation").nullable(),
        ColumnDef::text("gender").nullable(),
        ColumnDef::text("birthdate").nullable(),
        ColumnDef::text("birthdate_accuracy").nullable(),
        ColumnDef::text("ethnicity").nullable(),
        ColumnDef::text("country").nullable(),
        ColumnDef::text("eye_color").nullable(),
        ColumnDef::text("hair_color").nullable(),
        ColumnDef::integer("height").nullable(),
        ColumnDef::text("cup_size").nullable(),
        ColumnDef::integer("band_size").nullable(),
        ColumnDef::integer("waist_size").nullable(),
        ColumnDef::integer("hip_size").nullable(),
        ColumnDef::text("breast_type").nullable(),
        ColumnDef::integer("career_start_year").nullable(),
        ColumnDef::integer("career_end_year").nullable(),
        ColumnDef::text("created_at"),
        ColumnDef::text("updated_at"),
        ColumnDef::integer("deleted").default_value("0"),
    ],
)
.soft_delete();

pub static PERFORMER_ALIASES: TableJoin = TableJoin::new(
    "performers",
    Table::new(
        "performer_aliases",
        &[
            ColumnDef::text("performer_id").references("performers"),
            ColumnDef::text("alias"),
        ],
    )
    .unique_keys(&[&["performer_id", "alias"]]),
    "performer_id",
);

pub static PERFORMER_URLS: TableJoin = TableJoin::new(
    "performers",
    Table::new(
        "performer_urls",
        &[
            ColumnDef::text("performer_id").references("performers"),
            ColumnDef::text("url"),
            ColumnDef::text("type"),
        ],
    )
    .unique_keys(&[&["performer_id", "url", "type"]]),
    "performer_id",
);

const BODY_MOD_COLUMNS: &[ColumnDef] = &[
    ColumnDef::text("performer_id").references("performers"),
    ColumnDef::text("location"),
    ColumnDef::text("description").nullable(),
];

pub static PERFORMER_TATTOOS: TableJoin = TableJoin::new(
    "performers",
    Table::new("performer_tattoos", BODY_MOD_COLUMNS),
    "performer_id",
);

pub static PERFORMER_PIERCINGS: TableJoin = TableJoin::new(
    "performers",
    Table::new("performer_piercings", BODY_MOD_COLUMNS),
    "performer_id",
);

pub static PERFORMER_IMAGES: TableJoin = TableJoin::new(
    "performers",
    Table::new(
        "performer_images",
        &[
            ColumnDef::text("performer_id").references("performers"),
            ColumnDef::text("image_id").references("images"),
        ],
    )
    .unique_keys(&[&["performer_id", "image_id"]]),
    "performer_id",
)
.unordered();

// ============================================================================
// Performer
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, SimpleObject)]
#[graphql(complex)]
pub struct Performer {
    pub id: Uuid,
    pub name: String,
    pub disambiguation: Option<String>,
    #[graphql(skip)]
    pub gender: Option<String>,
    #[graphql(skip)]
    pub birthdate: Option<String>,
    #[graphql(skip)]
    pub birthdate_accuracy: Option<String>,
    #[graphql(skip)]
    pub ethnicity: Option<String>,
    pub country: Option<String>,
    #[graphql(skip)]
    pub eye_color: Option<String>,
    #[graphql(skip)]
    pub hair_color: Option<String>,
    #[graphql(skip)]
    pub height: Option<i64>,
    #[graphql(skip)]
    pub cup_size: Option<String>,
    #[graphql(skip)]
    pub band_size: Option<i64>,
    #[graphql(skip)]
    pub waist_size: Option<i64>,
    #[graphql(skip)]
    pub hip_size: Option<i64>,
    #[graphql(skip)]
    pub breast_type: Option<String>,
    #[graphql(skip)]
    pub career_start_year: Option<i64>,
    #[graphql(skip)]
    pub career_end_year: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

/// A date that may only be known to the year or month
#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
pub struct FuzzyDate {
    pub date: String,
    pub accuracy: Option<DateAccuracyEnum>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleObject)]
pub struct Measurements {
    pub cup_size: Option<String>,
    pub band_size: Option<i32>,
    pub waist: Option<i32>,
    pub hip: Option<i32>,
}

impl Performer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn gender_enum(&self) -> Option<GenderEnum> {
        resolve_enum(self.gender.as_deref())
    }

    pub fn ethnicity_enum(&self) -> Option<EthnicityEnum> {
        resolve_enum(self.ethnicity.as_deref())
    }

    pub fn eye_color_enum(&self) -> Option<EyeColorEnum> {
        resolve_enum(self.eye_color.as_deref())
    }

    pub fn hair_color_enum(&self) -> Option<HairColorEnum> {
        resolve_enum(self.hair_color.as_deref())
    }

    pub fn breast_type_enum(&self) -> Option<BreastTypeEnum> {
        resolve_enum(self.breast_type.as_deref())
    }

    /// Stored birthdate with its accuracy. An unrecognized accuracy token
    /// leaves the accuracy empty but keeps the date.
    pub fn resolve_birthdate(&self) -> Option<FuzzyDate> {
        let date = self.birthdate.clone()?;
        Some(FuzzyDate {
            date,
            accuracy: resolve_enum(self.birthdate_accuracy.as_deref()),
        })
    }

    pub fn resolve_measurements(&self) -> Measurements {
        Measurements {
            cup_size: self.cup_size.clone(),
            band_size: self.band_size.map(|v| v as i32),
            waist: self.waist_size.map(|v| v as i32),
            hip: self.hip_size.map(|v| v as i32),
        }
    }

    /// Age in whole years on `today`, or `None` without a parseable birthdate
    pub fn age(&self, today: NaiveDate) -> Option<i32> {
        let birthdate = parse_fuzzy_date(self.birthdate.as_deref()?)?;
        let mut age = today.year() - birthdate.year();
        if (today.month(), today.day()) < (birthdate.month(), birthdate.day()) {
            age -= 1;
        }
        Some(age)
    }

    fn set_birthdate(&mut self, input: &FuzzyDateInput) {
        if input.date.is_empty() {
            self.birthdate = None;
            self.birthdate_accuracy = None;
        } else {
            self.birthdate = Some(input.date.clone());
            self.birthdate_accuracy = Some(input.accuracy.as_str().to_string());
        }
    }

    fn set_measurements(&mut self, input: &MeasurementsInput) {
        if let Some(cup_size) = &input.cup_size {
            self.cup_size = (!cup_size.is_empty()).then(|| cup_size.clone());
        }
        if let Some(band_size) = input.band_size {
            self.band_size = non_zero(band_size);
        }
        if let Some(waist) = input.waist {
            self.waist_size = non_zero(waist);
        }
        if let Some(hip) = input.hip {
            self.hip_size = non_zero(hip);
        }
    }

    /// Merge a create input. Every field the input carries overwrites the
    /// corresponding stored field, including explicitly empty strings.
    pub fn copy_from_create_input(&mut self, input: &PerformerCreateInput) {
        self.name = input.name.clone();
        self.copy_optional_fields(&PerformerFields {
            disambiguation: input.disambiguation.as_ref(),
            gender: input.gender,
            birthdate: input.birthdate.as_ref(),
            ethnicity: input.ethnicity,
            country: input.country.as_ref(),
            eye_color: input.eye_color,
            hair_color: input.hair_color,
            height: input.height,
            measurements: input.measurements.as_ref(),
            breast_type: input.breast_type,
            career_start_year: input.career_start_year,
            career_end_year: input.career_end_year,
        });
    }

    /// Merge an update input. Absent fields leave the stored value untouched.
    pub fn copy_from_update_input(&mut self, input: &PerformerUpdateInput) {
        if let Some(name) = &input.name {
            self.name = name.clone();
        }
        self.copy_optional_fields(&PerformerFields {
            disambiguation: input.disambiguation.as_ref(),
            gender: input.gender,
            birthdate: input.birthdate.as_ref(),
            ethnicity: input.ethnicity,
            country: input.country.as_ref(),
            eye_color: input.eye_color,
            hair_color: input.hair_color,
            height: input.height,
            measurements: input.measurements.as_ref(),
            breast_type: input.breast_type,
            career_start_year: input.career_start_year,
            career_end_year: input.career_end_year,
        });
    }

    fn copy_optional_fields(&mut self, fields: &PerformerFields<'_>) {
        if let Some(v) = fields.disambiguation {
            self.disambiguation = Some(v.clone());
        }
        if let Some(v) = fields.gender {
            self.gender = Some(v.as_str().to_string());
        }
        if let Some(v) = fields.birthdate {
            self.set_birthdate(v);
        }
        if let Some(v) = fields.ethnicity {
            self.ethnicity = Some(v.as_str().to_string());
        }
        if let Some(v) = fields.country {
            self.country = Some(v.clone());
        }
        if let Some(v) = fields.eye_color {
            self.eye_color = Some(v.as_str().to_string());
        }
        if let Some(v) = fields.hair_color {
            self.hair_color = Some(v.as_str().to_string());
        }
        if let Some(v) = fields.height {
            self.height = Some(i64::from(v));
        }
        if let Some(v) = fields.measurements {
            self.set_measurements(v);
        }
        if let Some(v) = fields.breast_type {
            self.breast_type = Some(v.as_str().to_string());
        }
        if let Some(v) = fields.career_start_year {
            self.career_start_year = Some(i64::from(v));
        }
        if let Some(v) = fields.career_end_year {
            self.career_end_year = Some(i64::from(v));
        }
    }
}

/// Optional scalar fields shared by the create and update inputs
struct PerformerFields<'a> {
    disambiguation: Option<&'a String>,
    gender: Option<GenderEnum>,
    birthdate: Option<&'a FuzzyDateInput>,
    ethnicity: Option<EthnicityEnum>,
    country: Option<&'a String>,
    eye_color: Option<EyeColorEnum>,
    hair_color: Option<HairColorEnum>,
    height: Option<i32>,
    measurements: Option<&'a MeasurementsInput>,
    breast_type: Option<BreastTypeEnum>,
    career_start_year: Option<i32>,
    career_end_year: Option<i32>,
}

fn non_zero(v: i32) -> Option<i64> {
    (v != 0).then_some(i64::from(v))
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM` and `YYYY`
fn parse_fuzzy_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01-01", s), "%Y-%m-%d"))
        .ok()
}

impl SqlRow for Performer {
    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.disambiguation.clone().into(),
            self.gender.clone().into(),
            self.birthdate.clone().into(),
            self.birthdate_accuracy.clone().into(),
            self.ethnicity.clone().into(),
            self.country.clone().into(),
            self.eye_color.clone().into(),
            self.hair_color.clone().into(),
            self.height.into(),
            self.cup_size.clone().into(),
            self.band_size.into(),
            self.waist_size.into(),
            self.hip_size.into(),
            self.breast_type.clone().into(),
            self.career_start_year.into(),
            self.career_end_year.into(),
            self.created_at.into(),
            self.updated_at.into(),
            self.deleted.into(),
        ]
    }

    fn from_row(row: &SqliteRow) -> DbResult<Self> {
        Ok(Self {
            id: str_to_uuid(&row.try_get::<String, _>("id")?)?,
            name: row.try_get("name")?,
            disambiguation: row.try_get("disambiguation")?,
            gender: row.try_get("gender")?,
            birthdate: row.try_get("birthdate")?,
            birthdate_accuracy: row.try_get("birthdate_accuracy")?,
            ethnicity: row.try_get("ethnicity")?,
            country: row.try_get("country")?,
            eye_color: row.try_get("eye_color")?,
            hair_color: row.try_get("hair_color")?,
            height: row.try_get("height")?,
            cup_size: row.try_get("cup_size")?,
            band_size: row.try_get("band_size")?,
            waist_size: row.try_get("waist_size")?,
            hip_size: row.try_get("hip_size")?,
            breast_type: row.try_get("breast_type")?,
            career_start_year: row.try_get("career_start_year")?,
            career_end_year: row.try_get("career_end_year")?,
            created_at: str_to_datetime(&row.try_get::<String, _>("created_at")?)?,
            updated_at: str_to_datetime(&row.try_get::<String, _>("updated_at")?)?,
            deleted: int_to_bool(row.try_get("deleted")?),
        })
    }
}

impl DatabaseEntity for Performer {
    fn table() -> &'static Table {
        &PERFORMER_TABLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn assign_generated(&mut self, now: DateTime<Utc>) {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        if is_unset(&self.created_at) {
            self.created_at = now;
        }
        if is_unset(&self.updated_at) {
            self.updated_at = now;
        }
    }
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, InputObject)]
pub struct FuzzyDateInput {
    pub date: String,
    pub accuracy: DateAccuracyEnum,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, InputObject)]
pub struct MeasurementsInput {
    pub cup_size: Option<String>,
    pub band_size: Option<i32>,
    pub waist: Option<i32>,
    pub hip: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, InputObject)]
pub struct UrlInput {
    pub url: String,
    #[graphql(name = "type")]
    pub url_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, InputObject)]
pub struct BodyModificationInput {
    pub location: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, InputObject)]
pub struct PerformerCreateInput {
    pub name: String,
    pub disambiguation: Option<String>,
    pub aliases: Option<Vec<String>>,
    pub gender: Option<GenderEnum>,
    pub urls: Option<Vec<UrlInput>>,
    pub birthdate: Option<FuzzyDateInput>,
    pub ethnicity: Option<EthnicityEnum>,
    pub country: Option<String>,
    pub eye_color: Option<EyeColorEnum>,
    pub hair_color: Option<HairColorEnum>,
    pub height: Option<i32>,
    pub measurements: Option<MeasurementsInput>,
    pub breast_type: Option<BreastTypeEnum>,
    pub career_start_year: Option<i32>,
    pub career_end_year: Option<i32>,
    pub tattoos: Option<Vec<BodyModificationInput>>,
    pub piercings: Option<Vec<BodyModificationInput>>,
    pub image_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default, InputObject)]
pub struct PerformerUpdateInput {
    pub id: Uuid,
    pub name: Option<String>,
    pub disambiguation: Option<String>,
    pub aliases: Option<Vec<String>>,
    pub gender: Option<GenderEnum>,
    pub urls: Option<Vec<UrlInput>>,
    pub birthdate: Option<FuzzyDateInput>,
    pub ethnicity: Option<EthnicityEnum>,
    pub country: Option<String>,
    pub eye_color: Option<EyeColorEnum>,
    pub hair_color: Option<HairColorEnum>,
    pub height: Option<i32>,
    pub measurements: Option<MeasurementsInput>,
    pub breast_type: Option<BreastTypeEnum>,
    pub career_start_year: Option<i32>,
    pub career_end_year: Option<i32>,
    pub tattoos: Option<Vec<BodyModificationInput>>,
    pub piercings: Option<Vec<BodyModificationInput>>,
    pub image_ids: Option<Vec<Uuid>>,
}

// ============================================================================
// Join rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformerAlias {
    pub performer_id: Uuid,
    pub alias: String,
}

impl SqlRow for PerformerAlias {
    fn values(&self) -> Vec<SqlValue> {
        vec![self.performer_id.into(), self.alias.clone().into()]
    }

    fn from_row(row: &SqliteRow) -> DbResult<Self> {
        Ok(Self {
            performer_id: str_to_uuid(&row.try_get::<String, _>("performer_id")?)?,
            alias: row.try_get("alias")?,
        })
    }
}

impl JoinRow for PerformerAlias {
    fn parent_id(&self) -> Uuid {
        self.performer_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerformerAliases(pub Vec<PerformerAlias>);

impl PerformerAliases {
    pub fn from_aliases(performer_id: Uuid, aliases: &[String]) -> Self {
        Self(
            aliases
                .iter()
                .map(|alias| PerformerAlias {
                    performer_id,
                    alias: alias.clone(),
                })
                .collect(),
        )
    }

    pub fn to_aliases(&self) -> Vec<String> {
        self.0.iter().map(|a| a.alias.clone()).collect()
    }
}

impl RowCollection for PerformerAliases {
    type Row = PerformerAlias;

    fn each<F: FnMut(&Self::Row)>(&self, f: F) {
        self.0.iter().for_each(f);
    }

    fn add(&mut self, row: Self::Row) {
        self.0.push(row);
    }
}

/// A link to an external page about the performer
#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
pub struct Url {
    pub url: String,
    #[graphql(name = "type")]
    pub url_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformerUrl {
    pub performer_id: Uuid,
    pub url: String,
    pub url_type: String,
}

impl SqlRow for PerformerUrl {
    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.performer_id.into(),
            self.url.clone().into(),
            self.url_type.clone().into(),
        ]
    }

    fn from_row(row: &SqliteRow) -> DbResult<Self> {
        Ok(Self {
            performer_id: str_to_uuid(&row.try_get::<String, _>("performer_id")?)?,
            url: row.try_get("url")?,
            url_type: row.try_get("type")?,
        })
    }
}

impl JoinRow for PerformerUrl {
    fn parent_id(&self) -> Uuid {
        self.performer_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerformerUrls(pub Vec<PerformerUrl>);

impl PerformerUrls {
    pub fn from_inputs(performer_id: Uuid, urls: &[UrlInput]) -> Self {
        Self(
            urls.iter()
                .map(|u| PerformerUrl {
                    performer_id,
                    url: u.url.clone(),
                    url_type: u.url_type.clone(),
                })
                .collect(),
        )
    }

    pub fn to_urls(&self) -> Vec<Url> {
        self.0
            .iter()
            .map(|u| Url {
                url: u.url.clone(),
                url_type: u.url_type.clone(),
            })
            .collect()
    }
}

impl RowCollection for PerformerUrls {
    type Row = PerformerUrl;

    fn each<F: FnMut(&Self::Row)>(&self, f: F) {
        self.0.iter().for_each(f);
    }

    fn add(&mut self, row: Self::Row) {
        self.0.push(row);
    }
}

/// A tattoo or piercing
#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
pub struct BodyModification {
    pub location: String,
    pub description: Option<String>,
}

/// Row shared by the tattoo and piercing tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformerBodyMod {
    pub performer_id: Uuid,
    pub location: String,
    pub description: Option<String>,
}

impl SqlRow for PerformerBodyMod {
    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.performer_id.into(),
            self.location.clone().into(),
            self.description.clone().into(),
        ]
    }

    fn from_row(row: &SqliteRow) -> DbResult<Self> {
        Ok(Self {
            performer_id: str_to_uuid(&row.try_get::<String, _>("performer_id")?)?,
            location: row.try_get("location")?,
            description: row.try_get("description")?,
        })
    }
}

impl JoinRow for PerformerBodyMod {
    fn parent_id(&self) -> Uuid {
        self.performer_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerformerBodyMods(pub Vec<PerformerBodyMod>);

impl PerformerBodyMods {
    pub fn from_inputs(performer_id: Uuid, mods: &[BodyModificationInput]) -> Self {
        Self(
            mods.iter()
                .map(|m| PerformerBodyMod {
                    performer_id,
                    location: m.location.clone(),
                    description: m.description.clone(),
                })
                .collect(),
        )
    }

    pub fn to_body_modifications(&self) -> Vec<BodyModification> {
        self.0
            .iter()
            .map(|m| BodyModification {
                location: m.location.clone(),
                description: m.description.clone(),
            })
            .collect()
    }
}

impl RowCollection for PerformerBodyMods {
    type Row = PerformerBodyMod;

    fn each<F: FnMut(&Self::Row)>(&self, f: F) {
        self.0.iter().for_each(f);
    }

    fn add(&mut self, row: Self::Row) {
        self.0.push(row);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformerImage {
    pub performer_id: Uuid,
    pub image_id: Uuid,
}

impl SqlRow for PerformerImage {
    fn values(&self) -> Vec<SqlValue> {
        vec![self.performer_id.into(), self.image_id.into()]
    }

    fn from_row(row: &SqliteRow) -> DbResult<Self> {
        Ok(Self {
            performer_id: str_to_uuid(&row.try_get::<String, _>("performer_id")?)?,
            image_id: str_to_uuid(&row.try_get::<String, _>("image_id")?)?,
        })
    }
}

impl JoinRow for PerformerImage {
    fn parent_id(&self) -> Uuid {
        self.performer_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerformerImages(pub Vec<PerformerImage>);

impl PerformerImages {
    pub fn from_ids(performer_id: Uuid, image_ids: &[Uuid]) -> Self {
        Self(
            image_ids
                .iter()
                .map(|image_id| PerformerImage {
                    performer_id,
                    image_id: *image_id,
                })
                .collect(),
        )
    }

    pub fn image_ids(&self) -> Vec<Uuid> {
        self.0.iter().map(|i| i.image_id).collect()
    }
}

impl RowCollection for PerformerImages {
    type Row = PerformerImage;

    fn each<F: FnMut(&Self::Row)>(&self, f: F) {
        self.0.iter().for_each(f);
    }

    fn add(&mut self, row: Self::Row) {
        self.0.push(row);
    }
}
