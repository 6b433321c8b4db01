//! Bottle payloads: JSON or multipart bodies turned into validated changes.

use crate::AppState;
use crate::error::AppError;
use crate::imaging::{self, ImageUpload, ProcessedImage};
use crate::validation::{
    self, COUNTRY_MAX_LEN, FieldErrors, GRAPE_MAX_LEN, NAME_MAX_LEN, PRODUCER_MAX_LEN,
    PURCHASE_PLACE_MAX_LEN, REGION_MAX_LEN, ValidationError,
};

use axum::Json;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use cellar_db::{BottleChanges, BottleFilter, Color, NewBottle, Status};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;

/// Multipart part carrying the bottle photo
pub const IMAGE_FIELD: &str = "image";

/// Fields that must be present on create and full update
const REQUIRED_FIELDS: [&str; 4] = ["name", "year", "producer", "country"];

/// What the request asked to do with the bottle photo.
#[derive(Debug)]
pub enum ImageField {
    Keep,
    Clear,
    Upload(ImageUpload),
}

/// Raw bottle payload from a JSON object or a multipart form.
///
/// Multipart text parts arrive as JSON strings; an empty text part means "clear".
#[derive(Debug)]
pub struct BottlePayload {
    pub fields: Map<String, Value>,
    pub image: ImageField,
}

impl FromRequest<Arc<AppState>> for BottlePayload {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?;
            return read_multipart(multipart).await;
        }

        let Json(body) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?;
        let Value::Object(mut fields) = body else {
            return Err(AppError::BadRequest(
                "Expected a JSON object.".to_string(),
            ));
        };

        // A non-null image stays in the map and is rejected as "not a file"
        let image = if matches!(fields.get(IMAGE_FIELD), Some(Value::Null)) {
            fields.remove(IMAGE_FIELD);
            ImageField::Clear
        } else {
            ImageField::Keep
        };
        Ok(Self { fields, image })
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<BottlePayload, AppError> {
    let mut fields = Map::new();
    let mut image = ImageField::Keep;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?;

        let is_image = name == IMAGE_FIELD;
        match file_name {
            // Browsers send an empty file part when no file was chosen
            Some(_) if is_image && bytes.is_empty() => {}
            Some(file_name) if is_image => {
                image = ImageField::Upload(ImageUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            None if is_image && bytes.is_empty() => image = ImageField::Clear,
            _ => {
                let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
                    AppError::BadRequest(format!("Field {name} is not valid UTF-8."))
                })?;
                fields.insert(name, Value::String(text));
            }
        }
    }

    Ok(BottlePayload { fields, image })
}

/// Which update semantics apply to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    /// PUT: required fields must be present
    Replace,
    /// PATCH: any subset
    Partial,
}

/// What to do with the stored photo after validation.
#[derive(Debug)]
pub enum ImageChange {
    Keep,
    Clear,
    Replace(ProcessedImage),
}

/// A payload that passed every field check.
#[derive(Debug)]
pub struct ValidatedBottle {
    pub changes: BottleChanges,
    pub image: ImageChange,
}

impl BottlePayload {
    /// Check every field and process the photo, collecting all errors.
    pub async fn validate(
        self,
        mode: FormMode,
        current_year: i32,
    ) -> Result<ValidatedBottle, FieldErrors> {
        let mut errors = FieldErrors::new();
        let changes = parse_fields(&self.fields, mode, current_year)
            .map_err(|e| errors.merge(e))
            .ok();

        let image = match self.image {
            ImageField::Keep => ImageChange::Keep,
            ImageField::Clear => ImageChange::Clear,
            ImageField::Upload(upload) => match imaging::process_upload(upload).await {
                Ok(processed) => ImageChange::Replace(processed),
                Err(e) => {
                    errors.add(IMAGE_FIELD, e);
                    ImageChange::Keep
                }
            },
        };

        match changes {
            Some(changes) if errors.is_empty() => Ok(ValidatedBottle { changes, image }),
            _ => Err(errors),
        }
    }
}

impl ValidatedBottle {
    /// Build a new record from a create payload, applying field defaults.
    pub fn into_new_bottle(
        changes: BottleChanges,
        image: Option<String>,
    ) -> Result<NewBottle, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut require = |field: &str, present: bool| {
            if !present {
                errors.add(field, ValidationError::Required);
            }
        };
        require("name", changes.name.is_some());
        require("year", changes.year.is_some());
        require("producer", changes.producer.is_some());
        require("country", changes.country.is_some());

        let (Some(name), Some(year), Some(producer), Some(country)) =
            (changes.name, changes.year, changes.producer, changes.country)
        else {
            return Err(errors);
        };

        Ok(NewBottle {
            name,
            year,
            producer,
            country,
            region: changes.region.flatten(),
            color: changes.color.unwrap_or_default(),
            grape: changes.grape.flatten(),
            quantity: changes.quantity.unwrap_or(1),
            status: changes.status.unwrap_or_default(),
            purchase_date: changes.purchase_date.flatten(),
            purchase_place: changes.purchase_place.flatten(),
            price: changes.price.flatten(),
            estimated_value: changes.estimated_value.flatten(),
            description: changes.description.flatten(),
            tasting_note: changes.tasting_note.flatten(),
            rating: changes.rating.flatten(),
            image,
        })
    }
}

/// Parse every recognised field present in `fields`. Read-only and unknown
/// keys (`id`, `owner`, `date_added`, derived values) are ignored.
pub fn parse_fields(
    fields: &Map<String, Value>,
    mode: FormMode,
    current_year: i32,
) -> Result<BottleChanges, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut changes = BottleChanges::default();

    if mode != FormMode::Partial {
        for field in REQUIRED_FIELDS {
            if !fields.contains_key(field) {
                errors.add(field, ValidationError::Required);
            }
        }
    }

    for (key, value) in fields {
        if let Err(e) = apply_field(&mut changes, key, value, current_year) {
            errors.add(key, e);
        }
    }

    errors.into_result(changes)
}

fn apply_field(
    changes: &mut BottleChanges,
    key: &str,
    value: &Value,
    current_year: i32,
) -> Result<(), ValidationError> {
    match key {
        "name" => changes.name = Some(required_text(value, NAME_MAX_LEN)?),
        "producer" => changes.producer = Some(required_text(value, PRODUCER_MAX_LEN)?),
        "country" => changes.country = Some(required_text(value, COUNTRY_MAX_LEN)?),
        "year" => {
            let year = non_null(as_integer(value)?)?;
            changes.year = Some(validation::validate_year(year, current_year)?);
        }
        "region" => changes.region = Some(optional_text(value, Some(REGION_MAX_LEN))?),
        "grape" => changes.grape = Some(optional_text(value, Some(GRAPE_MAX_LEN))?),
        "purchase_place" => {
            changes.purchase_place = Some(optional_text(value, Some(PURCHASE_PLACE_MAX_LEN))?)
        }
        "description" => changes.description = Some(optional_text(value, None)?),
        "tasting_note" => changes.tasting_note = Some(optional_text(value, None)?),
        "color" => changes.color = Some(choice::<Color>(value)?),
        "status" => changes.status = Some(choice::<Status>(value)?),
        "quantity" => {
            let quantity = non_null(as_integer(value)?)?;
            changes.quantity = Some(validation::validate_quantity(quantity)?);
        }
        "purchase_date" => changes.purchase_date = Some(as_date(value)?),
        "price" => {
            changes.price = Some(
                as_number(value)?
                    .map(validation::validate_price)
                    .transpose()?,
            )
        }
        "estimated_value" => {
            changes.estimated_value = Some(
                as_number(value)?
                    .map(validation::validate_estimated_value)
                    .transpose()?,
            )
        }
        "rating" => {
            changes.rating = Some(
                as_integer(value)?
                    .map(validation::validate_rating)
                    .transpose()?,
            )
        }
        IMAGE_FIELD => return Err(ValidationError::NotAFile),
        _ => {}
    }
    Ok(())
}

fn non_null<T>(value: Option<T>) -> Result<T, ValidationError> {
    value.ok_or(ValidationError::Null)
}

fn as_text(value: &Value) -> Result<Option<String>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(ValidationError::NotAString),
    }
}

fn required_text(value: &Value, max: usize) -> Result<String, ValidationError> {
    let text = non_null(as_text(value)?)?;
    validation::validate_required_text(&text, max)
}

fn optional_text(value: &Value, max: Option<usize>) -> Result<Option<String>, ValidationError> {
    validation::validate_optional_text(as_text(value)?.as_deref(), max)
}

/// Integers arrive as JSON numbers or, from forms, as strings. Blank is null.
fn as_integer(value: &Value) -> Result<Option<i64>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .map(Some)
            .ok_or(ValidationError::NotAnInteger),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ValidationError::NotAnInteger),
        _ => Err(ValidationError::NotAnInteger),
    }
}

fn as_number(value: &Value) -> Result<Option<f64>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().map(Some).ok_or(ValidationError::NotANumber),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or(ValidationError::NotANumber),
        _ => Err(ValidationError::NotANumber),
    }
}

fn as_date(value: &Value) -> Result<Option<NaiveDate>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_date(s).map(Some),
        _ => Err(ValidationError::InvalidDate),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate)
}

fn choice<T: FromStr>(value: &Value) -> Result<T, ValidationError> {
    let raw = non_null(as_text(value)?)?;
    raw.parse().map_err(|_| ValidationError::InvalidChoice(raw))
}

/// `GET /bottles/` query string. Empty parameters are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct BottleQuery {
    pub search: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub date_added: Option<String>,
}

impl BottleQuery {
    pub fn into_filter(self) -> Result<BottleFilter, FieldErrors> {
        fn present(value: Option<String>) -> Option<String> {
            value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }

        fn parse_choice<T: FromStr>(
            errors: &mut FieldErrors,
            field: &str,
            raw: Option<String>,
        ) -> Option<T> {
            raw.and_then(|raw| errors.check(field, choice(&Value::String(raw))))
        }

        let mut errors = FieldErrors::new();

        let color: Option<Color> = parse_choice(&mut errors, "color", present(self.color));
        let status: Option<Status> = parse_choice(&mut errors, "status", present(self.status));
        let date_added = present(self.date_added)
            .and_then(|raw| errors.check("date_added", parse_date(&raw)));

        errors.into_result(BottleFilter {
            search: present(self.search),
            color,
            status,
            region: present(self.region),
            country: present(self.country),
            date_added,
        })
    }
}
