use crate::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, AppPath, AppQuery};
use crate::forms::{BottlePayload, BottleQuery, FormMode, ImageChange, ValidatedBottle};
use crate::helpers::{current_year, today};
use crate::imaging::ProcessedImage;
use crate::media::MediaStore;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use axum_macros::debug_handler;
use cellar_db::{Bottle, Color, Status};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub(crate) struct BottleResponse {
    id: i64,
    owner: i64,
    name: String,
    year: i32,
    producer: String,
    country: String,
    region: Option<String>,
    color: Color,
    grape: Option<String>,
    quantity: u32,
    status: Status,
    date_added: NaiveDate,
    purchase_date: Option<NaiveDate>,
    purchase_place: Option<String>,
    price: Option<f64>,
    estimated_value: Option<f64>,
    description: Option<String>,
    tasting_note: Option<String>,
    rating: Option<u8>,
    /// Public URL of the photo
    image: Option<String>,
    age: i32,
    is_drinkable: bool,
    total_value: Option<f64>,
}

impl BottleResponse {
    fn new(bottle: Bottle, media: &MediaStore) -> Self {
        Self {
            age: bottle.age(current_year()),
            is_drinkable: bottle.is_drinkable(),
            total_value: bottle.total_value(),
            image: bottle.image.as_deref().map(|path| media.url(path)),
            id: bottle.id,
            owner: bottle.owner_id,
            name: bottle.name,
            year: bottle.year,
            producer: bottle.producer,
            country: bottle.country,
            region: bottle.region,
            color: bottle.color,
            grape: bottle.grape,
            quantity: bottle.quantity,
            status: bottle.status,
            date_added: bottle.date_added,
            purchase_date: bottle.purchase_date,
            purchase_place: bottle.purchase_place,
            price: bottle.price,
            estimated_value: bottle.estimated_value,
            description: bottle.description,
            tasting_note: bottle.tasting_note,
            rating: bottle.rating,
        }
    }
}

#[debug_handler(state = Arc<AppState>)]
pub(crate) async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppQuery(query): AppQuery<BottleQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = query.into_filter()?;
    let bottles = state.db.list_bottles(user.id, filter).await?;

    let body: Vec<BottleResponse> = bottles
        .into_iter()
        .map(|bottle| BottleResponse::new(bottle, &state.media))
        .collect();
    Ok(Json(body))
}

#[debug_handler(state = Arc<AppState>)]
pub(crate) async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: BottlePayload,
) -> Result<impl IntoResponse, AppError> {
    let validated = payload.validate(FormMode::Create, current_year()).await?;
    let mut new_bottle = ValidatedBottle::into_new_bottle(validated.changes, None)?;

    if let ImageChange::Replace(image) = validated.image {
        new_bottle.image = Some(store_image(&state.media, image).await?);
    }
    let stored_image = new_bottle.image.clone();

    let bottle = match state.db.create_bottle(user.id, new_bottle, today()).await {
        Ok(bottle) => bottle,
        Err(e) => {
            if let Some(path) = stored_image {
                state.media.delete(&path).await;
            }
            return Err(e.into());
        }
    };

    tracing::info!(bottle.id, owner = user.id, "bottle created");
    Ok((
        StatusCode::CREATED,
        Json(BottleResponse::new(bottle, &state.media)),
    ))
}

#[debug_handler(state = Arc<AppState>)]
pub(crate) async fn retrieve(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let bottle = state.db.get_bottle(user.id, id).await?;
    Ok(Json(BottleResponse::new(bottle, &state.media)))
}

/// PUT: name, year, producer and country are required
#[debug_handler(state = Arc<AppState>)]
pub(crate) async fn replace(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
    payload: BottlePayload,
) -> Result<impl IntoResponse, AppError> {
    update(&state, user.id, id, payload, FormMode::Replace).await
}

/// PATCH: any subset of fields
#[debug_handler(state = Arc<AppState>)]
pub(crate) async fn partial_update(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
    payload: BottlePayload,
) -> Result<impl IntoResponse, AppError> {
    update(&state, user.id, id, payload, FormMode::Partial).await
}

async fn update(
    state: &AppState,
    owner_id: i64,
    id: i64,
    payload: BottlePayload,
    mode: FormMode,
) -> Result<Json<BottleResponse>, AppError> {
    // Not found (or not ours) wins over validation errors
    state.db.get_bottle(owner_id, id).await?;

    let validated = payload.validate(mode, current_year()).await?;
    let mut changes = validated.changes;

    let mut stored_image = None;
    match validated.image {
        ImageChange::Keep => {}
        ImageChange::Clear => changes.image = Some(None),
        ImageChange::Replace(image) => {
            let path = store_image(&state.media, image).await?;
            changes.image = Some(Some(path.clone()));
            stored_image = Some(path);
        }
    }

    let (bottle, previous_image) = match state.db.update_bottle(owner_id, id, changes).await {
        Ok(updated) => updated,
        Err(e) => {
            if let Some(path) = stored_image {
                state.media.delete(&path).await;
            }
            return Err(e.into());
        }
    };

    if let Some(old) = previous_image.filter(|old| bottle.image.as_ref() != Some(old)) {
        state.media.delete(&old).await;
    }

    tracing::info!(bottle.id, owner = owner_id, ?mode, "bottle updated");
    Ok(Json(BottleResponse::new(bottle, &state.media)))
}

async fn store_image(media: &MediaStore, image: ProcessedImage) -> Result<String, AppError> {
    let path = media.save_bottle_image(&image.file_name, &image.bytes).await?;
    tracing::debug!(
        %path,
        image.width,
        image.height,
        image.compressed,
        "stored bottle photo"
    );
    Ok(path)
}

#[debug_handler(state = Arc<AppState>)]
pub(crate) async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let bottle = state.db.delete_bottle(user.id, id).await?;
    if let Some(image) = &bottle.image {
        state.media.delete(image).await;
    }

    tracing::info!(bottle.id, owner = user.id, "bottle deleted");
    Ok(StatusCode::NO_CONTENT)
}
