use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use duet_core::event::{Event, EventChanges, EventKind, NewEvent};
use duet_core::model::{Caller, EventId};
use duet_core::store::Page;
use duet_types::api::{CreateEventRequest, EventResponse, ListQuery, UpdateEventRequest};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, blocking};
use crate::image::{self, parse_image};
use crate::state::AppState;

pub fn to_response(event: Event) -> EventResponse {
    EventResponse {
        id: event.id.0,
        category: event.category().to_string(),
        title: event.title,
        description: event.description,
        date: event.date,
        kind: event.kind.as_str().to_string(),
        relationship_id: event.relationship_id.0,
        created_by: event.created_by.0,
        is_public: event.is_public,
        image: event.image.map(image::to_response),
        source_type: event.source.as_str().to_string(),
        source_id: event.source.source_id().map(|id| id.0),
        created_at: event.created_at,
        updated_at: event.updated_at,
    }
}

fn check_title(title: &str) -> ApiResult<()> {
    let len = title.trim().chars().count();
    if !(1..=100).contains(&len) {
        return Err(ApiError::bad_request("title must be 1 to 100 characters"));
    }
    Ok(())
}

fn check_description(description: &str) -> ApiResult<()> {
    if description.chars().count() > 500 {
        return Err(ApiError::bad_request("description must be at most 500 characters"));
    }
    Ok(())
}

fn parse_kind(raw: &str) -> ApiResult<EventKind> {
    raw.parse().map_err(ApiError::BadRequest)
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateEventRequest>,
) -> ApiResult<impl IntoResponse> {
    check_title(&req.title)?;
    check_description(&req.description)?;
    let new = NewEvent {
        title: req.title.trim().to_string(),
        description: req.description,
        date: req.date,
        kind: parse_kind(&req.kind)?,
        image: parse_image(req.image, Utc::now())?,
    };

    let event = blocking(move || Ok(state.events.create(&caller, new)?)).await?;
    Ok((StatusCode::CREATED, Json(to_response(event))))
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<EventResponse>>> {
    let page = Page::new(query.limit, query.offset);
    let events = blocking(move || Ok(state.events.list(&caller, page)?)).await?;
    Ok(Json(events.into_iter().map(to_response).collect()))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EventResponse>> {
    let event = blocking(move || Ok(state.events.get(&caller, EventId(id))?)).await?;
    Ok(Json(to_response(event)))
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEventRequest>,
) -> ApiResult<Json<EventResponse>> {
    if let Some(title) = &req.title {
        check_title(title)?;
    }
    if let Some(description) = &req.description {
        check_description(description)?;
    }
    let changes = EventChanges {
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description,
        date: req.date,
        kind: req.kind.as_deref().map(parse_kind).transpose()?,
        // A payload with an empty type clears the image.
        image: req.image.map(|p| parse_image(Some(p), Utc::now())).transpose()?,
        is_public: req.is_public,
    };

    let event = blocking(move || Ok(state.events.update(&caller, EventId(id), changes)?)).await?;
    Ok(Json(to_response(event)))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    blocking(move || Ok(state.events.delete(&caller, EventId(id))?)).await?;
    Ok(StatusCode::NO_CONTENT)
}
