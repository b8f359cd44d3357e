use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use duet_core::model::{Caller, WhisperId};
use duet_core::store::Page;
use duet_core::whisper::{NewWhisper, Recurrence, Whisper, WhisperChanges};
use duet_types::api::{
    ConvertWhisperRequest, CreateWhisperRequest, ListQuery, UpdateWhisperRequest, WhisperResponse,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, blocking};
use crate::events;
use crate::image::parse_image;
use crate::state::AppState;

const MAX_TEXT_CHARS: usize = 200;

pub fn to_response(whisper: Whisper) -> WhisperResponse {
    WhisperResponse {
        id: whisper.id.0,
        kind: whisper.kind,
        text: whisper.text,
        recurrence: whisper.recurrence.to_string(),
        date: whisper.date,
        relationship_id: whisper.relationship_id.0,
        created_by: whisper.created_by.0,
        is_done: whisper.is_done,
        created_at: whisper.created_at,
        updated_at: whisper.updated_at,
    }
}

fn check_text(text: &str) -> ApiResult<()> {
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(ApiError::bad_request("text must be at most 200 characters"));
    }
    Ok(())
}

fn parse_recurrence(raw: &str) -> ApiResult<Recurrence> {
    raw.parse().map_err(ApiError::BadRequest)
}

pub async fn create_whisper(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateWhisperRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.kind.trim().is_empty() {
        return Err(ApiError::bad_request("type is required"));
    }
    check_text(&req.text)?;
    let new = NewWhisper {
        kind: req.kind,
        text: req.text,
        recurrence: parse_recurrence(&req.recurrence)?,
        date: req.date,
    };

    let whisper = blocking(move || Ok(state.whispers.create(&caller, new)?)).await?;
    Ok((StatusCode::CREATED, Json(to_response(whisper))))
}

pub async fn list_whispers(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<WhisperResponse>>> {
    let page = Page::new(query.limit, query.offset);
    let whispers = blocking(move || Ok(state.whispers.list(&caller, page)?)).await?;
    Ok(Json(whispers.into_iter().map(to_response).collect()))
}

pub async fn update_whisper(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateWhisperRequest>,
) -> ApiResult<Json<WhisperResponse>> {
    if let Some(text) = &req.text {
        check_text(text)?;
    }
    let changes = WhisperChanges {
        text: req.text,
        recurrence: req.recurrence.as_deref().map(parse_recurrence).transpose()?,
        date: req.date,
        is_done: req.is_done,
    };

    let whisper =
        blocking(move || Ok(state.whispers.update(&caller, WhisperId(id), changes)?)).await?;
    Ok(Json(to_response(whisper)))
}

pub async fn delete_whisper(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    blocking(move || Ok(state.whispers.delete(&caller, WhisperId(id))?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /whispers/{id}/convert`. The body is optional.
pub async fn convert_whisper(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let req: ConvertWhisperRequest = if body.is_empty() {
        ConvertWhisperRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid body: {e}")))?
    };
    let image = parse_image(req.image, Utc::now())?;
    let event = blocking(move || {
        Ok(state.whispers.convert_to_event(&caller, WhisperId(id), image)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(events::to_response(event))))
}
