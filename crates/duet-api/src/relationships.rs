use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use duet_core::model::{Caller, Relationship};
use duet_types::api::{
    GenerateInviteRequest, GenerateInviteResponse, JoinRequest, RelationshipPartner,
    RelationshipResponse,
};

use crate::error::{ApiError, ApiResult, blocking};
use crate::state::AppState;

pub fn to_response(rel: Relationship) -> RelationshipResponse {
    RelationshipResponse {
        id: rel.id.0,
        status: rel.status.to_string(),
        partners: rel
            .partners
            .into_iter()
            .map(|p| RelationshipPartner {
                user_id: p.user_id.0,
                joined_at: p.joined_at,
            })
            .collect(),
        invite_code: rel.invite_code,
        first_meeting_date: rel.first_meeting_date,
        created_at: rel.created_at,
        updated_at: rel.updated_at,
    }
}

pub async fn generate_invite(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<GenerateInviteRequest>,
) -> ApiResult<impl IntoResponse> {
    let issued = blocking(move || {
        Ok(state.pairing.issue_invite(&caller, req.first_meeting_date)?)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(GenerateInviteResponse {
            invite_code: issued.code,
            expires_at: issued.expires_at,
        }),
    ))
}

pub async fn join(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<JoinRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.code.trim().is_empty() {
        return Err(ApiError::bad_request("code is required"));
    }
    let rel = blocking(move || Ok(state.pairing.redeem_invite(&caller, &req.code)?)).await?;
    Ok((StatusCode::CREATED, Json(to_response(rel))))
}

pub async fn current(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<RelationshipResponse>> {
    let rel = blocking(move || Ok(state.pairing.current(&caller)?)).await?;
    Ok(Json(to_response(rel)))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<StatusCode> {
    blocking(move || Ok(state.pairing.disconnect(&caller)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}
