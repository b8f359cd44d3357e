use axum::{Extension, Json, extract::State};
use chrono::Utc;
use duet_core::CoreError;
use duet_core::model::{Caller, User};
use duet_types::api::{ProfileResponse, UpdateProfileRequest};

use crate::error::{ApiError, ApiResult, blocking};
use crate::image::parse_avatar;
use crate::state::AppState;

fn to_response(user: User) -> ProfileResponse {
    let (relationship_id, relationship_days) = match user.relationship {
        Some(link) => (Some(link.relationship_id.0), link.relationship_days),
        None => (None, 0),
    };
    ProfileResponse {
        id: user.id.0,
        username: user.username,
        email: user.email,
        name: user.name,
        avatar: user.avatar.map(|image| image.data),
        relationship_id,
        relationship_days,
        created_at: user.created_at,
    }
}

/// The caller's profile, with the relationship fields re-derived on the way out.
pub async fn profile(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<ProfileResponse>> {
    let user =
        blocking(move || Ok(state.pairing.resolver().reconcile_user(caller.user_id)?)).await?;
    Ok(Json(to_response(user)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    let now = Utc::now();
    let name = match req.name {
        Some(name) => {
            let name = name.trim().to_string();
            if !(2..=100).contains(&name.chars().count()) {
                return Err(ApiError::bad_request("name must be 2 to 100 characters"));
            }
            Some(name)
        }
        None => None,
    };
    let avatar = match req.avatar.as_deref() {
        None => None,
        Some("") => Some(None),
        Some(data) => Some(Some(parse_avatar(data, now)?)),
    };

    let user = blocking(move || {
        let found = state.db.update_profile(
            caller.user_id,
            name.as_deref(),
            avatar.as_ref().map(Option::as_ref),
            now,
        )?;
        if !found {
            return Err(CoreError::NotFound("user").into());
        }
        Ok(state.pairing.resolver().reconcile_user(caller.user_id)?)
    })
    .await?;
    Ok(Json(to_response(user)))
}
