use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use duet_core::model::{Caller, UserId};
use duet_types::api::TokenKind;

use crate::auth::decode_token;
use crate::state::AppState;

/// Validate the bearer token and attach the caller's identity to the request.
/// Handlers take `Extension<Caller>` and never look at the token again.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = decode_token(&state.tokens.secret, bearer.token(), TokenKind::Access)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut()
        .insert(Caller::new(UserId(claims.sub), claims.username));
    Ok(next.run(req).await)
}
