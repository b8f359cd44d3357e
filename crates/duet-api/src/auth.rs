use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use duet_core::StoreError;
use duet_core::model::UserId;
use duet_db::users::NewAccount;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, info};
use uuid::Uuid;

use duet_types::api::{
    AuthResponse, Claims, LoginRequest, RefreshRequest, RegisterRequest, TokenKind, TokenResponse,
};

use crate::error::{ApiError, ApiResult, blocking};
use crate::state::{AppState, TokenConfig};

/// Loose shape check: something before the `@`, a dot somewhere after it.
fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_registration(req: &RegisterRequest) -> ApiResult<()> {
    let username_len = req.username.chars().count();
    if !(3..=30).contains(&username_len) {
        return Err(ApiError::bad_request("username must be 3 to 30 characters"));
    }
    if !valid_email(&normalize_email(&req.email)) {
        return Err(ApiError::bad_request("email is not valid"));
    }
    if req.password.chars().count() < 6 {
        return Err(ApiError::bad_request("password must be at least 6 characters"));
    }
    let name_len = req.name.trim().chars().count();
    if !(2..=100).contains(&name_len) {
        return Err(ApiError::bad_request("name must be 2 to 100 characters"));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_registration(&req)?;

    let user_id = Uuid::new_v4();
    let email = normalize_email(&req.email);
    let username = req.username.clone();
    let db = state.clone();
    let account_email = email.clone();
    blocking(move || {
        if db.db.get_user_by_username(&req.username)?.is_some() {
            return Err(ApiError::Conflict("username already taken".into()));
        }
        if db.db.get_user_by_email(&account_email)?.is_some() {
            return Err(ApiError::Conflict("email already registered".into()));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
            .to_string();

        let account = NewAccount {
            id: UserId(user_id),
            username: &req.username,
            email: &account_email,
            name: req.name.trim(),
            password_hash: &password_hash,
        };
        // A concurrent registration can still win between the lookups and the insert.
        db.db.create_user(&account, Utc::now()).map_err(|e| match e {
            StoreError::Conflict => {
                ApiError::Conflict("username or email already registered".into())
            }
            StoreError::Backend(e) => e.into(),
        })
    })
    .await?;

    let tokens = issue_pair(&state.tokens, user_id, &username)?;
    info!("user {username} registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id,
            username,
            email,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let user = blocking(move || {
        let user = db
            .db
            .get_user_by_username(&req.username)?
            .ok_or(ApiError::Unauthorized)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored hash unreadable: {e}"))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized)?;
        Ok(user)
    })
    .await?;

    let user_id: Uuid = user.id.parse().map_err(anyhow::Error::from)?;
    let tokens = issue_pair(&state.tokens, user_id, &user.username)?;

    Ok(Json(AuthResponse {
        user_id,
        username: user.username,
        email: user.email,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
    }))
}

/// `POST /auth/refresh`. Trades a refresh token for a new access token. The
/// refresh token is returned unchanged and keeps its original expiry.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let claims = decode_token(&state.tokens.secret, &req.refresh_token, TokenKind::Refresh)
        .ok_or(ApiError::Unauthorized)?;

    // Deleted accounts cannot refresh, and a renamed one gets its current username.
    let db = state.clone();
    let user = blocking(move || {
        db.db
            .get_user_by_id(UserId(claims.sub))?
            .ok_or(ApiError::Unauthorized)
    })
    .await?;

    let user_id: Uuid = user.id.parse().map_err(anyhow::Error::from)?;
    let access_token = create_token(&state.tokens, user_id, &user.username, TokenKind::Access)?;
    debug!("refreshed access token for {}", user.username);

    Ok(Json(TokenResponse {
        access_token,
        refresh_token: req.refresh_token,
        expires_in: state.tokens.access_ttl.num_seconds(),
    }))
}

fn issue_pair(tokens: &TokenConfig, user_id: Uuid, username: &str) -> ApiResult<TokenResponse> {
    Ok(TokenResponse {
        access_token: create_token(tokens, user_id, username, TokenKind::Access)?,
        refresh_token: create_token(tokens, user_id, username, TokenKind::Refresh)?,
        expires_in: tokens.access_ttl.num_seconds(),
    })
}

pub fn create_token(
    tokens: &TokenConfig,
    user_id: Uuid,
    username: &str,
    kind: TokenKind,
) -> ApiResult<String> {
    let ttl = match kind {
        TokenKind::Access => tokens.access_ttl,
        TokenKind::Refresh => tokens.refresh_ttl,
    };
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
        kind,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(tokens.secret.as_bytes()),
    )
    .map_err(anyhow::Error::from)?;

    Ok(token)
}

/// Decode and verify a token, accepting it only if it is of the expected kind.
pub fn decode_token(secret: &str, token: &str, expected: TokenKind) -> Option<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    (data.claims.kind == expected).then_some(data.claims)
}
