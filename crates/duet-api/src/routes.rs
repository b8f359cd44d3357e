use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, events, health, relationships, users, whispers};

/// Assemble the full HTTP surface. Everything except health and the account
/// endpoints sits behind the bearer-token middleware.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh));

    let protected_routes = Router::new()
        .route("/relationships/invite", post(relationships::generate_invite))
        .route("/relationships/join", post(relationships::join))
        .route("/relationships/current", get(relationships::current))
        .route("/relationships/disconnect", delete(relationships::disconnect))
        .route("/events", get(events::list_events).post(events::create_event))
        .route(
            "/events/{id}",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/whispers", get(whispers::list_whispers).post(whispers::create_whisper))
        .route(
            "/whispers/{id}",
            put(whispers::update_whisper).delete(whispers::delete_whisper),
        )
        .route("/whispers/{id}/convert", post(whispers::convert_whisper))
        .route("/users/profile", get(users::profile).put(users::update_profile))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, header};
    use chrono::Duration;
    use duet_db::Database;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::state::{AppStateInner, TokenConfig};

    fn app() -> Router {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let tokens = TokenConfig {
            secret: "test-secret".into(),
            access_ttl: Duration::hours(1),
            refresh_ttl: Duration::days(30),
        };
        let state = Arc::new(AppStateInner::new(db, tokens, Duration::days(7)));
        router(state)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn account(username: &str) -> Value {
        json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "name": "Someone",
            "password": "secret1"
        })
    }

    /// Register and return the full auth response.
    async fn register_full(app: &Router, username: &str) -> Value {
        let (status, body) =
            send(app, Method::POST, "/auth/register", None, Some(account(username))).await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    async fn register(app: &Router, username: &str) -> String {
        register_full(app, username).await["accessToken"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn pair(app: &Router, inviter: &str, redeemer: &str) -> Value {
        let (status, invite) = send(
            app,
            Method::POST,
            "/relationships/invite",
            Some(inviter),
            Some(json!({"firstMeetingDate": "2024-02-14"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let code = invite["inviteCode"].as_str().unwrap();

        let (status, rel) = send(
            app,
            Method::POST,
            "/relationships/join",
            Some(redeemer),
            Some(json!({"code": code})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        rel
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "duet");
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let app = app();
        let (status, _) = send(&app, Method::GET, "/relationships/current", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            send(&app, Method::GET, "/events", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_and_login() {
        let app = app();
        let ann = register_full(&app, "ann").await;
        assert_eq!(ann["email"], "ann@example.com");
        assert_eq!(ann["expiresIn"], 3600);
        assert!(ann["refreshToken"].is_string());

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "username": "ann",
                "email": "other@example.com",
                "name": "Other Ann",
                "password": "secret1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "conflict");
        assert_eq!(body["message"], "username already taken");

        // Emails are compared case-insensitively.
        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "username": "annie",
                "email": " ANN@example.com",
                "name": "Annie",
                "password": "secret1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "email already registered");

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"username": "cat", "name": "Cat", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"username": "ann", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["accessToken"].is_string());
        assert_eq!(body["email"], "ann@example.com");

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"username": "ann", "password": "wrong-password"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invite_join_and_disconnect() {
        let app = app();
        let ann = register(&app, "ann").await;
        let ben = register(&app, "ben").await;

        let (status, _) = send(&app, Method::GET, "/relationships/current", Some(&ann), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, invite) = send(
            &app,
            Method::POST,
            "/relationships/invite",
            Some(&ann),
            Some(json!({"firstMeetingDate": "2024-02-14T18:30:00Z"})),
        )
        .await;
        let code = invite["inviteCode"].as_str().unwrap();
        assert_eq!(code.len(), 8);

        let (status, body) = send(
            &app,
            Method::POST,
            "/relationships/join",
            Some(&ann),
            Some(json!({"code": code})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "self_redemption");

        // Typed codes are forgiving about case and surrounding spaces.
        let sloppy = format!("  {}  ", code.to_lowercase());
        let (status, rel) = send(
            &app,
            Method::POST,
            "/relationships/join",
            Some(&ben),
            Some(json!({"code": sloppy})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(rel["status"], "active");
        assert_eq!(rel["partners"].as_array().unwrap().len(), 2);
        assert_eq!(rel["firstMeetingDate"], "2024-02-14");

        let (status, current) =
            send(&app, Method::GET, "/relationships/current", Some(&ann), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(current["id"], rel["id"]);

        let (status, profile) = send(&app, Method::GET, "/users/profile", Some(&ben), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["relationshipId"], rel["id"]);

        let cat = register(&app, "cat").await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/relationships/join",
            Some(&cat),
            Some(json!({"code": code})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "invite_not_found");

        let (status, _) =
            send(&app, Method::POST, "/relationships/disconnect", Some(&ben), None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        let (status, _) =
            send(&app, Method::GET, "/relationships/current", Some(&ben), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) =
            send(&app, Method::DELETE, "/relationships/disconnect", Some(&ben), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) =
            send(&app, Method::GET, "/relationships/current", Some(&ann), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "no_active_relationship");

        let (_, profile) = send(&app, Method::GET, "/users/profile", Some(&ann), None).await;
        assert!(profile["relationshipId"].is_null());
        assert_eq!(profile["relationshipDays"], 0);
    }

    #[tokio::test]
    async fn events_are_private_to_the_couple() {
        let app = app();
        let ann = register(&app, "ann").await;
        let ben = register(&app, "ben").await;
        let cat = register(&app, "cat").await;
        let dan = register(&app, "dan").await;
        pair(&app, &ann, &ben).await;

        let (status, event) = send(
            &app,
            Method::POST,
            "/events",
            Some(&ann),
            Some(json!({
                "title": "First trip",
                "date": "2024-05-01T00:00:00Z",
                "type": "TRIP"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(event["category"], "activity");
        assert_eq!(event["sourceType"], "manual");
        let uri = format!("/events/{}", event["id"].as_str().unwrap());

        let (status, seen) = send(&app, Method::GET, &uri, Some(&ben), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(seen["title"], "First trip");

        // Unpaired callers have no relationship to scope by.
        let (status, _) = send(&app, Method::GET, &uri, Some(&cat), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        pair(&app, &cat, &dan).await;
        let (status, body) = send(&app, Method::GET, &uri, Some(&cat), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");

        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&dan),
            Some(json!({"title": "Mine now"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&cat), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, updated) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&ben),
            Some(json!({"title": "Lisbon", "isPublic": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Lisbon");
        assert_eq!(updated["isPublic"], true);

        let (_, theirs) = send(&app, Method::GET, "/events", Some(&cat), None).await;
        assert_eq!(theirs.as_array().unwrap().len(), 0);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&ann), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, Some(&ann), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn event_validation() {
        let app = app();
        let ann = register(&app, "ann").await;
        let ben = register(&app, "ben").await;
        pair(&app, &ann, &ben).await;

        for body in [
            json!({"title": "", "date": "2024-05-01T00:00:00Z", "type": "TRIP"}),
            json!({"title": "x".repeat(101), "date": "2024-05-01T00:00:00Z", "type": "TRIP"}),
            json!({"title": "ok", "date": "2024-05-01T00:00:00Z", "type": "PICNIC"}),
            json!({
                "title": "ok",
                "date": "2024-05-01T00:00:00Z",
                "type": "TRIP",
                "image": {"type": "url", "data": "ftp://example.com/a.png"}
            }),
        ] {
            let (status, _) = send(&app, Method::POST, "/events", Some(&ann), Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn whisper_lifecycle_and_conversion() {
        let app = app();
        let ann = register(&app, "ann").await;
        let ben = register(&app, "ben").await;
        pair(&app, &ann, &ben).await;

        let (status, whisper) = send(
            &app,
            Method::POST,
            "/whispers",
            Some(&ann),
            Some(json!({
                "type": "wish",
                "text": "Picnic by the river",
                "recurrence": "once",
                "date": "2024-06-01T00:00:00Z"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = whisper["id"].as_str().unwrap().to_string();

        let (status, updated) = send(
            &app,
            Method::PUT,
            &format!("/whispers/{id}"),
            Some(&ben),
            Some(json!({"isDone": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["isDone"], true);
        assert_eq!(updated["text"], "Picnic by the river");

        let (status, event) = send(
            &app,
            Method::POST,
            &format!("/whispers/{id}/convert"),
            Some(&ben),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(event["type"], "DATE");
        assert_eq!(event["title"], "Picnic by the river");
        assert_eq!(event["sourceType"], "whisper_converted");
        assert_eq!(event["sourceId"], id.as_str());

        let (status, _) = send(
            &app,
            Method::POST,
            "/whispers",
            Some(&ann),
            Some(json!({
                "type": "wish",
                "text": "x",
                "recurrence": "monthly",
                "date": "2024-06-01T00:00:00Z"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send(&app, Method::DELETE, &format!("/whispers/{id}"), Some(&ann), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, list) = send(&app, Method::GET, "/whispers", Some(&ben), None).await;
        assert_eq!(list.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn refresh_issues_a_new_access_token() {
        let app = app();
        let ann = register_full(&app, "ann").await;
        let access = ann["accessToken"].as_str().unwrap();
        let refresh = ann["refreshToken"].as_str().unwrap();

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["refreshToken"], refresh);
        assert_eq!(body["expiresIn"], 3600);
        let fresh = body["accessToken"].as_str().unwrap();
        let (status, _) = send(&app, Method::GET, "/users/profile", Some(fresh), None).await;
        assert_eq!(status, StatusCode::OK);

        // Each token only works in its own place.
        let (status, _) = send(&app, Method::GET, "/users/profile", Some(refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": access})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": "garbage"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_name_and_avatar_updates() {
        let app = app();
        let ann = register(&app, "ann").await;

        let (status, profile) = send(&app, Method::GET, "/users/profile", Some(&ann), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["email"], "ann@example.com");
        assert!(profile["avatar"].is_null());

        let (status, profile) = send(
            &app,
            Method::PUT,
            "/users/profile",
            Some(&ann),
            Some(json!({"name": "  Ann Lee  ", "avatar": "data:image/png;base64,aGVsbG8="})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["name"], "Ann Lee");
        assert_eq!(profile["avatar"], "aGVsbG8=");

        // Absent fields stay as they were.
        let (status, profile) =
            send(&app, Method::PUT, "/users/profile", Some(&ann), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["name"], "Ann Lee");
        assert_eq!(profile["avatar"], "aGVsbG8=");

        let (status, profile) = send(
            &app,
            Method::PUT,
            "/users/profile",
            Some(&ann),
            Some(json!({"avatar": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(profile["avatar"].is_null());
        assert_eq!(profile["name"], "Ann Lee");

        for body in [
            json!({"name": "A"}),
            json!({"avatar": "not base64!"}),
            json!({"avatar": "https://example.com/me.png"}),
        ] {
            let (status, _) =
                send(&app, Method::PUT, "/users/profile", Some(&ann), Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn event_image_can_be_removed() {
        let app = app();
        let ann = register(&app, "ann").await;
        let ben = register(&app, "ben").await;
        pair(&app, &ann, &ben).await;

        let (status, event) = send(
            &app,
            Method::POST,
            "/events",
            Some(&ann),
            Some(json!({
                "title": "Beach day",
                "date": "2024-07-01T00:00:00Z",
                "type": "TRIP",
                "image": {"type": "url", "data": "https://example.com/beach.jpg"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(event["image"]["type"], "url");
        let uri = format!("/events/{}", event["id"].as_str().unwrap());

        // Updates that leave `image` out keep it.
        let (_, kept) =
            send(&app, Method::PUT, &uri, Some(&ben), Some(json!({"title": "Beach"}))).await;
        assert_eq!(kept["image"]["data"], "https://example.com/beach.jpg");

        let (status, cleared) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&ben),
            Some(json!({"image": {"type": ""}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(cleared["image"].is_null());
        assert_eq!(cleared["title"], "Beach");

        let (_, fetched) = send(&app, Method::GET, &uri, Some(&ann), None).await;
        assert!(fetched["image"].is_null());
    }
}
