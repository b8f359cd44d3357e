use std::sync::Arc;

use chrono::Duration;
use duet_core::{CoreContext, EventService, PairingEngine, WhisperService};
use duet_db::Database;

pub type AppState = Arc<AppStateInner>;

/// Signing secret and lifetimes for the two kinds of JWT.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub tokens: TokenConfig,
    pub pairing: PairingEngine<Database>,
    pub events: EventService<Database>,
    pub whispers: WhisperService<Database>,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, tokens: TokenConfig, invite_ttl: Duration) -> Self {
        let ctx = CoreContext::default();
        Self {
            pairing: PairingEngine::new(db.clone(), ctx.clone()).with_invite_ttl(invite_ttl),
            events: EventService::new(db.clone(), ctx.clone()),
            whispers: WhisperService::new(db.clone(), ctx),
            db,
            tokens,
        }
    }
}
