//! Duet core: invite-code pairing, relationship lifecycle and
//! relationship-scoped authorization for events and whispers.
//!
//! Everything here is synchronous and storage-agnostic. Persistence is reached
//! through the traits in [`store`]; time and observability are injected through
//! [`CoreContext`].

pub mod clock;
pub mod code;
pub mod engine;
pub mod error;
pub mod event;
pub mod guard;
pub mod model;
pub mod observe;
pub mod resolver;
pub mod store;
pub mod whisper;

#[cfg(test)]
mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use engine::{IssuedInvite, PairingEngine};
pub use error::{CoreError, CoreResult, ErrorKind, StoreError, StoreResult};
pub use event::EventService;
pub use guard::AccessGuard;
pub use resolver::RelationshipResolver;
pub use whisper::WhisperService;

use clock::{Clock, SystemClock};
use observe::{PairingEvent, PairingObserver, TracingObserver};

/// Collaborators shared by every core component.
#[derive(Clone)]
pub struct CoreContext {
    pub clock: Arc<dyn Clock>,
    pub observer: Arc<dyn PairingObserver>,
}

impl CoreContext {
    pub fn new(clock: Arc<dyn Clock>, observer: Arc<dyn PairingObserver>) -> Self {
        Self { clock, observer }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn emit(&self, event: PairingEvent) {
        self.observer.emit(event);
    }
}

impl Default for CoreContext {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(TracingObserver))
    }
}
