pub mod auth;
pub mod error;
pub mod events;
pub mod health;
pub mod image;
pub mod middleware;
pub mod relationships;
pub mod routes;
pub mod state;
pub mod users;
pub mod whispers;

pub use routes::router;
pub use state::{AppState, AppStateInner, TokenConfig};
