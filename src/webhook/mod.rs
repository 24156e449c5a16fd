//! Webhook surface: one HTTP entrypoint shared by the messaging platform and
//! the form platform.

pub mod form;
pub mod messaging;
pub mod routes;

pub use routes::{AppState, webhook_routes};
