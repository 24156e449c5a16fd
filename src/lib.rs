//! AREMS webhook dispatcher: Telegram and form-platform webhooks in front of
//! a document store and a media bucket.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod webhook;
