//! Core domain + application logic for the Telegram group membership manager.
//!
//! This crate is intentionally framework-agnostic. The Telegram Bot API
//! transport and the MTProto user-client both live behind ports (traits);
//! adapters plug in from the outside.

pub mod admins;
pub mod client;
pub mod config;
pub mod csv;
pub mod delay;
pub mod domain;
pub mod errors;
pub mod export;
pub mod formatting;
pub mod groups;
pub mod invite;
pub mod logging;
pub mod messaging;
pub mod onboarding;
pub mod partition;
pub mod registry;
pub mod store;

pub use errors::{Error, Result};
