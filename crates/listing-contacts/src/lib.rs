//! Contact relationship management for real-estate listings.
//!
//! The [`contacts`] module holds the contact entity, the listing-interest index, and notes.
//! Storage is reached through the traits in [`contacts::store`] so the service can run against
//! the in-memory stores shipped here or any other backend.

pub mod config;
pub mod contacts;
pub mod error;
pub mod telemetry;
