//! Core data models for the user-location and log-upload service.
//!
//! `UserLocation` maps to the `users` table via `sqlx::FromRow` and serializes
//! as JSON via `serde`. `StoredObject` describes a blob written to the bucket.

pub mod object;
pub mod user;
