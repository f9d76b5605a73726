//! User-location tracking and log upload service.
//!
//! Exposes a liveness probe, a `users` table upsert/list API, and a CSV upload
//! endpoint that streams files into an object-storage bucket.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
