//! Process-wide dependencies shared by every handler.

use crate::services::{storage::ObjectStore, user_service::UserService};
use std::sync::Arc;

/// Built once at startup and cloned into each request; every field is a cheap
/// handle onto a shared, concurrency-safe client.
#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub storage: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub public_url_base: String,
}

impl AppState {
    pub fn new(
        users: UserService,
        storage: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        public_url_base: impl Into<String>,
    ) -> Self {
        Self {
            users,
            storage,
            bucket: bucket.into(),
            public_url_base: public_url_base.into(),
        }
    }
}
