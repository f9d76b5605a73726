//! HTTP handler for log file uploads.
//!
//! The `file` field of the multipart form is streamed into the object store
//! while it is still being received; nothing is buffered beyond a few chunks.

use crate::{
    errors::AppError,
    models::object::CSV_CONTENT_TYPE,
    services::storage::{PayloadStream, public_url},
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartRejection},
    },
};
use futures::{SinkExt, StreamExt, channel::mpsc};
use std::io;

/// Multipart form field carrying the uploaded file.
const FILE_FIELD: &str = "file";

/// Chunks in flight between the request body and the object store.
const CHANNEL_CAPACITY: usize = 8;

/// `POST /log` — store the uploaded CSV under its original filename.
pub async fn upload_log(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, AppError> {
    let mut multipart =
        multipart.map_err(|err| AppError::bad_request(format!("Could not get file: {}", err)))?;

    let field = loop {
        let next = multipart
            .next_field()
            .await
            .map_err(|err| AppError::bad_request(format!("Could not get file: {}", err)))?;
        match next {
            Some(field) if field.name() == Some(FILE_FIELD) => break field,
            Some(_) => continue,
            None => {
                return Err(AppError::bad_request(format!(
                    "Could not get file: no `{}` field in form",
                    FILE_FIELD
                )));
            }
        }
    };

    let filename = match field.file_name() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            return Err(AppError::bad_request(format!(
                "Could not get file: `{}` field has no filename",
                FILE_FIELD
            )));
        }
    };

    tracing::debug!(key = %filename, backend = state.storage.name(), "receiving log upload");

    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_CAPACITY);
    let payload: PayloadStream = rx.boxed();

    let (copied, stored) = tokio::join!(
        forward_field(field, tx),
        state
            .storage
            .put_object(&filename, CSV_CONTENT_TYPE, payload)
    );

    copied.map_err(|err| AppError::internal(format!("Could not write file: {}", err)))?;
    let object = stored?;

    tracing::info!(
        key = %object.key,
        size_bytes = object.size_bytes,
        etag = ?object.etag,
        "stored log file"
    );

    let url = public_url(&state.public_url_base, &state.bucket, &object.key);
    Ok(format!("Successful! URL: {}", url))
}

/// Copy every chunk of `field` into `tx`.
///
/// A read failure is also sent downstream so the store aborts instead of
/// committing a truncated object. If the store stops listening, copying stops
/// quietly and the store's own error is the one reported.
async fn forward_field(
    mut field: Field<'_>,
    mut tx: mpsc::Sender<io::Result<Bytes>>,
) -> io::Result<()> {
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if tx.send(Ok(chunk)).await.is_err() {
                    return Ok(());
                }
            }
            Ok(None) => return Ok(()),
            Err(err) => {
                let message = err.to_string();
                let _ = tx.send(Err(io::Error::other(message.clone()))).await;
                return Err(io::Error::other(message));
            }
        }
    }
}
