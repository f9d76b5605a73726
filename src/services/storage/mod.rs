//! Object storage for uploaded log files.
//!
//! [`ObjectStore`] is the seam between the upload handler and the bucket. Two
//! backends implement it: [`Gcs`] talks to Google Cloud Storage (or an
//! emulator) over HTTP, [`LocalFs`] keeps objects in a directory tree.

use crate::models::object::StoredObject;
use bytes::Bytes;
use futures::stream::BoxStream;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::{fmt::Debug, io};
use thiserror::Error;

mod gcs;
mod local_fs;

pub use gcs::Gcs;
pub use local_fs::LocalFs;

/// Streamed object payload.
pub type PayloadStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("object store responded with {status}: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("GCP authentication error: {0}")]
    GcpAuth(#[from] gcp_auth::Error),
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait::async_trait]
pub trait ObjectStore: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Write `stream` under `key`, replacing any existing object.
    ///
    /// An error yielded by the stream aborts the write.
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        stream: PayloadStream,
    ) -> StorageResult<StoredObject>;

    /// Read back an object, or `None` if nothing is stored under `key`.
    async fn get_object(&self, key: &str) -> StorageResult<Option<(StoredObject, PayloadStream)>>;
}

/// Characters escaped in an object key when it is placed in a URL path.
///
/// Unreserved characters, `/` and the sub-delimiters allowed in paths pass through.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// Same as [`PATH_ESCAPE`], but `/` is escaped too so the key stays one segment.
const SEGMENT_ESCAPE: &AsciiSet = &PATH_ESCAPE.add(b'/');

/// Percent-escape an object key for use as a URL path.
///
/// URL parsers collapse `.` and `..` segments, which would point the URL at a
/// different object. Keys containing such segments are escaped as a single
/// segment (`/` becomes `%2F`) so they still address the verbatim key.
pub fn escape_key(key: &str) -> String {
    let set = if key.split('/').any(|segment| segment == "." || segment == "..") {
        SEGMENT_ESCAPE
    } else {
        PATH_ESCAPE
    };
    utf8_percent_encode(key, set).to_string()
}

/// Public URL of `key` in `bucket`, e.g. `https://storage.googleapis.com/logs/data.csv`.
pub fn public_url(base: &str, bucket: &str, key: &str) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        escape_key(bucket),
        escape_key(key)
    )
}
