//! Represents an object (blob) written to the configured bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type every uploaded log file is tagged with, whatever its bytes are.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Metadata of a stored object; the payload itself lives in the object store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoredObject {
    /// Object key; for uploads this is the client-supplied filename, verbatim.
    pub key: String,

    /// Content type (MIME type).
    pub content_type: String,

    /// Size in bytes.
    pub size_bytes: u64,

    /// Checksum or backend-issued entity tag, when one is available.
    pub etag: Option<String>,

    /// Timestamp when the object was written.
    pub last_modified: DateTime<Utc>,
}
