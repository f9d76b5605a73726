//! Liveness handler.
//!
//! - ANY /_ah/health -> "ok"

/// `ANY /_ah/health`
///
/// Always answers 200 with a plain `ok`. Touches neither the database nor the
/// bucket, so it stays green while either of them is down.
pub async fn health() -> &'static str {
    "ok"
}
