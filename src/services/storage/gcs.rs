//! Google Cloud Storage backend.
//!
//! Uses the XML API's single-request `PUT` upload, streaming the request body
//! so the payload is never buffered in memory.

use super::{ObjectStore, PayloadStream, StorageError, StorageResult, escape_key};
use crate::models::object::StoredObject;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use gcp_auth::TokenProvider;
use reqwest::{
    Body, RequestBuilder, Response, StatusCode,
    header::{CONTENT_TYPE, ETAG},
};
use std::{
    fmt, io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

const GCS_ENDPOINT: &str = "https://storage.googleapis.com";
const READ_WRITE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

pub struct Gcs {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl Gcs {
    /// Connect to Google Cloud Storage using the ambient credentials
    /// (service account file, metadata server, or gcloud user credentials).
    pub async fn new(bucket: &str) -> StorageResult<Self> {
        let token_provider = gcp_auth::provider().await?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: GCS_ENDPOINT.into(),
            bucket: bucket.into(),
            token_provider: Some(token_provider),
        })
    }

    /// Talk to a GCS-compatible endpoint without authentication, e.g. an emulator.
    pub fn without_token(endpoint: &str, bucket: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').into(),
            bucket: bucket.into(),
            token_provider: None,
        }
    }

    /// A key that is itself a dot segment cannot be addressed by any URL.
    fn object_url(&self, key: &str) -> StorageResult<String> {
        if key.is_empty() || key == "." || key == ".." {
            return Err(StorageError::InvalidObjectKey(key.to_string()));
        }
        Ok(format!("{}/{}/{}", self.endpoint, self.bucket, escape_key(key)))
    }

    async fn authorize(&self, builder: RequestBuilder) -> StorageResult<RequestBuilder> {
        match &self.token_provider {
            Some(provider) => {
                let token = provider.token(&[READ_WRITE_SCOPE]).await?;
                Ok(builder.bearer_auth(token.as_str()))
            }
            None => Ok(builder),
        }
    }

    async fn ensure_success(response: Response) -> StorageResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::UnexpectedStatus { status, body })
    }
}

impl fmt::Debug for Gcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gcs")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("authenticated", &self.token_provider.is_some())
            .finish_non_exhaustive()
    }
}

fn header_string(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string())
}

#[async_trait::async_trait]
impl ObjectStore for Gcs {
    fn name(&self) -> &'static str {
        "gcs"
    }

    #[tracing::instrument(level = "debug", skip(self, stream), fields(bucket = %self.bucket))]
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        stream: PayloadStream,
    ) -> StorageResult<StoredObject> {
        let written = Arc::new(AtomicU64::new(0));
        let counter = written.clone();
        let body = stream.inspect_ok(move |chunk| {
            counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        });

        let builder = self
            .client
            .put(self.object_url(key)?)
            .header(CONTENT_TYPE, content_type)
            .body(Body::wrap_stream(body));
        let response = self.authorize(builder).await?.send().await?;
        let response = Self::ensure_success(response).await?;

        Ok(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size_bytes: written.load(Ordering::Relaxed),
            etag: header_string(&response, ETAG),
            last_modified: Utc::now(),
        })
    }

    #[tracing::instrument(level = "debug", skip(self), fields(bucket = %self.bucket))]
    async fn get_object(&self, key: &str) -> StorageResult<Option<(StoredObject, PayloadStream)>> {
        let builder = self.client.get(self.object_url(key)?);
        let response = self.authorize(builder).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ensure_success(response).await?;

        let object = StoredObject {
            key: key.to_string(),
            content_type: header_string(&response, CONTENT_TYPE)
                .unwrap_or_else(|| "application/octet-stream".into()),
            size_bytes: response.content_length().unwrap_or_default(),
            etag: header_string(&response, ETAG),
            last_modified: Utc::now(),
        };
        let stream = response.bytes_stream().map_err(io::Error::other).boxed();
        Ok(Some((object, stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};
    use futures::stream;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(parts: &[&'static str]) -> PayloadStream {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    #[tokio::test]
    async fn put_streams_body_with_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/logs/data.csv"))
            .and(header("content-type", "text/csv"))
            .and(body_bytes(b"x,y\n1,2".to_vec()))
            .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"abc123\""))
            .expect(1)
            .mount(&server)
            .await;

        let gcs = Gcs::without_token(&server.uri(), "logs");
        let stored = gcs
            .put_object("data.csv", "text/csv", payload(&["x,y\n", "1,2"]))
            .await
            .unwrap();

        assert_eq!(stored.key, "data.csv");
        assert_eq!(stored.size_bytes, 7);
        assert_eq!(stored.etag.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn keys_are_escaped_in_request_path() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/logs/my%20log.csv"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let gcs = Gcs::without_token(&server.uri(), "logs");
        gcs.put_object("my log.csv", "text/csv", payload(&["a"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dot_segment_keys_stay_inside_bucket() {
        let server = MockServer::start().await;
        for expected in ["/logs/a%2F..%2Fb.csv", "/logs/..%2Fescape.csv", "/logs/.%2Fc.csv"] {
            Mock::given(method("PUT"))
                .and(path(expected))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;
        }

        let gcs = Gcs::without_token(&server.uri(), "logs");
        for key in ["a/../b.csv", "../escape.csv", "./c.csv"] {
            let stored = gcs
                .put_object(key, "text/csv", payload(&["x"]))
                .await
                .unwrap();
            assert_eq!(stored.key, key);
        }
    }

    #[tokio::test]
    async fn bare_dot_keys_are_rejected() {
        let gcs = Gcs::without_token("http://127.0.0.1:9", "logs");
        for key in ["", ".", ".."] {
            let err = gcs
                .put_object(key, "text/csv", payload(&["x"]))
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidObjectKey(_)), "{key:?}");
        }
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("AccessDenied"))
            .mount(&server)
            .await;

        let gcs = Gcs::without_token(&server.uri(), "logs");
        let err = gcs
            .put_object("data.csv", "text/csv", payload(&["x"]))
            .await
            .unwrap_err();

        match err {
            StorageError::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "AccessDenied");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn get_reads_payload_or_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logs/data.csv"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/csv")
                    .set_body_bytes(b"x,y\n1,2".to_vec()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/logs/missing.csv"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gcs = Gcs::without_token(&server.uri(), "logs");
        let (object, stream) = gcs.get_object("data.csv").await.unwrap().unwrap();
        let bytes: BytesMut = stream.try_collect().await.unwrap();
        assert_eq!(object.content_type, "text/csv");
        assert_eq!(&bytes[..], b"x,y\n1,2");

        assert!(gcs.get_object("missing.csv").await.unwrap().is_none());
    }
}
