//! Local-disk object store.
//!
//! Payloads live at `{root}/{bucket}/objects/{key}` and their metadata at
//! `{root}/{bucket}/meta/{key}.json`. Writes go to a temp file first and are
//! renamed into place only once the whole stream has been consumed.

use super::{ObjectStore, PayloadStream, StorageError, StorageResult};
use crate::models::object::StoredObject;
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Debug, Clone)]
pub struct LocalFs {
    bucket_root: PathBuf,
}

impl LocalFs {
    /// Store objects of `bucket` beneath `base_path`.
    pub fn new(base_path: impl Into<PathBuf>, bucket: &str) -> Self {
        let mut bucket_root = base_path.into();
        bucket_root.push(bucket);
        Self { bucket_root }
    }

    /// Keys become relative paths here, so anything that could escape the
    /// bucket directory is refused.
    fn ensure_key_safe(key: &str) -> StorageResult<()> {
        let invalid = || StorageError::InvalidObjectKey(key.to_string());
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(invalid());
        }
        if key.starts_with('/') || key.ends_with('/') || key.contains("..") {
            return Err(invalid());
        }
        if key.split('/').any(|segment| segment.is_empty() || segment == ".") {
            return Err(invalid());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.bucket_root.join("objects").join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.bucket_root.join("meta").join(format!("{}.json", key))
    }

    async fn ensure_parent(path: &Path) -> StorageResult<PathBuf> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        Ok(parent)
    }

    async fn write_payload(
        file: &mut File,
        stream: &mut PayloadStream,
    ) -> io::Result<(u64, Context)> {
        let mut size_bytes = 0u64;
        let mut digest = Context::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as u64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok((size_bytes, digest))
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalFs {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        mut stream: PayloadStream,
    ) -> StorageResult<StoredObject> {
        Self::ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = Self::ensure_parent(&file_path).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let (size_bytes, digest) = match Self::write_payload(&mut file, &mut stream).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let object = StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            etag: Some(format!("{:x}", digest.compute())),
            last_modified: Utc::now(),
        };

        let meta_path = self.meta_path(key);
        Self::ensure_parent(&meta_path).await?;
        fs::write(&meta_path, serde_json::to_vec(&object)?).await?;

        debug!(path = %file_path.display(), size_bytes, "wrote object to disk");
        Ok(object)
    }

    async fn get_object(&self, key: &str) -> StorageResult<Option<(StoredObject, PayloadStream)>> {
        Self::ensure_key_safe(key)?;

        let meta = match fs::read(self.meta_path(key)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        };
        let object: StoredObject = serde_json::from_slice(&meta)?;

        let file = match File::open(self.object_path(key)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        };

        Ok(Some((object, ReaderStream::new(file).boxed())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};
    use futures::{TryStreamExt, stream};

    fn payload(chunks: Vec<io::Result<&'static str>>) -> PayloadStream {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| c.map(|s| Bytes::from_static(s.as_bytes()))),
        )
        .boxed()
    }

    async fn read_back(store: &LocalFs, key: &str) -> (StoredObject, Bytes) {
        let (object, stream) = store.get_object(key).await.unwrap().unwrap();
        let bytes: BytesMut = stream.try_collect().await.unwrap();
        (object, bytes.freeze())
    }

    #[tokio::test]
    async fn round_trips_payload_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFs::new(dir.path(), "logs");

        let stored = store
            .put_object("data.csv", "text/csv", payload(vec![Ok("x,y\n"), Ok("1,2")]))
            .await
            .unwrap();
        assert_eq!(stored.size_bytes, 7);
        assert_eq!(stored.etag.as_deref(), Some(&*format!("{:x}", md5::compute("x,y\n1,2"))));

        let (object, bytes) = read_back(&store, "data.csv").await;
        assert_eq!(object, stored);
        assert_eq!(object.content_type, "text/csv");
        assert_eq!(&bytes[..], b"x,y\n1,2");
    }

    #[tokio::test]
    async fn same_key_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFs::new(dir.path(), "logs");

        store
            .put_object("a.csv", "text/csv", payload(vec![Ok("first")]))
            .await
            .unwrap();
        store
            .put_object("a.csv", "text/csv", payload(vec![Ok("second")]))
            .await
            .unwrap();

        let (_, bytes) = read_back(&store, "a.csv").await;
        assert_eq!(&bytes[..], b"second");
    }

    #[tokio::test]
    async fn stream_error_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFs::new(dir.path(), "logs");

        let err = store
            .put_object(
                "broken.csv",
                "text/csv",
                payload(vec![Ok("x,y\n"), Err(io::Error::other("connection reset"))]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));

        assert!(store.get_object("broken.csv").await.unwrap().is_none());
        let leftovers = std::fs::read_dir(dir.path().join("logs").join("objects"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn missing_object_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFs::new(dir.path(), "logs");
        assert!(store.get_object("nope.csv").await.unwrap().is_none());
    }

    #[test]
    fn traversal_keys_are_rejected() {
        for key in [
            "", ".", "a/./b", "a//b", "/etc/passwd", "../secret", "a/../../b", "dir/", "a\\b", "a\nb",
        ] {
            assert!(
                matches!(
                    LocalFs::ensure_key_safe(key),
                    Err(StorageError::InvalidObjectKey(_))
                ),
                "{key:?} should be rejected"
            );
        }
        assert!(LocalFs::ensure_key_safe("2024/10/data.csv").is_ok());
    }
}
