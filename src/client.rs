use std::{path::Path, sync::Arc, time::Duration};

use tokio::{
    fs::File,
    io::AsyncReadExt,
    sync::mpsc,
};
use tracing::{error, info, instrument};

use crate::{
    adapters::{s3, ObjectAdapter},
    model::{
        config::ConnectionConfig,
        error::{Result, StoreError},
        object::{ListRequest, ObjectEntry, UploadedPart},
    },
};

/// Upper bound of keys per DeleteObjects request.
pub const DELETE_BATCH_SIZE: usize = 1000;

pub const MAX_KEY_LEN: usize = 1024;

/// Files larger than this go up as a multipart upload.
pub const DEFAULT_PART_SIZE: u64 = 16 * 1024 * 1024;

/// S3 caps a multipart upload at this many parts.
pub const MAX_PARTS: u64 = 10_000;

const DELIMITER: &str = "/";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Handle to an S3-compatible store. Cloning is cheap and clones share the
/// same connection pool.
#[derive(Clone)]
pub struct ObjectStoreClient {
    adapter: Arc<dyn ObjectAdapter>,
    part_size: u64,
}

impl ObjectStoreClient {
    /// Connects with static credentials. Fails only on a malformed endpoint;
    /// reachability is not checked.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let client = s3::connect(config)?;
        Ok(Self::with_adapter(Arc::new(client)))
    }

    /// Connects with credentials and region from the AWS environment chain.
    pub async fn from_env(endpoint: Option<&str>, secure: bool) -> Result<Self> {
        let client = s3::connect_from_env(endpoint, secure).await?;
        Ok(Self::with_adapter(Arc::new(client)))
    }

    pub fn with_adapter(adapter: Arc<dyn ObjectAdapter>) -> Self {
        Self {
            adapter,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Sets the multipart threshold and part size for uploads. The provider
    /// rejects parts under 5 MiB other than the last one.
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    /// Creates `bucket`. A bucket already owned by the caller is not an error.
    #[instrument(skip(self), fields(context = "create_bucket"))]
    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        check_bucket(bucket)?;

        match self.adapter.create_bucket(bucket).await {
            Err(err) if err.is_already_exists() => {
                info!("bucket already owned, skipping");
                Ok(())
            }
            res => res,
        }
    }

    /// Empties `bucket` and removes it.
    ///
    /// Keys are streamed from a recursive listing into batched deletes; the
    /// bucket itself is removed only after every batch has completed. The
    /// first failure, from the listing or from a batch, aborts the sequence
    /// and leaves the remaining batches and the bucket in place.
    #[instrument(skip(self), fields(context = "delete_bucket"))]
    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        check_bucket(bucket)?;

        let adapter = &self.adapter;
        let (tx, mut rx) = mpsc::channel::<String>(DELETE_BATCH_SIZE);

        let producer = async move {
            let mut token = None;
            loop {
                let req = ListRequest {
                    continuation_token: token.take(),
                    ..Default::default()
                };
                let page = adapter.list_objects_page(bucket, req).await?;

                for entry in page.entries {
                    // receiver gone means the consumer failed, its error wins
                    if tx.send(entry.key).await.is_err() {
                        return Ok(());
                    }
                }

                token = page.next_continuation_token;
                if token.is_none() {
                    break;
                }
            }

            Ok::<_, StoreError>(())
        };

        let consumer = async {
            let mut batch = Vec::with_capacity(DELETE_BATCH_SIZE);
            let mut deleted = 0;

            while let Some(key) = rx.recv().await {
                batch.push(key);
                if batch.len() == DELETE_BATCH_SIZE {
                    adapter.delete_objects(bucket, &batch).await?;
                    deleted += batch.len();
                    batch.clear();
                }
            }

            if !batch.is_empty() {
                adapter.delete_objects(bucket, &batch).await?;
                deleted += batch.len();
            }

            Ok::<_, StoreError>(deleted)
        };

        let (_, deleted) = tokio::try_join!(producer, consumer).map_err(|err| {
            error!(error_message=%err, error_group="empty_bucket");
            err
        })?;
        info!(deleted = deleted, "emptied bucket");

        self.adapter.delete_bucket(bucket).await
    }

    #[instrument(skip(self), fields(context = "bucket_exists"))]
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        check_bucket(bucket)?;
        self.adapter.bucket_exists(bucket).await
    }

    #[instrument(skip(self), fields(context = "list_buckets"))]
    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        self.adapter.list_buckets().await
    }

    /// Streams the local file at `source` into `bucket/key`, replacing any
    /// existing object. The content type is guessed from the key, then from
    /// the file name.
    ///
    /// Files larger than the part size are sent as a multipart upload, which
    /// is aborted if any part fails.
    #[instrument(skip(self, source), fields(context = "upload_file", source = %source.as_ref().display()))]
    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        source: impl AsRef<Path>,
    ) -> Result<()> {
        check_bucket(bucket)?;
        check_key(key)?;

        let source = source.as_ref();
        let content_type = guess_content_type(key, source);

        let size = tokio::fs::metadata(source)
            .await
            .map_err(|err| StoreError::from_io(err, &source.display().to_string()))?
            .len();

        if size <= self.part_size {
            return self
                .adapter
                .put_object_from_path(bucket, key, source, Some(content_type.as_str()))
                .await;
        }

        let upload_id = self
            .adapter
            .create_multipart_upload(bucket, key, Some(content_type.as_str()))
            .await?;
        info!(upload_id = %upload_id, size = size, "started multipart upload");

        match self.upload_parts(bucket, key, &upload_id, source, size).await {
            Ok(parts) => {
                self.adapter
                    .complete_multipart_upload(bucket, key, &upload_id, &parts)
                    .await
            }
            Err(err) => {
                if let Err(abort_err) = self
                    .adapter
                    .abort_multipart_upload(bucket, key, &upload_id)
                    .await
                {
                    error!(error_message=%abort_err, error_group="abort_multipart_upload");
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        source: &Path,
        size: u64,
    ) -> Result<Vec<UploadedPart>> {
        let part_size = self.part_size.max(size.div_ceil(MAX_PARTS));
        let mut file = File::open(source)
            .await
            .map_err(|err| StoreError::from_io(err, &source.display().to_string()))?;

        let mut parts = Vec::new();
        let mut part_number = 1;
        loop {
            let mut body = Vec::with_capacity(part_size as usize);
            (&mut file)
                .take(part_size)
                .read_to_end(&mut body)
                .await
                .map_err(|err| StoreError::from_io(err, &source.display().to_string()))?;
            if body.is_empty() {
                break;
            }

            let part = self
                .adapter
                .upload_part(bucket, key, upload_id, part_number, body)
                .await?;
            parts.push(part);
            part_number += 1;
        }

        Ok(parts)
    }

    /// Streams `bucket/key` into the local file at `dest`, creating or
    /// truncating it. Returns the number of bytes written.
    #[instrument(skip(self, dest), fields(context = "download_file", dest = %dest.as_ref().display()))]
    pub async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        dest: impl AsRef<Path>,
    ) -> Result<u64> {
        check_bucket(bucket)?;
        check_key(key)?;

        self.adapter
            .get_object_to_path(bucket, key, dest.as_ref())
            .await
    }

    /// Lists every entry of `bucket`. Without `recursive`, only the top
    /// level is returned and deeper keys are folded into `/`-terminated
    /// prefix entries.
    pub async fn list_objects(&self, bucket: &str, recursive: bool) -> Result<Vec<ObjectEntry>> {
        self.list_objects_with_prefix(bucket, "", recursive).await
    }

    #[instrument(skip(self), fields(context = "list_objects"))]
    pub async fn list_objects_with_prefix(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectEntry>> {
        check_bucket(bucket)?;

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let req = ListRequest {
                prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
                delimiter: (!recursive).then(|| DELIMITER.to_string()),
                continuation_token,
            };

            let page = self.adapter.list_objects_page(bucket, req).await?;
            objects.extend(page.entries);

            continuation_token = page.next_continuation_token;
            if continuation_token.is_none() {
                break;
            }
        }

        info!(count = objects.len(), "listed");
        Ok(objects)
    }

    /// Removes `bucket/key`. Removing a key that does not exist succeeds, as
    /// DeleteObject does on S3; a missing bucket is still NotFound.
    #[instrument(skip(self), fields(context = "delete_object"))]
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        check_bucket(bucket)?;
        check_key(key)?;

        self.adapter.delete_object(bucket, key).await
    }

    /// Copies `old_key` to `new_key`, then deletes `old_key`.
    ///
    /// Not atomic: if the delete fails, both keys exist and the error is
    /// returned. Nothing is rolled back.
    #[instrument(skip(self), fields(context = "rename_object"))]
    pub async fn rename_object(&self, bucket: &str, old_key: &str, new_key: &str) -> Result<()> {
        check_bucket(bucket)?;
        check_key(old_key)?;
        check_key(new_key)?;

        // copying onto itself then deleting would lose the object
        if old_key == new_key {
            return Err(StoreError::InvalidArgument(format!(
                "rename source and destination are the same: {}",
                old_key
            )));
        }

        self.adapter.copy_object(bucket, old_key, new_key).await?;
        self.adapter.delete_object(bucket, old_key).await
    }

    /// Issues a GET URL for `bucket/key` valid for `expiry_secs` seconds.
    #[instrument(skip(self), fields(context = "generate_presigned_url"))]
    pub async fn generate_presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expiry_secs: i64,
    ) -> Result<String> {
        check_bucket(bucket)?;
        check_key(key)?;

        if expiry_secs <= 0 {
            return Err(StoreError::InvalidArgument(format!(
                "presign expiry must be positive, got: {}",
                expiry_secs
            )));
        }

        self.adapter
            .presign_get_object(bucket, key, Duration::from_secs(expiry_secs as u64))
            .await
    }
}

fn check_bucket(bucket: &str) -> Result<()> {
    if bucket.is_empty() || bucket.contains('/') {
        return Err(StoreError::InvalidArgument(format!(
            "malformed bucket name: {:?}",
            bucket
        )));
    }

    Ok(())
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(StoreError::InvalidArgument(format!(
            "object key must be 1 to {} bytes, got {}",
            MAX_KEY_LEN,
            key.len()
        )));
    }

    Ok(())
}

fn guess_content_type(key: &str, source: &Path) -> String {
    mime_guess::from_path(key)
        .first()
        .or_else(|| mime_guess::from_path(source).first())
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}
