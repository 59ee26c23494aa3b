use std::{io, path::Path, time::Duration};

use aws_sdk_s3::{
    config::{http::HttpResponse, BehaviorVersion, Credentials, Region},
    error::{ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime},
    types::{
        BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
        CreateBucketConfiguration, Delete, ObjectIdentifier,
    },
};
use futures::future::BoxFuture;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, span, Instrument, Level};

use crate::{
    adapters::adapter::ObjectAdapter,
    model::{
        config::{normalize_endpoint, ConnectionConfig, DEFAULT_REGION},
        error::{classify, Result, StoreError},
        object::{ListPage, ListRequest, ObjectEntry, UploadedPart},
    },
};

const CREDENTIALS_PROVIDER: &str = "objstore-static";

/// Builds an SDK client from static credentials. Only the endpoint is
/// validated; nothing is sent over the network.
pub fn connect(config: &ConnectionConfig) -> Result<aws_sdk_s3::Client> {
    let endpoint = config.endpoint_url()?;
    let credentials = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        CREDENTIALS_PROVIDER,
    );

    let s3_config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .endpoint_url(endpoint)
        .credentials_provider(credentials)
        .force_path_style(config.path_style)
        .build();

    Ok(aws_sdk_s3::Client::from_conf(s3_config))
}

/// Builds an SDK client from the standard AWS environment and profile chain,
/// optionally pointed at a self-hosted endpoint with path-style addressing.
pub async fn connect_from_env(endpoint: Option<&str>, secure: bool) -> Result<aws_sdk_s3::Client> {
    let sdk_config = aws_config::load_from_env().await;
    let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);

    if sdk_config.region().is_none() {
        builder = builder.region(Region::new(DEFAULT_REGION));
    }

    if let Some(endpoint) = endpoint {
        builder = builder
            .endpoint_url(normalize_endpoint(endpoint, secure)?)
            .force_path_style(true);
    }

    Ok(aws_sdk_s3::Client::from_conf(builder.build()))
}

fn sdk_failure<E>(err: SdkError<E, HttpResponse>, group: &'static str, target: &str) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let err = StoreError::from_sdk(err, &format!("failed to {} at: {}", group, target));
    error!(error_message=%err, error_group=group);
    err
}

/// us-east-1 is the implicit location and must not be sent as a constraint.
fn location_constraint(region: Option<&str>) -> Option<&str> {
    region.filter(|region| !region.is_empty() && *region != DEFAULT_REGION)
}

fn to_offset_date_time(dt: &DateTime) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos()).ok()
}

/// Percent-encodes each path segment of a key, leaving the separators.
fn encode_copy_source(bucket: &str, key: &str) -> String {
    let encoded = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    format!("{}/{}", bucket, encoded)
}

impl ObjectAdapter for aws_sdk_s3::Client {
    fn create_bucket<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, Result<()>> {
        let span = span!(Level::INFO, "create_bucket", context = "create_bucket", bucket = bucket);

        Box::pin(
            async move {
                let region = self.config().region().map(|r| r.as_ref().to_string());
                info!(region = ?region, "called");

                let mut req = self.create_bucket().bucket(bucket);
                if let Some(constraint) = location_constraint(region.as_deref()) {
                    req = req.create_bucket_configuration(
                        CreateBucketConfiguration::builder()
                            .location_constraint(BucketLocationConstraint::from(constraint))
                            .build(),
                    );
                }

                req.send()
                    .await
                    .map_err(|err| sdk_failure(err, "create_bucket", bucket))?;

                Ok(())
            }
            .instrument(span),
        )
    }

    fn delete_bucket<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, Result<()>> {
        let span = span!(Level::INFO, "delete_bucket", context = "delete_bucket", bucket = bucket);

        Box::pin(
            async move {
                info!("called");
                self.delete_bucket()
                    .bucket(bucket)
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "delete_bucket", bucket))?;

                Ok(())
            }
            .instrument(span),
        )
    }

    fn bucket_exists<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, Result<bool>> {
        let span = span!(Level::INFO, "head_bucket", context = "head_bucket", bucket = bucket);

        Box::pin(
            async move {
                info!("called");
                match self.head_bucket().bucket(bucket).send().await {
                    Ok(_) => Ok(true),
                    Err(err) => match StoreError::from_sdk(err, bucket) {
                        StoreError::NotFound(_) => Ok(false),
                        err => {
                            error!(error_message=%err, error_group="head_bucket");
                            Err(err)
                        }
                    },
                }
            }
            .instrument(span),
        )
    }

    fn list_buckets<'a>(&'a self) -> BoxFuture<'a, Result<Vec<String>>> {
        let span = span!(Level::INFO, "list_buckets", context = "list_buckets");

        Box::pin(
            async move {
                info!("called");
                let out = self
                    .list_buckets()
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "list_buckets", "*"))?;

                Ok(out
                    .buckets()
                    .iter()
                    .filter_map(|b| b.name().map(|name| name.to_string()))
                    .collect())
            }
            .instrument(span),
        )
    }

    fn put_object_from_path<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: &'a Path,
        content_type: Option<&'a str>,
    ) -> BoxFuture<'a, Result<()>> {
        let span = span!(Level::INFO, "put_object", context = "put_object", bucket = bucket, key = key);

        Box::pin(
            async move {
                let source_str = source.display().to_string();
                info!(source_path = %source_str, content_type = content_type, "called");

                // from_path hides the io::ErrorKind, so check existence up front
                tokio::fs::metadata(source)
                    .await
                    .map_err(|err| StoreError::from_io(err, &source_str))?;

                let body = ByteStream::from_path(source).await.map_err(|err| {
                    let err = StoreError::Io {
                        message: format!("failed to open upload source: {}", source_str),
                        source: io::Error::other(err),
                    };
                    error!(error_message=%err, error_group="open_source");
                    err
                })?;

                self.put_object()
                    .bucket(bucket)
                    .key(key)
                    .set_content_type(content_type.map(|ct| ct.to_string()))
                    .body(body)
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "put_object", key))?;

                Ok(())
            }
            .instrument(span),
        )
    }

    fn get_object_to_path<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<u64>> {
        let span = span!(Level::INFO, "get_object", context = "get_object", bucket = bucket, key = key);

        Box::pin(
            async move {
                let dest_str = dest.display().to_string();
                info!(dest = %dest_str, "called");

                // request first so a missing object never truncates the destination
                let out = self
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "get_object", key))?;

                let mut file = tokio::fs::File::create(dest)
                    .await
                    .map_err(|err| StoreError::from_io(err, &dest_str))?;

                let mut body = out.body.into_async_read();
                let written = tokio::io::copy(&mut body, &mut file).await.map_err(|err| {
                    let err = StoreError::from_io(err, &dest_str);
                    error!(error_message=%err, error_group="write_dest");
                    err
                })?;

                file.flush()
                    .await
                    .map_err(|err| StoreError::from_io(err, &dest_str))?;

                Ok(written)
            }
            .instrument(span),
        )
    }

    fn list_objects_page<'a>(
        &'a self,
        bucket: &'a str,
        req: ListRequest,
    ) -> BoxFuture<'a, Result<ListPage>> {
        let span = span!(Level::INFO, "list_objects", context = "list_objects", bucket = bucket);

        Box::pin(
            async move {
                info!(prefix = ?req.prefix, delimiter = ?req.delimiter, "called");
                let out = self
                    .list_objects_v2()
                    .bucket(bucket)
                    .set_prefix(req.prefix)
                    .set_delimiter(req.delimiter)
                    .set_continuation_token(req.continuation_token)
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "list_objects", bucket))?;

                let mut entries = Vec::new();
                for o in out.contents() {
                    entries.push(ObjectEntry {
                        key: o.key().unwrap_or("").to_string(),
                        size: o.size().unwrap_or(0),
                        last_modified: o.last_modified().and_then(to_offset_date_time),
                        etag: o.e_tag().map(|tag| tag.trim_matches('"').to_string()),
                        is_prefix: false,
                    });
                }

                for p in out.common_prefixes() {
                    if let Some(prefix) = p.prefix() {
                        entries.push(ObjectEntry::prefix(prefix));
                    }
                }

                entries.sort_by(|a, b| a.key.cmp(&b.key));

                let next_continuation_token = if out.is_truncated().unwrap_or(false) {
                    out.next_continuation_token().map(|tok| tok.to_string())
                } else {
                    None
                };

                Ok(ListPage {
                    entries,
                    next_continuation_token,
                })
            }
            .instrument(span),
        )
    }

    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, Result<()>> {
        let span = span!(Level::INFO, "delete_object", context = "delete_object", bucket = bucket, key = key);

        Box::pin(
            async move {
                info!("called");
                self.delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "delete_object", key))?;

                Ok(())
            }
            .instrument(span),
        )
    }

    fn delete_objects<'a>(
        &'a self,
        bucket: &'a str,
        keys: &'a [String],
    ) -> BoxFuture<'a, Result<()>> {
        let span = span!(Level::INFO, "delete_objects", context = "delete_objects", bucket = bucket);

        Box::pin(
            async move {
                info!(count = keys.len(), "called");
                if keys.is_empty() {
                    return Ok(());
                }

                let mut objects = Vec::with_capacity(keys.len());
                for key in keys {
                    let id = ObjectIdentifier::builder().key(key).build().map_err(|err| {
                        StoreError::InvalidArgument(format!("bad object key: {}, {}", key, err))
                    })?;
                    objects.push(id);
                }

                let delete = Delete::builder()
                    .set_objects(Some(objects))
                    .quiet(true)
                    .build()
                    .map_err(|err| StoreError::InvalidArgument(err.to_string()))?;

                let out = self
                    .delete_objects()
                    .bucket(bucket)
                    .delete(delete)
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "delete_objects", bucket))?;

                if let Some(first) = out.errors().first() {
                    let message = format!(
                        "failed to delete_objects at: {}, {}",
                        first.key().unwrap_or(""),
                        first.message().unwrap_or("")
                    );
                    let err = classify(first.code(), 0, message);
                    error!(error_message=%err, error_group="delete_objects", failed = out.errors().len());
                    return Err(err);
                }

                Ok(())
            }
            .instrument(span),
        )
    }

    fn copy_object<'a>(
        &'a self,
        bucket: &'a str,
        source_key: &'a str,
        dest_key: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let span = span!(Level::INFO, "copy_object", context = "copy_object", bucket = bucket, key = source_key);

        Box::pin(
            async move {
                info!(dest_key = dest_key, "called");
                self.copy_object()
                    .bucket(bucket)
                    .copy_source(encode_copy_source(bucket, source_key))
                    .key(dest_key)
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "copy_object", source_key))?;

                Ok(())
            }
            .instrument(span),
        )
    }

    fn presign_get_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        expires_in: Duration,
    ) -> BoxFuture<'a, Result<String>> {
        let span = span!(Level::INFO, "presign_get_object", context = "presign_get_object", bucket = bucket, key = key);

        Box::pin(
            async move {
                info!(expires_in_secs = expires_in.as_secs(), "called");
                let presigning = PresigningConfig::expires_in(expires_in).map_err(|err| {
                    StoreError::InvalidArgument(format!("bad presign expiry: {}", err))
                })?;

                let req = self
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .presigned(presigning)
                    .await
                    .map_err(|err| sdk_failure(err, "presign_get_object", key))?;

                Ok(req.uri().to_string())
            }
            .instrument(span),
        )
    }

    fn create_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        content_type: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        let span = span!(Level::INFO, "create_multipart_upload", context = "create_multipart_upload", bucket = bucket, key = key);

        Box::pin(
            async move {
                info!("called");
                let out = self
                    .create_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .set_content_type(content_type.map(|ct| ct.to_string()))
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "create_multipart_upload", key))?;

                out.upload_id().map(|id| id.to_string()).ok_or_else(|| {
                    StoreError::Storage(format!("no upload id returned for: {}", key))
                })
            }
            .instrument(span),
        )
    }

    fn upload_part<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        part_number: i32,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<UploadedPart>> {
        let span = span!(Level::INFO, "upload_part", context = "upload_part", bucket = bucket, key = key);

        Box::pin(
            async move {
                info!(part_number = part_number, size = body.len(), "called");
                let out = self
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(body))
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "upload_part", key))?;

                Ok(UploadedPart {
                    part_number,
                    etag: out.e_tag().map(|tag| tag.to_string()),
                })
            }
            .instrument(span),
        )
    }

    fn complete_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        parts: &'a [UploadedPart],
    ) -> BoxFuture<'a, Result<()>> {
        let span = span!(Level::INFO, "complete_multipart_upload", context = "complete_multipart_upload", bucket = bucket, key = key);

        Box::pin(
            async move {
                info!(parts = parts.len(), "called");
                let completed = parts
                    .iter()
                    .map(|part| {
                        CompletedPart::builder()
                            .part_number(part.part_number)
                            .set_e_tag(part.etag.clone())
                            .build()
                    })
                    .collect::<Vec<_>>();

                self.complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(completed))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "complete_multipart_upload", key))?;

                Ok(())
            }
            .instrument(span),
        )
    }

    fn abort_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let span = span!(Level::INFO, "abort_multipart_upload", context = "abort_multipart_upload", bucket = bucket, key = key);

        Box::pin(
            async move {
                info!("called");
                self.abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, "abort_multipart_upload", key))?;

                Ok(())
            }
            .instrument(span),
        )
    }
}
