use std::{path::Path, time::Duration};

use futures::future::BoxFuture;

use crate::model::{
    error::Result,
    object::{ListPage, ListRequest, UploadedPart},
};

/// Raw, one-request-per-call operations against an object store. Policy
/// (idempotency, recursive deletes, argument checks) lives in
/// `ObjectStoreClient`, not here.
pub trait ObjectAdapter: Send + Sync {
    fn create_bucket<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, Result<()>>;

    fn delete_bucket<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, Result<()>>;

    fn bucket_exists<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, Result<bool>>;

    fn list_buckets<'a>(&'a self) -> BoxFuture<'a, Result<Vec<String>>>;

    fn put_object_from_path<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: &'a Path,
        content_type: Option<&'a str>,
    ) -> BoxFuture<'a, Result<()>>;

    fn get_object_to_path<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<u64>>;

    fn list_objects_page<'a>(
        &'a self,
        bucket: &'a str,
        req: ListRequest,
    ) -> BoxFuture<'a, Result<ListPage>>;

    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Removes up to 1000 keys, failing with the first per-key error reported.
    fn delete_objects<'a>(
        &'a self,
        bucket: &'a str,
        keys: &'a [String],
    ) -> BoxFuture<'a, Result<()>>;

    fn copy_object<'a>(
        &'a self,
        bucket: &'a str,
        source_key: &'a str,
        dest_key: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    fn presign_get_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        expires_in: Duration,
    ) -> BoxFuture<'a, Result<String>>;

    /// Starts a multipart upload and returns its upload id.
    fn create_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        content_type: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>>;

    fn upload_part<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        part_number: i32,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<UploadedPart>>;

    fn complete_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        parts: &'a [UploadedPart],
    ) -> BoxFuture<'a, Result<()>>;

    fn abort_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}
