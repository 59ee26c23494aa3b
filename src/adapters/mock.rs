use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use futures::future::{self, BoxFuture};

use crate::{
    adapters::adapter::ObjectAdapter,
    model::{
        error::{Result, StoreError},
        object::{ListPage, ListRequest, ObjectEntry, UploadedPart},
    },
};

const MAX_PRESIGN: Duration = Duration::from_secs(7 * 24 * 3600);

type Buckets = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, Vec<u8>>,
}

#[derive(Default)]
struct Uploads {
    next_id: u64,
    pending: BTreeMap<String, PendingUpload>,
    completed: Vec<usize>,
    aborted: usize,
}

/// In-memory store with S3-like semantics, for exercising
/// `ObjectStoreClient` without a server.
pub struct MockClient {
    buckets: Mutex<Buckets>,
    page_size: usize,
    fail_delete_key: Option<String>,
    fail_list: bool,
    fail_part: Option<i32>,
    delete_batches: Mutex<Vec<usize>>,
    uploads: Mutex<Uploads>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            page_size: 1000,
            fail_delete_key: None,
            fail_list: false,
            fail_part: None,
            delete_batches: Mutex::new(Vec::new()),
            uploads: Mutex::new(Uploads::default()),
        }
    }

    /// Caps every listing page, to force pagination.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes batch deletion report an access error for `key`.
    pub fn with_failing_delete(mut self, key: &str) -> Self {
        self.fail_delete_key = Some(key.to_string());
        self
    }

    /// Makes every listing request fail as if the connection dropped.
    pub fn with_failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Makes `upload_part` reject the part numbered `part_number`.
    pub fn with_failing_part(mut self, part_number: i32) -> Self {
        self.fail_part = Some(part_number);
        self
    }

    pub fn insert(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()> {
        let mut buckets = self.state()?;
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.to_vec());
        Ok(())
    }

    pub fn object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let buckets = self.state()?;
        Ok(buckets.get(bucket).and_then(|objects| objects.get(key).cloned()))
    }

    pub fn object_count(&self, bucket: &str) -> Result<usize> {
        let buckets = self.state()?;
        Ok(buckets.get(bucket).map_or(0, |objects| objects.len()))
    }

    /// Sizes of the batches passed to `delete_objects`, in call order.
    pub fn delete_batches(&self) -> Result<Vec<usize>> {
        self.delete_batches
            .lock()
            .map(|batches| batches.clone())
            .map_err(|err| StoreError::Storage(format!("failed to acquire guard: {}", err)))
    }

    /// Part counts of completed multipart uploads, in completion order.
    pub fn completed_uploads(&self) -> Result<Vec<usize>> {
        self.multipart().map(|uploads| uploads.completed.clone())
    }

    pub fn aborted_uploads(&self) -> Result<usize> {
        self.multipart().map(|uploads| uploads.aborted)
    }

    /// Multipart uploads neither completed nor aborted.
    pub fn pending_uploads(&self) -> Result<usize> {
        self.multipart().map(|uploads| uploads.pending.len())
    }

    fn multipart(&self) -> Result<MutexGuard<'_, Uploads>> {
        self.uploads
            .lock()
            .map_err(|err| StoreError::Storage(format!("failed to acquire guard: {}", err)))
    }

    fn no_such_upload(upload_id: &str) -> StoreError {
        StoreError::NotFound(format!("NoSuchUpload: {}", upload_id))
    }

    fn state(&self) -> Result<MutexGuard<'_, Buckets>> {
        self.buckets
            .lock()
            .map_err(|err| StoreError::Storage(format!("failed to acquire guard: {}", err)))
    }

    fn no_such_bucket(bucket: &str) -> StoreError {
        StoreError::NotFound(format!("NoSuchBucket: {}", bucket))
    }

    fn list_sync(&self, bucket: &str, req: &ListRequest) -> Result<ListPage> {
        if self.fail_list {
            return Err(StoreError::Transport(format!(
                "dispatch failure: connection reset listing {}",
                bucket
            )));
        }

        let buckets = self.state()?;
        let objects = buckets.get(bucket).ok_or_else(|| Self::no_such_bucket(bucket))?;
        let prefix = req.prefix.as_deref().unwrap_or("");

        let mut entries = Vec::new();
        let mut prefixes = BTreeSet::new();
        for (key, body) in objects.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }

            let rest = &key[prefix.len()..];
            match req.delimiter.as_deref().and_then(|d| rest.find(d).map(|pos| pos + d.len())) {
                Some(end) => {
                    prefixes.insert(format!("{}{}", prefix, &rest[..end]));
                }
                None => entries.push(ObjectEntry::object(key, body.len() as i64)),
            }
        }

        entries.extend(prefixes.iter().map(|p| ObjectEntry::prefix(p)));
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        if let Some(token) = req.continuation_token.as_deref() {
            entries.retain(|e| e.key.as_str() > token);
        }

        let next_continuation_token = if entries.len() > self.page_size {
            entries.truncate(self.page_size);
            entries.last().map(|e| e.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_continuation_token,
        })
    }

    fn create_upload_sync(&self, bucket: &str, key: &str) -> Result<String> {
        if !self.state()?.contains_key(bucket) {
            return Err(Self::no_such_bucket(bucket));
        }

        let mut uploads = self.multipart()?;
        uploads.next_id += 1;
        let upload_id = format!("upload-{}", uploads.next_id);
        uploads.pending.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );

        Ok(upload_id)
    }

    fn upload_part_sync(
        &self,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<UploadedPart> {
        if self.fail_part == Some(part_number) {
            return Err(StoreError::Transport(format!(
                "dispatch failure: connection reset on part {}",
                part_number
            )));
        }

        let mut uploads = self.multipart()?;
        let upload = uploads
            .pending
            .get_mut(upload_id)
            .ok_or_else(|| Self::no_such_upload(upload_id))?;
        upload.parts.insert(part_number, body);

        Ok(UploadedPart {
            part_number,
            etag: Some(format!("\"{}-{}\"", upload_id, part_number)),
        })
    }

    fn complete_upload_sync(&self, upload_id: &str, parts: &[UploadedPart]) -> Result<()> {
        let mut uploads = self.multipart()?;
        let upload = uploads
            .pending
            .remove(upload_id)
            .ok_or_else(|| Self::no_such_upload(upload_id))?;

        let mut body = Vec::new();
        for part in parts {
            let chunk = upload.parts.get(&part.part_number).ok_or_else(|| {
                StoreError::InvalidArgument(format!("InvalidPart: {}", part.part_number))
            })?;
            body.extend_from_slice(chunk);
        }
        uploads.completed.push(parts.len());
        drop(uploads);

        let mut buckets = self.state()?;
        let objects = buckets
            .get_mut(&upload.bucket)
            .ok_or_else(|| Self::no_such_bucket(&upload.bucket))?;
        objects.insert(upload.key, body);

        Ok(())
    }

    fn abort_upload_sync(&self, upload_id: &str) -> Result<()> {
        let mut uploads = self.multipart()?;
        uploads
            .pending
            .remove(upload_id)
            .ok_or_else(|| Self::no_such_upload(upload_id))?;
        uploads.aborted += 1;

        Ok(())
    }

    fn delete_objects_sync(&self, bucket: &str, keys: &[String]) -> Result<()> {
        let mut batches = self
            .delete_batches
            .lock()
            .map_err(|err| StoreError::Storage(format!("failed to acquire guard: {}", err)))?;
        batches.push(keys.len());

        let mut buckets = self.state()?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?;

        let mut first_err = None;
        for key in keys {
            if self.fail_delete_key.as_deref() == Some(key.as_str()) {
                first_err.get_or_insert_with(|| {
                    StoreError::Permission(format!("AccessDenied: {}", key))
                });
                continue;
            }
            objects.remove(key);
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ObjectAdapter for MockClient {
    fn create_bucket<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, Result<()>> {
        let res = self.state().and_then(|mut buckets| {
            if buckets.contains_key(bucket) {
                return Err(StoreError::AlreadyExists(format!(
                    "BucketAlreadyOwnedByYou: {}",
                    bucket
                )));
            }
            buckets.insert(bucket.to_string(), BTreeMap::new());
            Ok(())
        });

        Box::pin(future::ready(res))
    }

    fn delete_bucket<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, Result<()>> {
        let res = self.state().and_then(|mut buckets| {
            match buckets.get(bucket) {
                None => return Err(Self::no_such_bucket(bucket)),
                Some(objects) if !objects.is_empty() => {
                    return Err(StoreError::Storage(format!("BucketNotEmpty: {}", bucket)))
                }
                Some(_) => {}
            }
            buckets.remove(bucket);
            Ok(())
        });

        Box::pin(future::ready(res))
    }

    fn bucket_exists<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, Result<bool>> {
        let res = self.state().map(|buckets| buckets.contains_key(bucket));

        Box::pin(future::ready(res))
    }

    fn list_buckets<'a>(&'a self) -> BoxFuture<'a, Result<Vec<String>>> {
        let res = self.state().map(|buckets| buckets.keys().cloned().collect());

        Box::pin(future::ready(res))
    }

    fn put_object_from_path<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: &'a Path,
        _content_type: Option<&'a str>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let body = tokio::fs::read(source)
                .await
                .map_err(|err| StoreError::from_io(err, &source.display().to_string()))?;

            let mut buckets = self.state()?;
            let objects = buckets
                .get_mut(bucket)
                .ok_or_else(|| Self::no_such_bucket(bucket))?;
            objects.insert(key.to_string(), body);

            Ok(())
        })
    }

    fn get_object_to_path<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let body = {
                let buckets = self.state()?;
                let objects = buckets.get(bucket).ok_or_else(|| Self::no_such_bucket(bucket))?;
                objects
                    .get(key)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("NoSuchKey: {}", key)))?
            };

            tokio::fs::write(dest, &body)
                .await
                .map_err(|err| StoreError::from_io(err, &dest.display().to_string()))?;

            Ok(body.len() as u64)
        })
    }

    fn list_objects_page<'a>(
        &'a self,
        bucket: &'a str,
        req: ListRequest,
    ) -> BoxFuture<'a, Result<ListPage>> {
        Box::pin(future::ready(self.list_sync(bucket, &req)))
    }

    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, Result<()>> {
        let res = self.state().and_then(|mut buckets| {
            let objects = buckets
                .get_mut(bucket)
                .ok_or_else(|| Self::no_such_bucket(bucket))?;
            objects.remove(key);
            Ok(())
        });

        Box::pin(future::ready(res))
    }

    fn delete_objects<'a>(
        &'a self,
        bucket: &'a str,
        keys: &'a [String],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(future::ready(self.delete_objects_sync(bucket, keys)))
    }

    fn copy_object<'a>(
        &'a self,
        bucket: &'a str,
        source_key: &'a str,
        dest_key: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let res = self.state().and_then(|mut buckets| {
            let objects = buckets
                .get_mut(bucket)
                .ok_or_else(|| Self::no_such_bucket(bucket))?;
            let body = objects
                .get(source_key)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("NoSuchKey: {}", source_key)))?;
            objects.insert(dest_key.to_string(), body);
            Ok(())
        });

        Box::pin(future::ready(res))
    }

    fn create_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        _content_type: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(future::ready(self.create_upload_sync(bucket, key)))
    }

    fn upload_part<'a>(
        &'a self,
        _bucket: &'a str,
        _key: &'a str,
        upload_id: &'a str,
        part_number: i32,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<UploadedPart>> {
        Box::pin(future::ready(self.upload_part_sync(upload_id, part_number, body)))
    }

    fn complete_multipart_upload<'a>(
        &'a self,
        _bucket: &'a str,
        _key: &'a str,
        upload_id: &'a str,
        parts: &'a [UploadedPart],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(future::ready(self.complete_upload_sync(upload_id, parts)))
    }

    fn abort_multipart_upload<'a>(
        &'a self,
        _bucket: &'a str,
        _key: &'a str,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(future::ready(self.abort_upload_sync(upload_id)))
    }

    fn presign_get_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        expires_in: Duration,
    ) -> BoxFuture<'a, Result<String>> {
        let res = if expires_in > MAX_PRESIGN {
            Err(StoreError::InvalidArgument(format!(
                "expiry longer than one week: {}s",
                expires_in.as_secs()
            )))
        } else {
            Ok(format!(
                "http://mock.local/{}/{}?X-Amz-Expires={}&X-Amz-Signature=mock",
                bucket,
                key,
                expires_in.as_secs()
            ))
        };

        Box::pin(future::ready(res))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MockClient {
        let client = MockClient::new();
        for key in ["a.txt", "dir/b.txt", "dir/sub/c.txt", "e.txt", "other/f.txt"] {
            client.insert("bucket", key, key.as_bytes()).unwrap();
        }
        client
    }

    #[test]
    fn test_list_sync() {
        let client = seeded();

        let cases = vec![
            (None, None, vec!["a.txt", "dir/b.txt", "dir/sub/c.txt", "e.txt", "other/f.txt"]),
            (None, Some("/"), vec!["a.txt", "dir/", "e.txt", "other/"]),
            (Some("dir/"), Some("/"), vec!["dir/b.txt", "dir/sub/"]),
            (Some("dir/"), None, vec!["dir/b.txt", "dir/sub/c.txt"]),
            (Some("missing/"), Some("/"), vec![]),
        ];

        for (prefix, delimiter, expected) in cases {
            let req = ListRequest {
                prefix: prefix.map(|p: &str| p.to_string()),
                delimiter: delimiter.map(|d: &str| d.to_string()),
                continuation_token: None,
            };
            let page = client.list_sync("bucket", &req).unwrap();
            let keys: Vec<&str> = page.entries.iter().map(|e| e.key.as_str()).collect();

            assert_eq!(keys, expected, "failed for case: {:?} {:?}", prefix, delimiter);
            assert!(page.next_continuation_token.is_none());
        }
    }

    #[test]
    fn test_list_sync_pages() {
        let client = seeded().with_page_size(2);

        let mut token = None;
        let mut pages = Vec::new();
        loop {
            let req = ListRequest {
                continuation_token: token.clone(),
                ..Default::default()
            };
            let page = client.list_sync("bucket", &req).unwrap();
            pages.push(page.entries.len());

            token = page.next_continuation_token;
            if token.is_none() {
                break;
            }
        }

        assert_eq!(pages, vec![2, 2, 1]);
    }

    #[test]
    fn test_delete_objects_sync_reports_failing_key() {
        let client = seeded().with_failing_delete("e.txt");
        let keys = vec!["a.txt".to_string(), "e.txt".to_string()];

        let result = client.delete_objects_sync("bucket", &keys);

        assert!(matches!(result, Err(StoreError::Permission(_))));
        assert_eq!(client.object("bucket", "a.txt").unwrap(), None);
        assert!(client.object("bucket", "e.txt").unwrap().is_some());
    }

    #[test]
    fn test_list_sync_failing() {
        let client = seeded().with_failing_list();

        let result = client.list_sync("bucket", &ListRequest::default());

        assert!(matches!(result, Err(StoreError::Transport(_))));
    }

    #[test]
    fn test_multipart_sync() {
        let client = seeded();
        let upload_id = client.create_upload_sync("bucket", "big.bin").unwrap();

        let second = client.upload_part_sync(&upload_id, 2, b"world".to_vec()).unwrap();
        let first = client.upload_part_sync(&upload_id, 1, b"hello ".to_vec()).unwrap();
        client.complete_upload_sync(&upload_id, &[first, second]).unwrap();

        assert_eq!(client.object("bucket", "big.bin").unwrap(), Some(b"hello world".to_vec()));
        assert_eq!(client.completed_uploads().unwrap(), vec![2]);
        assert_eq!(client.pending_uploads().unwrap(), 0);

        let missing = client.create_upload_sync("nope", "k");
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_abort_upload_sync() {
        let client = seeded().with_failing_part(2);
        let upload_id = client.create_upload_sync("bucket", "big.bin").unwrap();

        client.upload_part_sync(&upload_id, 1, b"x".to_vec()).unwrap();
        let failed = client.upload_part_sync(&upload_id, 2, b"y".to_vec());
        assert!(matches!(failed, Err(StoreError::Transport(_))));

        client.abort_upload_sync(&upload_id).unwrap();

        assert_eq!(client.aborted_uploads().unwrap(), 1);
        assert_eq!(client.pending_uploads().unwrap(), 0);
        assert_eq!(client.object("bucket", "big.bin").unwrap(), None);
        assert!(client.abort_upload_sync(&upload_id).unwrap_err().is_not_found());
    }
}
