use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use objstore::{
    adapters::mock::MockClient, ConnectionConfig, ObjectStoreClient, StoreError,
};

const CONTENT: &str = "hi";

async fn run_scenario(client: &ObjectStoreClient, bucket: &str) {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("hello.txt");
    std::fs::write(&source, CONTENT).unwrap();

    client.create_bucket(bucket).await.unwrap();
    client.create_bucket(bucket).await.unwrap();

    client.upload_file(bucket, "hello.txt", &source).await.unwrap();

    let keys: Vec<String> = client
        .list_objects(bucket, false)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.key)
        .collect();
    assert_eq!(keys, vec!["hello.txt".to_string()]);

    let dest = dir.path().join("downloaded.txt");
    client.download_file(bucket, "hello.txt", &dest).await.unwrap();
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), CONTENT);

    let url = client
        .generate_presigned_url(bucket, "hello.txt", 3600)
        .await
        .unwrap();
    assert!(url.starts_with("http"));
    assert!(url.contains(bucket) && url.contains("hello.txt"));
    assert!(url.contains("X-Amz-Expires=3600"));

    let rejected = client.generate_presigned_url(bucket, "hello.txt", -1).await;
    assert!(matches!(rejected, Err(StoreError::InvalidArgument(_))));

    client.delete_object(bucket, "hello.txt").await.unwrap();
    assert!(client.list_objects(bucket, false).await.unwrap().is_empty());

    client.delete_bucket(bucket).await.unwrap();
    assert!(!client.bucket_exists(bucket).await.unwrap());
}

#[tokio::test]
async fn test_scenario_in_memory() {
    let client = ObjectStoreClient::with_adapter(Arc::new(MockClient::new()));

    run_scenario(&client, "t1").await;
}

#[tokio::test]
async fn test_delete_bucket_with_nested_objects_in_memory() {
    let mock = Arc::new(MockClient::new().with_page_size(2));
    let client = ObjectStoreClient::with_adapter(mock.clone());
    client.create_bucket("t2").await.unwrap();
    for key in ["a", "x/b", "x/y/c", "z/d"] {
        mock.insert("t2", key, b"x").unwrap();
    }

    client.delete_bucket("t2").await.unwrap();

    assert_eq!(mock.object_count("t2").unwrap(), 0);
    assert!(client.list_buckets().await.unwrap().is_empty());
}

/// Needs a MinIO server, e.g. `docker run -p 9000:9000 minio/minio server /data`.
#[tokio::test]
#[ignore]
async fn test_scenario_live() {
    let endpoint = std::env::var("MINIO_ENDPOINT").unwrap_or_else(|_| "localhost:9000".to_string());
    let access_key = std::env::var("MINIO_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string());
    let secret_key = std::env::var("MINIO_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_string());

    let client =
        ObjectStoreClient::new(&ConnectionConfig::new(&endpoint, &access_key, &secret_key)).unwrap();

    let uid = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    run_scenario(&client, &format!("test-bucket-{}", uid)).await;
}
