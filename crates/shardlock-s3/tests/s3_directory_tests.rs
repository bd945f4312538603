use std::sync::Arc;

use aws_config::Region;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials};
use shardlock_core::{
    DirectoryError, DirectoryLockManager, LockDescriptor, LockError, LockManager,
    RemoteDirectory,
};
use shardlock_s3::S3Directory;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUCKET: &str = "locks-bucket";
const KEY_PREFIX: &str = "locks/";

fn client_for(uri: &str) -> aws_sdk_s3::Client {
    let credentials = Credentials::new("test-access-key", "test-secret-key", None, None, "test");
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .credentials_provider(credentials)
        .region(Region::new("us-east-1"))
        .endpoint_url(uri)
        .force_path_style(true)
        // Retries under test are the directory's own backoff loop.
        .retry_config(RetryConfig::disabled())
        .build();
    aws_sdk_s3::Client::from_conf(config)
}

async fn setup() -> (MockServer, S3Directory) {
    let server = MockServer::start().await;
    let directory = S3Directory::new(
        client_for(&server.uri()),
        BUCKET.to_string(),
        KEY_PREFIX.to_string(),
    );
    (server, directory)
}

fn error_xml(code: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Error><Code>{}</Code><Message>{}</Message></Error>",
        code, code
    )
}

#[tokio::test]
async fn test_create_sends_conditional_put() {
    let (server, directory) = setup().await;
    Mock::given(method("PUT"))
        .and(path("/locks-bucket/locks/segment-5.snap-1.never.lock"))
        .and(header("if-none-match", "*"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag-1\""))
        .expect(1)
        .mount(&server)
        .await;

    directory
        .create("segment-5.snap-1.never.lock", b"{\"version\":1}")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, b"{\"version\":1}");
}

#[tokio::test]
async fn test_create_existing_is_conflict() {
    let (server, directory) = setup().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(412)
                .set_body_raw(error_xml("PreconditionFailed"), "application/xml"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = directory
        .create("segment-5.snap-1.never.lock", b"{}")
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_read_returns_body() {
    let (server, directory) = setup().await;
    Mock::given(method("GET"))
        .and(path("/locks-bucket/locks/segment-5.snap-1.never.lock"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"record-body".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let bytes = directory
        .read("segment-5.snap-1.never.lock")
        .await
        .unwrap();
    assert_eq!(bytes, b"record-body");
}

#[tokio::test]
async fn test_read_missing_is_not_found() {
    let (server, directory) = setup().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(404).set_body_raw(error_xml("NoSuchKey"), "application/xml"),
        )
        .mount(&server)
        .await;

    let err = directory.read("missing.lock").await.unwrap_err();
    match err {
        DirectoryError::NotFound(name) => assert_eq!(name, "missing.lock"),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_delete_reports_success() {
    let (server, directory) = setup().await;
    Mock::given(method("DELETE"))
        .and(path("/locks-bucket/locks/segment-5.snap-1.never.lock"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    directory
        .delete("segment-5.snap-1.never.lock")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_list_strips_key_prefix() {
    let (server, directory) = setup().await;
    let body = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
        <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
        <Name>locks-bucket</Name><Prefix>locks/</Prefix>\
        <KeyCount>2</KeyCount><MaxKeys>1000</MaxKeys>\
        <IsTruncated>false</IsTruncated>\
        <Contents><Key>locks/a.o.never.lock</Key></Contents>\
        <Contents><Key>locks/b.o.never.lock</Key></Contents>\
        </ListBucketResult>";
    Mock::given(method("GET"))
        .and(path("/locks-bucket/"))
        .and(query_param("list-type", "2"))
        .and(query_param("prefix", "locks/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;

    let names = directory.list_all().await.unwrap();
    assert_eq!(names, ["a.o.never.lock", "b.o.never.lock"]);
}

#[tokio::test]
async fn test_list_by_prefix_scopes_query() {
    let (server, directory) = setup().await;
    let body = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
        <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
        <Name>locks-bucket</Name><Prefix>locks/file1.</Prefix>\
        <KeyCount>1</KeyCount><MaxKeys>1000</MaxKeys>\
        <IsTruncated>false</IsTruncated>\
        <Contents><Key>locks/file1.o.never.lock</Key></Contents>\
        </ListBucketResult>";
    Mock::given(method("GET"))
        .and(path("/locks-bucket/"))
        .and(query_param("list-type", "2"))
        .and(query_param("prefix", "locks/file1."))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;

    let names = directory.list_by_prefix("file1.").await.unwrap();
    assert_eq!(names, ["file1.o.never.lock"]);
}

#[tokio::test]
async fn test_list_follows_continuation_tokens() {
    let (server, directory) = setup().await;
    let first_page = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
        <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
        <Name>locks-bucket</Name><Prefix>locks/</Prefix>\
        <KeyCount>1</KeyCount><MaxKeys>1</MaxKeys>\
        <IsTruncated>true</IsTruncated>\
        <NextContinuationToken>token-1</NextContinuationToken>\
        <Contents><Key>locks/a.o.never.lock</Key></Contents>\
        </ListBucketResult>";
    let second_page = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
        <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
        <Name>locks-bucket</Name><Prefix>locks/</Prefix>\
        <KeyCount>1</KeyCount><MaxKeys>1</MaxKeys>\
        <IsTruncated>false</IsTruncated>\
        <Contents><Key>locks/b.o.never.lock</Key></Contents>\
        </ListBucketResult>";
    Mock::given(method("GET"))
        .and(query_param("list-type", "2"))
        .and(query_param_is_missing("continuation-token"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(first_page, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("continuation-token", "token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(second_page, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;

    let names = directory.list_all().await.unwrap();
    assert_eq!(names, ["a.o.never.lock", "b.o.never.lock"]);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let (server, directory) = setup().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(500).set_body_raw(error_xml("InternalError"), "application/xml"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"record-body".to_vec()))
        .mount(&server)
        .await;

    let bytes = directory
        .read("segment-5.snap-1.never.lock")
        .await
        .unwrap();
    assert_eq!(bytes, b"record-body");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_names_never_reach_the_store() {
    let (server, directory) = setup().await;

    for name in ["", "a/b"] {
        let err = directory.create(name, b"{}").await.unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidName(_)));
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_manager_surfaces_conflict_from_s3() {
    let (server, directory) = setup().await;
    Mock::given(method("PUT"))
        .and(header("if-none-match", "*"))
        .respond_with(
            ResponseTemplate::new(412)
                .set_body_raw(error_xml("PreconditionFailed"), "application/xml"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = DirectoryLockManager::new(Arc::new(directory));
    let lock = LockDescriptor::new("segment-5", "snap-1", None).unwrap();
    let err = manager.acquire(&lock).await.unwrap_err();
    assert!(matches!(err, LockError::Conflict(_)));
}
