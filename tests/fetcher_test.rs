// Tests for BulletinFetcher
// Uses mockito for HTTP mocking

mod common;

use mockito::{Matcher, Server};
use snow_report_service::fetch_error::FetchError;
use snow_report_service::fetcher::BulletinFetcher;
use std::time::Duration;

// Helper to create a fetcher against the mock server with fast retries
fn create_test_fetcher(server: &Server) -> BulletinFetcher {
    BulletinFetcher::with_base_url(format!("{}/product.php", server.url()))
        .with_retry(2, Duration::from_millis(1))
}

fn version_query(office: &str, version: u32) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("site".into(), "NWS".into()),
        Matcher::UrlEncoded("issuedby".into(), office.into()),
        Matcher::UrlEncoded("product".into(), "PNS".into()),
        Matcher::UrlEncoded("version".into(), version.to_string()),
    ])
}

#[tokio::test]
async fn test_fetch_bulletin_success() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/product.php")
        .match_query(version_query("ALY", 1))
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(common::ALY_BULLETIN)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(&server);
    let bulletin = fetcher.fetch_bulletin("ALY", 1).await.unwrap();

    assert_eq!(bulletin.office_code, "ALY");
    assert!(bulletin.raw_text.contains("glossaryProduct"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_bulletin_empty_body_is_not_an_error() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/product.php")
        .match_query(version_query("OKX", 1))
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let fetcher = create_test_fetcher(&server);
    let bulletin = fetcher.fetch_bulletin("OKX", 1).await.unwrap();
    assert!(bulletin.raw_text.is_empty());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_bulletin_404_is_not_retried() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/product.php")
        .match_query(Matcher::Any)
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(&server);
    let result = fetcher.fetch_bulletin("ZZZ", 1).await;

    match result.unwrap_err() {
        FetchError::NotFound(url) => assert!(url.contains("issuedby=ZZZ")),
        other => panic!("Expected NotFound error, got {other:?}"),
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_bulletin_server_error_is_retried() {
    let mut server = Server::new_async().await;

    // One initial attempt plus two retries
    let mock = server
        .mock("GET", "/product.php")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(&server);
    let result = fetcher.fetch_bulletin("BOX", 1).await;

    assert!(matches!(result, Err(FetchError::ServerError(_))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_office_stops_at_missing_version() {
    let mut server = Server::new_async().await;

    let latest = server
        .mock("GET", "/product.php")
        .match_query(version_query("BOX", 1))
        .with_status(200)
        .with_body(common::BOX_BULLETIN)
        .create_async()
        .await;
    let missing = server
        .mock("GET", "/product.php")
        .match_query(version_query("BOX", 2))
        .with_status(404)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(&server);
    let bulletins = fetcher.fetch_office("BOX", 3).await.unwrap();

    assert_eq!(bulletins.len(), 1);
    latest.assert_async().await;
    missing.assert_async().await;
}
