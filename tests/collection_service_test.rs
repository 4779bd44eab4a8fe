// Collection run tests: fetch offices, parse, merge, persist

mod common;

use mockito::{Matcher, Server};
use snow_report_service::fetcher::BulletinFetcher;
use snow_report_service::services::CollectionService;
use snow_report_service::store::{ObservationStore, TsvRepository};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn mock_office(server: &mut Server, office: &str, status: usize, body: &str) -> mockito::Mock {
    server
        .mock("GET", "/product.php")
        .match_query(Matcher::UrlEncoded("issuedby".into(), office.into()))
        .with_status(status)
        .with_body(body)
        .create_async()
        .await
}

fn create_service(server: &Server, store: ObservationStore, offices: &[&str]) -> CollectionService {
    let fetcher = BulletinFetcher::with_base_url(format!("{}/product.php", server.url()))
        .with_retry(1, Duration::from_millis(1));
    CollectionService::new(
        fetcher,
        Arc::new(common::parser()),
        store,
        offices.iter().map(|o| o.to_string()).collect(),
        1,
        2,
    )
}

#[tokio::test]
async fn test_run_collection_merges_and_persists() {
    let mut server = Server::new_async().await;
    let aly = mock_office(&mut server, "ALY", 200, common::ALY_BULLETIN).await;
    let boxm = mock_office(&mut server, "BOX", 200, common::BOX_BULLETIN).await;
    let okx = mock_office(&mut server, "OKX", 404, "").await;

    let dir = TempDir::new().unwrap();
    let repo = TsvRepository::new(dir.path().join("observations.tsv"));
    let store = ObservationStore::open(repo.clone()).unwrap();
    let service = create_service(&server, store.clone(), &["ALY", "BOX", "OKX"]);

    let report = service.run_collection().await.unwrap();

    assert_eq!(report.offices_attempted, 3);
    assert_eq!(report.offices_failed, 1);
    assert_eq!(report.bulletins, 2);
    assert_eq!(report.valid_records, 10);
    assert_eq!(report.invalid_records, 2);
    assert_eq!(report.merge.inserted, 10);
    assert_eq!(report.stored_rows, 10);

    // Invalid records are kept for diagnostics only
    assert_eq!(store.diagnostics().unwrap().len(), 2);

    let (on_disk, _) = repo.load().unwrap();
    assert_eq!(on_disk.len(), 10);

    aly.assert_async().await;
    boxm.assert_async().await;
    okx.assert_async().await;
}

#[tokio::test]
async fn test_repeated_runs_do_not_change_the_table() {
    let mut server = Server::new_async().await;
    let _aly = mock_office(&mut server, "ALY", 200, common::ALY_BULLETIN).await;

    let store = ObservationStore::in_memory();
    let service = create_service(&server, store.clone(), &["ALY"]);

    service.run_collection().await.unwrap();
    let after_first = store.snapshot().unwrap();

    let report = service.run_collection().await.unwrap();
    assert_eq!(report.merge.inserted, 0);
    assert_eq!(report.merge.unchanged, 6);
    assert_eq!(store.snapshot().unwrap(), after_first);
}

#[tokio::test]
async fn test_empty_bulletin_is_counted_as_gap() {
    let mut server = Server::new_async().await;
    let _okx = mock_office(&mut server, "OKX", 200, "").await;

    let store = ObservationStore::in_memory();
    let service = create_service(&server, store.clone(), &["OKX"]);

    let report = service.run_collection().await.unwrap();
    assert_eq!(report.bulletins, 1);
    assert_eq!(report.blocks, 0);
    assert_eq!(report.structural_gaps, 1);
    assert_eq!(report.offices_failed, 0);
    assert_eq!(store.len().unwrap(), 0);
}
