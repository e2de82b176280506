//! Crawl engine scenarios against a mock API
//!
//! Each test mounts just the endpoints the scenario should touch; unexpected
//! requests fall through to wiremock's default 404.

use crate::common::{
    blob_entry, blob_json, engine, memory_store, mount_blob, mount_repo, mount_tree,
    number_of_requests, ok_json, test_config, DEMO_URL,
};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use trawl::crawler::{CrawlPass, PassSummary, RepoScanStatus};
use trawl::storage::{NewDiscoveredFile, NewRepoScan, ScanOutcome, Storage};
use trawl::url::RepoRef;
use trawl::{ApiError, TrawlError, Worker};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMPTY_BLOB_SHA: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";

fn demo() -> RepoRef {
    RepoRef::new("acme", "demo")
}

fn seed_file(repo_url: &str) -> NewDiscoveredFile {
    NewDiscoveredFile {
        content_hash: "h0".to_string(),
        commit_sha: "c0".to_string(),
        retrieved_at: Utc::now() - Duration::days(3),
        contents: "main = 0".to_string(),
        repo_url: repo_url.to_string(),
        file_path: "main.roc".to_string(),
    }
}

fn seed_scan(repo_url: &str, hours_ago: i64, commit: &str, outcome: ScanOutcome) -> NewRepoScan {
    NewRepoScan {
        repo_url: repo_url.to_string(),
        scanned_at: Utc::now() - Duration::hours(hours_ago),
        commit_sha: Some(commit.to_string()),
        outcome,
    }
}

#[tokio::test]
async fn test_new_repository_end_to_end() {
    let server = MockServer::start().await;
    let parser_source = format!("{}\n", "x".repeat(119));

    mount_repo(&server, "acme", "demo", "c1").await;
    mount_tree(
        &server,
        "acme",
        "demo",
        "c1",
        json!([
            blob_entry(&server, "acme", "demo", "empty.roc", EMPTY_BLOB_SHA, 0),
            { "path": "lib", "mode": "040000", "type": "tree", "sha": "t2" },
            blob_entry(&server, "acme", "demo", "lib/Parser.roc", "b2", 120),
            blob_entry(&server, "acme", "demo", "README.md", "b3", 40),
        ]),
        1,
    )
    .await;
    mount_blob(&server, "acme", "demo", blob_json("b2", parser_source.as_bytes()), 1).await;

    let config = test_config(&server);
    let store = memory_store();
    let engine = engine(&config, &store);

    let status = engine.scan_repository(&demo()).await.unwrap();
    assert_eq!(status, RepoScanStatus::Ingested(2));

    {
        let store = store.lock().unwrap();
        let files = store.files_for_repo(DEMO_URL).unwrap();
        assert_eq!(files.len(), 2);

        let empty = files.iter().find(|f| f.file_path == "empty.roc").unwrap();
        assert_eq!(empty.contents, "");
        assert_eq!(empty.commit_sha, "c1");

        let parser = files.iter().find(|f| f.file_path == "lib/Parser.roc").unwrap();
        assert_eq!(parser.contents, parser_source);
        assert_eq!(parser.content_hash.len(), 64);

        let scans = store.scans_for_repo(DEMO_URL).unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].commit_sha.as_deref(), Some("c1"));
        assert_eq!(scans[0].outcome, ScanOutcome::Matched(2));
    }

    // Not due again for a day: no requests, no rows
    let requests = number_of_requests(&server).await;
    let status = engine.scan_repository(&demo()).await.unwrap();

    assert_eq!(status, RepoScanStatus::NotDue);
    assert_eq!(number_of_requests(&server).await, requests);
    let store = store.lock().unwrap();
    assert_eq!(store.files_for_repo(DEMO_URL).unwrap().len(), 2);
    assert_eq!(store.scans_for_repo(DEMO_URL).unwrap().len(), 1);
}

#[tokio::test]
async fn test_unchanged_commit_skips_tree() {
    let server = MockServer::start().await;
    mount_repo(&server, "acme", "demo", "c1").await;
    mount_tree(&server, "acme", "demo", "c1", json!([]), 0).await;

    let config = test_config(&server);
    let store = memory_store();
    store
        .lock()
        .unwrap()
        .record_scan(&seed_scan(DEMO_URL, 25, "c1", ScanOutcome::Matched(2)))
        .unwrap();

    let status = engine(&config, &store).scan_repository(&demo()).await.unwrap();
    assert_eq!(status, RepoScanStatus::Unchanged);

    let store = store.lock().unwrap();
    assert!(store.files_for_repo(DEMO_URL).unwrap().is_empty());

    let scans = store.scans_for_repo(DEMO_URL).unwrap();
    assert_eq!(scans.len(), 2);
    let latest = store.latest_scan(DEMO_URL).unwrap().unwrap();
    assert_eq!(latest.commit_sha.as_deref(), Some("c1"));
    assert_eq!(latest.outcome, ScanOutcome::Matched(2));
    assert!(latest.scanned_at > scans[0].scanned_at);
}

#[tokio::test]
async fn test_integrity_mismatch_halts_repository() {
    let server = MockServer::start().await;
    mount_repo(&server, "acme", "demo", "c2").await;
    mount_tree(
        &server,
        "acme",
        "demo",
        "c2",
        json!([
            blob_entry(&server, "acme", "demo", "a.roc", "ba", 5),
            blob_entry(&server, "acme", "demo", "b.roc", "bb", 120),
            blob_entry(&server, "acme", "demo", "c.roc", "bc", 5),
        ]),
        1,
    )
    .await;
    mount_blob(&server, "acme", "demo", blob_json("ba", b"a = 1"), 1).await;
    // Listed at 120 bytes, served at 5
    mount_blob(&server, "acme", "demo", blob_json("bb", b"b = 2"), 1).await;
    mount_blob(&server, "acme", "demo", blob_json("bc", b"c = 3"), 0).await;

    let config = test_config(&server);
    let store = memory_store();

    let status = engine(&config, &store).scan_repository(&demo()).await.unwrap();
    assert_eq!(status, RepoScanStatus::IntegrityFailure);

    let store = store.lock().unwrap();
    let files = store.files_for_repo(DEMO_URL).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_path, "a.roc");
    assert!(store.scans_for_repo(DEMO_URL).unwrap().is_empty());
}

#[tokio::test]
async fn test_integrity_failure_is_not_rescanned_in_the_same_pass() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/code"))
        .respond_with(ok_json(json!({ "total_count": 0, "items": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/acme/repos"))
        .respond_with(ok_json(json!([{ "full_name": "acme/demo", "html_url": DEMO_URL }])))
        .expect(1)
        .mount(&server)
        .await;
    mount_repo(&server, "acme", "demo", "c2").await;
    mount_tree(
        &server,
        "acme",
        "demo",
        "c2",
        json!([
            blob_entry(&server, "acme", "demo", "a.roc", "ba", 5),
            blob_entry(&server, "acme", "demo", "b.roc", "bb", 120),
        ]),
        1,
    )
    .await;
    mount_blob(&server, "acme", "demo", blob_json("ba", b"a = 1"), 1).await;
    mount_blob(&server, "acme", "demo", blob_json("bb", b"b = 2"), 1).await;

    let config = test_config(&server);
    let store = memory_store();
    store.lock().unwrap().add_file(&seed_file(DEMO_URL)).unwrap();

    let summary = engine(&config, &store).run_pass().await.unwrap();

    assert_eq!(summary.integrity_failures, 1);
    assert_eq!(summary.repos_scanned, 0);

    let store = store.lock().unwrap();
    let files = store.files_for_repo(DEMO_URL).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files.iter().filter(|f| f.file_path == "a.roc").count(), 1);
    assert!(store.scans_for_repo(DEMO_URL).unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_blob_is_refetched_next_scan() {
    let server = MockServer::start().await;
    mount_repo(&server, "acme", "demo", "c3").await;
    mount_tree(
        &server,
        "acme",
        "demo",
        "c3",
        json!([blob_entry(&server, "acme", "demo", "a.roc", "ba", 5)]),
        1,
    )
    .await;
    // Truncated on the first read only
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo/git/blobs/ba"))
        .respond_with(ok_json(blob_json("ba", b"a = ")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_blob(&server, "acme", "demo", blob_json("ba", b"a = 1"), 1).await;

    let config = test_config(&server);
    let store = memory_store();
    let engine = engine(&config, &store);

    assert_eq!(
        engine.scan_repository(&demo()).await.unwrap(),
        RepoScanStatus::IntegrityFailure
    );
    assert_eq!(
        engine.scan_repository(&demo()).await.unwrap(),
        RepoScanStatus::Ingested(1)
    );

    let store = store.lock().unwrap();
    let files = store.files_for_repo(DEMO_URL).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].contents, "a = 1");
}

#[tokio::test]
async fn test_branch_name_is_percent_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo"))
        .respond_with(ok_json(json!({ "default_branch": "release#1", "html_url": DEMO_URL })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo/branches/release%231"))
        .respond_with(ok_json(json!({ "name": "release#1", "commit": { "sha": "c7" } })))
        .expect(1)
        .mount(&server)
        .await;
    mount_tree(&server, "acme", "demo", "c7", json!([]), 1).await;

    let config = test_config(&server);
    let store = memory_store();

    let status = engine(&config, &store).scan_repository(&demo()).await.unwrap();

    assert_eq!(status, RepoScanStatus::Ingested(0));
    let latest = store.lock().unwrap().latest_scan(DEMO_URL).unwrap().unwrap();
    assert_eq!(latest.commit_sha.as_deref(), Some("c7"));
}

#[tokio::test]
async fn test_missing_repository_records_sentinel_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let store = memory_store();
    let engine = engine(&config, &store);
    let gone = RepoRef::new("acme", "gone");

    assert_eq!(
        engine.scan_repository(&gone).await.unwrap(),
        RepoScanStatus::Missing
    );
    assert_eq!(number_of_requests(&server).await, 1);

    assert_eq!(
        engine.scan_repository(&gone).await.unwrap(),
        RepoScanStatus::NotDue
    );
    assert_eq!(number_of_requests(&server).await, 1);

    let store = store.lock().unwrap();
    let scans = store.scans_for_repo("https://github.com/acme/gone").unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].outcome, ScanOutcome::NotFound);
    assert!(scans[0].commit_sha.is_none());
}

#[tokio::test]
async fn test_hidden_repository_is_not_requested() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let store = memory_store();
    store.lock().unwrap().hide_repo(DEMO_URL).unwrap();

    let status = engine(&config, &store).scan_repository(&demo()).await.unwrap();

    assert_eq!(status, RepoScanStatus::Hidden);
    assert_eq!(number_of_requests(&server).await, 0);
}

#[tokio::test]
async fn test_search_discovery_paginates_and_ingests() {
    let server = MockServer::start().await;
    let query = "extension:roc -repo:roc-lang/roc";

    for (page, file, sha, contents) in [("1", "main.roc", "s1", "hello"), ("2", "util.roc", "s2", "world")] {
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .and(query_param("q", query))
            .and(query_param("per_page", "1"))
            .and(query_param("page", page))
            .respond_with(ok_json(json!({
                "total_count": 2,
                "incomplete_results": false,
                "items": [{
                    "name": file,
                    "path": file,
                    "sha": sha,
                    "url": format!("{}/repos/acme/demo/contents/{}?ref=c9", server.uri(), file),
                    "repository": { "full_name": "acme/demo", "html_url": DEMO_URL },
                }],
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/demo/contents/{}", file)))
            .respond_with(ok_json(blob_json(sha, contents.as_bytes())))
            .expect(1)
            .mount(&server)
            .await;
    }

    let mut config = test_config(&server);
    config.crawler.per_page = 1;
    let store = memory_store();

    let mut pass = CrawlPass::default();
    engine(&config, &store)
        .discover_via_search(&mut pass)
        .await
        .unwrap();

    assert_eq!(pass.summary.search_hits, 2);

    let store = store.lock().unwrap();
    let mut files = store.files_for_repo(DEMO_URL).unwrap();
    files.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].contents, "hello");
    assert_eq!(files[0].commit_sha, "c9");
    assert_eq!(files[1].contents, "world");
    // Search hits are ingested without a scan record
    assert!(store.scans_for_repo(DEMO_URL).unwrap().is_empty());
}

#[tokio::test]
async fn test_user_expansion_scans_sibling_repositories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/acme/repos"))
        .and(query_param("page", "1"))
        .respond_with(ok_json(json!([
            { "full_name": "acme/demo", "html_url": DEMO_URL },
            { "full_name": "acme/other", "html_url": "https://github.com/acme/other" },
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_repo(&server, "acme", "other", "c5").await;
    mount_tree(
        &server,
        "acme",
        "other",
        "c5",
        json!([blob_entry(&server, "acme", "other", "README.md", "r1", 10)]),
        1,
    )
    .await;

    let config = test_config(&server);
    let store = memory_store();
    {
        let mut store = store.lock().unwrap();
        store.add_file(&seed_file(DEMO_URL)).unwrap();
        store
            .record_scan(&seed_scan(DEMO_URL, 1, "c0", ScanOutcome::Matched(1)))
            .unwrap();
    }

    let mut pass = CrawlPass::default();
    engine(&config, &store)
        .expand_known_users(&mut pass)
        .await
        .unwrap();

    assert!(pass.has_visited(DEMO_URL));
    assert!(pass.has_visited("https://github.com/acme/other"));
    let summary = pass.into_summary();
    assert_eq!(summary.repos_not_due, 1);
    assert_eq!(summary.repos_scanned, 1);
    assert_eq!(summary.files_ingested, 0);

    let latest = store
        .lock()
        .unwrap()
        .latest_scan("https://github.com/acme/other")
        .unwrap()
        .unwrap();
    assert_eq!(latest.outcome, ScanOutcome::Matched(0));
    assert_eq!(latest.commit_sha.as_deref(), Some("c5"));
}

#[tokio::test]
async fn test_server_error_aborts_pass() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/code"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let config = test_config(&server);
    let store = memory_store();
    let err = engine(&config, &store).run_pass().await.unwrap_err();

    assert!(matches!(
        err,
        TrawlError::Api(ApiError::Status { status: 502, .. })
    ));
}

#[tokio::test]
async fn test_worker_single_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/code"))
        .respond_with(ok_json(json!({ "total_count": 0, "items": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let store = memory_store();
    let worker = Worker::new(
        crate::common::api_client(&config),
        Arc::clone(&store),
        &config,
    );

    let summary = worker.run_cycle().await.unwrap();
    assert_eq!(summary, PassSummary::default());

    worker.run(true).await.unwrap();
    // Second cycle served the search page from cache
    assert_eq!(number_of_requests(&server).await, 1);
}
