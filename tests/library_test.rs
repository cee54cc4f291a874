//! Integration tests for library scanning and item queries.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{json, TestHarness};

#[tokio::test]
async fn scan_then_list_items() {
    let h = TestHarness::new();
    h.add_file("Brazil.mkv", &[0u8; 30]);
    h.add_file("Alien.mp4", &[0u8; 10]);
    h.add_file("notes.txt", b"ignored");

    let (status, _, body) = h.send_json(Method::POST, "/api/library/scan", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let reports = json(&body);
    assert_eq!(reports.as_array().unwrap().len(), 1);
    assert_eq!(reports[0]["scanned"], 2);
    assert_eq!(reports[0]["upserted"], 2);

    let (status, _, body) = h.get("/api/items").await;
    assert_eq!(status, StatusCode::OK);
    let page = json(&body);
    assert_eq!(page["total"], 2);
    let titles: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Alien", "Brazil"]);
}

#[tokio::test]
async fn empty_body_scans_every_root() {
    let h = TestHarness::new();
    h.add_file("Alien.mkv", b"a");

    let (status, _, body) = h
        .request(
            axum::http::Request::post("/api/library/scan")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)[0]["scanned"], 1);
}

#[tokio::test]
async fn second_manual_scan_is_rate_limited() {
    let h = TestHarness::new();
    h.add_file("Alien.mkv", b"a");

    let (first, _, _) = h.send_json(Method::POST, "/api/library/scan", serde_json::json!({})).await;
    assert_eq!(first, StatusCode::OK);

    let (second, headers, body) =
        h.send_json(Method::POST, "/api/library/scan", serde_json::json!({})).await;
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    let retry: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=30).contains(&retry));
    assert_eq!(json(&body)["retry_after_secs"], retry);
}

#[tokio::test]
async fn scan_path_outside_root_is_rejected() {
    let h = TestHarness::new();
    let (status, _, body) = h
        .send_json(Method::POST, "/api/library/scan", serde_json::json!({"path": "../.."}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["code"], "validation_error");
}

#[tokio::test]
async fn rejected_scan_does_not_use_up_the_interval() {
    let h = TestHarness::new();
    h.add_file("Alien.mkv", b"a");

    let (status, _, _) = h
        .send_json(Method::POST, "/api/library/scan", serde_json::json!({"path": "../../etc"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = h.send_json(Method::POST, "/api/library/scan", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)[0]["scanned"], 1);

    let (status, _, _) = h.send_json(Method::POST, "/api/library/scan", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn malformed_scan_body_is_rejected() {
    let h = TestHarness::new();
    let (status, _, _) = h
        .request(
            axum::http::Request::post("/api/library/scan")
                .header("content-type", "application/json")
                .body(axum::body::Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subtree_scan_only_touches_that_subtree() {
    let h = TestHarness::with_config(|c| c.rate_limits.scan_interval_secs = 0);
    h.add_file("movies/Alien.mkv", b"a");
    h.add_file("shows/The.Wire.S01E02.mkv", b"b");
    h.scan().await;

    std::fs::remove_file(h.library.join("movies/Alien.mkv")).unwrap();
    std::fs::remove_file(h.library.join("shows/The.Wire.S01E02.mkv")).unwrap();

    let (status, _, body) = h
        .send_json(Method::POST, "/api/library/scan", serde_json::json!({"path": "movies"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)[0]["deleted"], 1);

    let (_, _, body) = h.get("/api/items").await;
    let page = json(&body);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["season"], 1);
    assert_eq!(page["items"][0]["episode"], 2);
}

#[tokio::test]
async fn roots_and_scan_runs_are_reported() {
    let h = TestHarness::new();
    h.add_file("Alien.mkv", b"a");
    h.scan().await;

    let (status, _, body) = h.get("/api/library/roots").await;
    assert_eq!(status, StatusCode::OK);
    let roots = json(&body);
    assert_eq!(roots[0]["index"], 0);
    assert_eq!(roots[0]["kind"], "video");
    assert!(roots[0]["id"].is_string());

    let (status, _, body) = h.get("/api/library/scans?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    let runs = json(&body);
    assert_eq!(runs.as_array().unwrap().len(), 1);
    assert_eq!(runs[0]["status"], "success");
    assert!(runs[0]["finished_at"].is_string());
}

#[tokio::test]
async fn search_sort_and_paging() {
    let h = TestHarness::new();
    h.add_file("Alien.mkv", &[0u8; 300]);
    h.add_file("Aliens.mkv", &[0u8; 100]);
    h.add_file("Brazil.mkv", &[0u8; 200]);
    h.scan().await;

    let (_, _, body) = h.get("/api/items?search=ALIEN&sort=size").await;
    let page = json(&body);
    assert_eq!(page["total"], 2);
    // Largest first.
    assert_eq!(page["items"][0]["title"], "Alien");
    assert_eq!(page["items"][1]["title"], "Aliens");

    let (_, _, body) = h.get("/api/items?offset=1&limit=1").await;
    let page = json(&body);
    assert_eq!(page["total"], 3);
    assert_eq!(page["offset"], 1);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["title"], "Aliens");

    let (status, _, _) = h.get("/api/items?sort=rating").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn item_detail_includes_sidecar_metadata() {
    let h = TestHarness::new();
    h.add_file("Alien.mkv", b"a");
    h.add_file("Alien.nfo", b"<movie><title>Alien</title><year>1979</year></movie>");
    h.scan().await;
    let item = h.item("Alien");

    let (status, _, body) = h.get(&format!("/api/items/{}", item.id)).await;
    assert_eq!(status, StatusCode::OK);
    let detail = json(&body);
    assert_eq!(detail["item"]["has_nfo"], true);
    assert_eq!(detail["metadata"]["kind"], "movie");

    let (status, _, body) = h.get("/api/items/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["code"], "not_found");
}
