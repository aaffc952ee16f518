use std::time::Duration;

use httptest::matchers::{all_of, contains, eq, json_decoded, request};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use serde_json::json;

use hospital_places_enricher::{PlacesClient, PlacesError, SearchRequest, SerperClient};

fn apollo_request() -> SearchRequest {
    SearchRequest::new("Apollo", "12.9716", "77.5946", "560001", 200, 20)
}

#[tokio::test]
async fn posts_query_with_api_key_and_returns_body() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of!(
            request::method_path("POST", "/maps"),
            request::headers(contains(("x-api-key", "secret-key"))),
            request::body(json_decoded(eq(json!({
                "q": "Apollo hospital near 12.9716,77.5946 560001 India",
                "num": 20,
                "start": 0,
                "ll": "12.9716,77.5946",
                "gl": "in",
                "hl": "en",
                "radius": 200
            })))),
        ))
        .respond_with(json_encoded(json!({
            "places": [{"title": "Apollo Hospital", "cid": "123"}]
        }))),
    );

    let client = SerperClient::new(
        &server.url_str("/maps"),
        "secret-key",
        Duration::from_secs(5),
    )
    .unwrap();
    let body = client.search(&apollo_request()).await.unwrap();
    assert_eq!(body["places"][0]["cid"], "123");
}

#[tokio::test]
async fn non_success_status_is_reported_with_body() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/maps"))
            .respond_with(status_code(429).body("rate limited")),
    );

    let client =
        SerperClient::new(&server.url_str("/maps"), "k", Duration::from_secs(5)).unwrap();
    match client.search(&apollo_request()).await {
        Err(PlacesError::Status { status, body }) => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn radius_is_omitted_when_zero() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of!(
            request::method_path("POST", "/maps"),
            request::body(json_decoded(eq(json!({
                "q": "hospital near 1,2 110001 India",
                "num": 5,
                "start": 0,
                "ll": "1,2",
                "gl": "in",
                "hl": "en"
            })))),
        ))
        .respond_with(json_encoded(json!({"places": []}))),
    );

    let client =
        SerperClient::new(&server.url_str("/maps"), "k", Duration::from_secs(5)).unwrap();
    let request = SearchRequest::new("", "1", "2", "110001", 0, 5);
    let body = client.search(&request).await.unwrap();
    assert_eq!(body, json!({"places": []}));
}
