//! Catchpoint adapter against a local mock API.

#![cfg(feature = "catchpoint")]

use std::thread;
use std::time::Duration;

use cpwatch_adapters::catchpoint::{
    CatchpointAdapter, RetryPolicy, TestDataRequest, TestSelection, TimeWindow,
};
use cpwatch_adapters::{AdapterError, TestType, Value};
use serde_json::json;
use tiny_http::{Header, Response, Server};

/// A request as seen by the mock server.
#[derive(Debug)]
struct Seen {
    url: String,
    auth: Option<String>,
}

/// Serve `responses` in order, then return what was requested.
fn serve(responses: Vec<(u16, String)>) -> (String, thread::JoinHandle<Vec<Seen>>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let addr = server.server_addr().to_ip().expect("ip listener");

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let request = match server.recv_timeout(Duration::from_secs(5)) {
                Ok(Some(request)) => request,
                _ => break,
            };
            let auth = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.to_string());
            seen.push(Seen {
                url: request.url().to_string(),
                auth,
            });
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(Header::from_bytes("Content-Type", "application/json").unwrap());
            request.respond(response).expect("respond");
        }
        seen
    });

    (format!("http://{}", addr), handle)
}

fn adapter(endpoint: &str, max_retries: u32) -> CatchpointAdapter {
    CatchpointAdapter::builder()
        .endpoint(endpoint)
        .api_key("secret-token")
        .pacing(Duration::ZERO)
        .retry(RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(10),
        })
        .build()
        .expect("adapter")
}

fn explorer_body() -> String {
    json!({
        "data": {"responseItems": [{
            "dimensions": [{"name": "Test"}, {"name": "Country"}],
            "metrics": [{"name": "DNS (ms)"}, {"name": "# Connection Failures"}],
            "tracepoints": [{"index": 0, "name": "X-ES-Info"}],
            "items": [
                {"dimensions": [{"name": "home"}, {"name": "Japan"}], "values": [12, null], "tracepoints": ["[c=JP]"]},
                {"dimensions": [{"name": "home"}, {"name": "France"}], "values": [4100, 0], "tracepoints": [null]}
            ]
        }]}
    })
    .to_string()
}

fn tests_body() -> String {
    json!({
        "data": {"tests": [
            {"id": 101, "name": "home", "testType": {"name": "Web"}, "url": "https://home", "monitor": {"name": "Chrome"}},
            {"id": 102, "name": "checkout", "testType": {"name": "Transaction"},
             "testRequestData": {"requestData": "open https://shop"}, "monitor": {"name": "Chrome"}}
        ]}
    })
    .to_string()
}

fn window() -> TimeWindow {
    TimeWindow::Absolute {
        start: "2024-01-01T00:00:00".into(),
        end: "2024-01-01T01:00:00".into(),
    }
}

#[tokio::test]
async fn fetches_and_extracts_test_data() {
    let (endpoint, server) = serve(vec![(200, explorer_body())]);
    let request =
        TestDataRequest::new(TestSelection::TestIds(vec!["1".into(), "2".into()])).window(window());

    let dataset = adapter(&endpoint, 0).fetch_test_data(&request).await.unwrap();

    assert_eq!(
        dataset.columns(),
        ["test", "country", "dns_ms", "cnt_connection_failures", "x_es_info"]
    );
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.rows()[0][3], Value::Int(0));
    assert_eq!(dataset.stats().outliers, 1);
    assert_eq!(dataset.provenance().test_ids, ["1", "2"]);
    assert_eq!(dataset.provenance().start_time, "2024-01-01T00:00:00");

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].url.starts_with("/tests/explorer/aggregated?"));
    assert!(seen[0].url.contains("testIds=1%2C2"));
    assert!(seen[0].url.contains("interval=6"));
    assert!(seen[0].url.contains("tracepointIds=10565%2C10538%2C10545"));
    assert_eq!(seen[0].auth.as_deref(), Some("Bearer secret-token"));
}

#[tokio::test]
async fn retries_rate_limited_requests() {
    let (endpoint, server) = serve(vec![
        (429, "slow down".into()),
        (429, "slow down".into()),
        (200, explorer_body()),
    ]);
    let request = TestDataRequest::new(TestSelection::TestId("1".into())).window(window());

    let dataset = adapter(&endpoint, 5).fetch_test_data(&request).await.unwrap();
    assert_eq!(dataset.len(), 2);
    assert_eq!(server.join().unwrap().len(), 3);
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let (endpoint, server) = serve(vec![
        (429, "limit 1".into()),
        (429, "limit 2".into()),
        (429, "limit 3".into()),
    ]);
    let request = TestDataRequest::new(TestSelection::TestId("1".into())).window(window());

    let err = adapter(&endpoint, 2).fetch_test_data(&request).await.unwrap_err();
    match err {
        AdapterError::Status { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "limit 3");
        }
        other => panic!("expected status error, got {:?}", other),
    }
    assert_eq!(server.join().unwrap().len(), 3);
}

#[tokio::test]
async fn other_errors_are_not_retried() {
    let (endpoint, server) = serve(vec![(500, "boom".into()), (200, explorer_body())]);
    let request = TestDataRequest::new(TestSelection::TestId("1".into())).window(window());

    let err = adapter(&endpoint, 5).fetch_test_data(&request).await.unwrap_err();
    assert_eq!(err.status(), Some(500));

    // the queued 200 is never requested
    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 1);
}

#[tokio::test]
async fn undecodable_payload_reports_status_zero() {
    let (endpoint, server) = serve(vec![(200, "<html>maintenance</html>".into())]);
    let request = TestDataRequest::new(TestSelection::TestId("1".into())).window(window());

    let err = adapter(&endpoint, 0).fetch_test_data(&request).await.unwrap_err();
    assert_eq!(err.status(), Some(0));
    assert!(err.to_string().contains("<html>maintenance</html>"));
    server.join().unwrap();
}

#[tokio::test]
async fn folder_selection_filters_by_test_type() {
    let (endpoint, server) = serve(vec![(200, tests_body()), (200, explorer_body())]);
    let request = TestDataRequest::new(TestSelection::Folder {
        id: "73339".into(),
        test_type: TestType::Web,
    })
    .window(window());

    let dataset = adapter(&endpoint, 0).fetch_test_data(&request).await.unwrap();
    assert_eq!(dataset.provenance().test_ids, ["101"]);

    let seen = server.join().unwrap();
    assert!(seen[0].url.starts_with("/tests/?"));
    assert!(seen[0].url.contains("parentFolderIds=73339"));
    assert!(seen[1].url.contains("testIds=101&"));
}

#[tokio::test]
async fn folder_lookup_failure_short_circuits() {
    let (endpoint, server) = serve(vec![(403, "forbidden".into()), (200, explorer_body())]);
    let request = TestDataRequest::new(TestSelection::Folder {
        id: "73339".into(),
        test_type: TestType::All,
    })
    .window(window());

    let err = adapter(&endpoint, 5).fetch_test_data(&request).await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert_eq!(server.join().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_folder_reports_no_tests() {
    let (endpoint, server) = serve(vec![(200, tests_body())]);
    let request = TestDataRequest::new(TestSelection::Folder {
        id: "73339".into(),
        test_type: TestType::Api,
    })
    .window(window());

    let err = adapter(&endpoint, 0).fetch_test_data(&request).await.unwrap_err();
    assert!(matches!(err, AdapterError::NoTests(_)));
    assert_eq!(err.status(), Some(0));
    assert_eq!(server.join().unwrap().len(), 1);
}

#[tokio::test]
async fn lists_tests_in_folder() {
    let (endpoint, server) = serve(vec![(200, tests_body())]);

    let tests = adapter(&endpoint, 0)
        .tests_in_folder("73339", TestType::All)
        .await
        .unwrap();
    assert_eq!(tests.len(), 2);
    assert_eq!(tests[0].id, "101");
    assert_eq!(tests[0].request_data, "https://home");
    assert_eq!(tests[1].request_data, "open https://shop");
    assert_eq!(tests[1].test_type, "Transaction");
    server.join().unwrap();
}

#[tokio::test]
async fn reads_folder_details() {
    let body = json!({
        "data": {"folders": [{
            "id": 73339,
            "name": "Storefront",
            "scheduleSetting": {"nodes": [
                {"id": 7, "name": "Tokyo - NTT", "networkType": {"name": "Backbone"}}
            ]}
        }]}
    })
    .to_string();
    let (endpoint, server) = serve(vec![(200, body)]);

    let folder = adapter(&endpoint, 0).folder_details("73339").await.unwrap();
    assert_eq!(folder.id, 73339);
    assert_eq!(folder.name, "Storefront");
    assert_eq!(folder.nodes.len(), 1);
    assert_eq!(folder.nodes[0].network_type, "Backbone");

    let seen = server.join().unwrap();
    assert_eq!(seen[0].url, "/folders/73339?showInheritedProperties=true");
}

#[tokio::test]
async fn reads_enumerations() {
    let body = json!({
        "data": {"sections": [
            {"section": "metrics", "enumeration": [{"id": 1, "name": "DNS (ms)"}]},
            {"section": "timeIntervals", "enumeration": [{"id": 6, "name": "15 Minutes"}]}
        ]}
    })
    .to_string();
    let (endpoint, server) = serve(vec![(200, body)]);

    let sections = adapter(&endpoint, 0).enumerations().await.unwrap();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections["metrics"][0]["name"], "DNS (ms)");

    let seen = server.join().unwrap();
    assert!(seen[0].url.starts_with("/tests/explorer/enumeration?includeDimensions=true"));
}
