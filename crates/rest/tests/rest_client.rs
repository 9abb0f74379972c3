//! REST calls through a full client against a mock HTTP server.

use std::time::Duration;

use pipeline::{Client, ClientConfig, ErrorKind, OperationDescriptor, OperationName, Protocol, RetryPolicy, TransportSet};
use rest_transport::RestTransport;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, max_attempts: u32) -> Client {
    let policy = RetryPolicy::new(max_attempts, Duration::from_millis(5), Duration::from_millis(50), 0.0).unwrap();
    let config = ClientConfig::builder(server.uri())
        .header("x-api-key", "secret")
        .retry_policy(policy)
        .build()
        .unwrap();
    Client::new(config, TransportSet::new().with(RestTransport::new().unwrap()))
}

fn op(name: &str, target: &str) -> pipeline::OperationDescriptorBuilder {
    OperationDescriptor::builder(OperationName::new(name).unwrap(), Protocol::Rest, target)
}

#[tokio::test]
async fn test_get_with_path_query_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pets/42"))
        .and(query_param("expand", "owner"))
        .and(header("x-api-key", "secret"))
        .and(header("x-request-id", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42, "name": "Rex"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 3);
    let call = op("getPet", "GET /pets/{petId}")
        .path("petId", 42)
        .query("expand", "owner")
        .header("X-Request-Id", "abc")
        .build();

    let pet: Value = client.run(&call).await.unwrap().decode().unwrap();
    assert_eq!(pet["name"], "Rex");
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pets"))
        .and(body_json(json!({"name": "Tom", "age": 2})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 1);
    let call = op("createPet", "POST /pets").body("name", "Tom").body("age", 2).build();

    let created: Value = client.run(&call).await.unwrap().decode().unwrap();
    assert_eq!(created["id"], 7);
}

#[tokio::test]
async fn test_unavailable_twice_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pets"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 3);
    client.run(&op("listPets", "GET /pets").build()).await.unwrap();

    let stats = client.telemetry().operation("listPets").cloned().unwrap();
    assert_eq!(stats.attempt_count_total, 3);
    assert_eq!(stats.success_count, 1);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/pets/1"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such pet"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 5);
    let err = client.run(&op("deletePet", "DELETE /pets/{id}").path("id", 1).build()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_malformed_json_success_is_serialization_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{not json", "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 3);
    let err = client.run(&op("getPet", "GET /pets/1").build()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Serialization);
}

#[tokio::test]
async fn test_slow_response_times_out_each_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = client(&server, 2);
    let call = op("slowPets", "GET /pets").timeout(Duration::from_millis(50)).build();
    let err = client.run(&call).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RetryExhausted);
    assert_eq!(err.last_kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connection_failure() {
    let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1), 0.0).unwrap();
    // Port 9 (discard) is closed on test machines.
    let config = ClientConfig::builder("http://127.0.0.1:9").retry_policy(policy).build().unwrap();
    let client = Client::new(config, TransportSet::new().with(RestTransport::new().unwrap()));

    let err = client.run(&op("getPet", "GET /pets/1").build()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RetryExhausted);
    assert_eq!(err.last_kind(), ErrorKind::Connection);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_call_from_plain_thread() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pets/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 1);
    let worker = std::thread::spawn(move || {
        let call = op("getPet", "GET /pets/{id}").path("id", 3).build();
        client.run_blocking(&call).map(|p| p.to_bytes())
    });
    let body = tokio::task::spawn_blocking(move || worker.join()).await.unwrap().unwrap().unwrap();

    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"id": 3}));
}
