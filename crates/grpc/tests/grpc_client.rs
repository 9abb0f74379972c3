//! gRPC calls through a full client.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use grpc_transport::{BytesCodec, GrpcTransport};
use pipeline::{Client, ClientConfig, ErrorKind, OperationDescriptor, OperationName, Protocol, RetryPolicy, TransportSet};
use serde_json::json;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::body::Body;
use tonic::codegen::{BoxFuture, Service, StdError};
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::transport::Server;
use tonic::{Request, Response, Status};

fn get_pet() -> OperationDescriptor {
    OperationDescriptor::builder(OperationName::new("GetPet").unwrap(), Protocol::Grpc, "pets.v1.Pets/GetPet")
        .body("id", 3)
        .timeout(Duration::from_secs(2))
        .build()
}

fn client(endpoint: &str, max_attempts: u32) -> Client {
    let policy = RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5), 0.0).unwrap();
    let config = ClientConfig::builder(endpoint).retry_policy(policy).build().unwrap();
    let transport = GrpcTransport::new().with_connect_timeout(Duration::from_millis(500));
    Client::new(config, TransportSet::new().with(transport))
}

#[tokio::test]
async fn test_unreachable_server_is_retried_then_exhausted() {
    // Port 9 (discard) is closed on test machines.
    let client = client("http://127.0.0.1:9", 2);

    let err = client.run(&get_pet()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RetryExhausted);
    assert_eq!(err.attempts(), Some(2));
    assert!(err.last_kind().is_retryable_by_default(), "last kind {}", err.last_kind());
    assert_eq!(client.telemetry().operation("GetPet").unwrap().attempt_count_total, 2);
}

#[tokio::test]
async fn test_closed_client_fails_fast() {
    let client = client("http://127.0.0.1:9", 3);
    client.close();

    let err = client.run(&get_pet()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn test_bad_target_is_not_retried() {
    let client = client("http://127.0.0.1:9", 3);
    let call = OperationDescriptor::builder(OperationName::new("GetPet").unwrap(), Protocol::Grpc, "GetPet").build();

    let err = client.run(&call).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Serialization);
    assert_eq!(client.telemetry().operation("GetPet").unwrap().attempt_count_total, 1);
}

// ---------------------------------------------------------------------------
// In-process pets.v1.Pets server speaking raw bytes
// ---------------------------------------------------------------------------

/// `Echo` returns the request message, `GetPet` answers NOT_FOUND and
/// `Flaky` answers UNAVAILABLE, counting how often it was hit.
#[derive(Clone, Default)]
struct PetsServer {
    flaky_hits: Arc<AtomicU32>,
}

struct Method {
    path: String,
    flaky_hits: Arc<AtomicU32>,
}

impl UnaryService<Bytes> for Method {
    type Response = Bytes;
    type Future = BoxFuture<Response<Bytes>, Status>;

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let reply = match self.path.as_str() {
            "/pets.v1.Pets/Echo" => Ok(Response::new(request.into_inner())),
            "/pets.v1.Pets/GetPet" => Err(Status::not_found("no pet 7")),
            "/pets.v1.Pets/Flaky" => {
                self.flaky_hits.fetch_add(1, Ordering::SeqCst);
                Err(Status::unavailable("draining"))
            }
            other => Err(Status::unimplemented(format!("no method {other}"))),
        };
        Box::pin(async move { reply })
    }
}

impl<B> Service<http::Request<B>> for PetsServer
where
    B: tonic::codegen::Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let method = Method {
            path: request.uri().path().to_string(),
            flaky_hits: Arc::clone(&self.flaky_hits),
        };
        Box::pin(async move { Ok(Grpc::new(BytesCodec).unary(method, request).await) })
    }
}

impl NamedService for PetsServer {
    const NAME: &'static str = "pets.v1.Pets";
}

async fn serve(server: PetsServer) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        Server::builder()
            .add_service(server)
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    format!("http://{addr}")
}

fn pets_call(method: &str) -> OperationDescriptor {
    OperationDescriptor::builder(OperationName::new(method).unwrap(), Protocol::Grpc, format!("pets.v1.Pets/{method}"))
        .body("id", 7)
        .header("x-tenant", "acme")
        .timeout(Duration::from_secs(2))
        .build()
}

#[tokio::test]
async fn test_live_server_echoes_message() {
    let endpoint = serve(PetsServer::default()).await;
    let client = client(&endpoint, 3);

    let payload = client.run(&pets_call("Echo")).await.unwrap();

    assert_eq!(payload.decode::<serde_json::Value>().unwrap(), json!({"id": 7}));
    let stats = client.telemetry().operation("Echo").cloned().unwrap();
    assert_eq!(stats.calls, 1);
    assert_eq!(stats.attempt_count_total, 1);
}

#[tokio::test]
async fn test_live_server_not_found_is_not_retried() {
    let endpoint = serve(PetsServer::default()).await;
    let client = client(&endpoint, 3);

    let err = client.run(&pets_call("GetPet")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("no pet 7"), "{err}");
    assert_eq!(client.telemetry().operation("GetPet").unwrap().attempt_count_total, 1);
}

#[tokio::test]
async fn test_live_server_unavailable_exhausts_attempts() {
    let server = PetsServer::default();
    let hits = Arc::clone(&server.flaky_hits);
    let endpoint = serve(server).await;
    let client = client(&endpoint, 3);

    let err = client.run(&pets_call("Flaky")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RetryExhausted);
    assert_eq!(err.attempts(), Some(3));
    assert_eq!(err.last_kind(), ErrorKind::Transient);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}
