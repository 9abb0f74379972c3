//! GraphQL adapter for the resilient client pipeline.
//!
//! Every operation is an HTTP `POST` of `{query, variables, operationName}` to
//! one endpoint: the client's base endpoint joined with the adapter's path
//! (`/graphql` unless configured otherwise). `Header` parameters become HTTP
//! headers; every other parameter becomes a variable.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Interpreting `data` and `errors` in the response is the
//! classifier's job; this crate only performs the exchange.

pub mod document;

use async_trait::async_trait;
use pipeline::{
    ClientConfig, ConnectionSlot, OperationDescriptor, Placement, Protocol, RawResponse, Transport,
    TransportError,
};
use reqwest::Url;
use rest_transport::http;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

pub use document::{declares_operation, looks_like_document, DocumentRegistry};

/// Path appended to the base endpoint unless configured otherwise.
pub const DEFAULT_ENDPOINT_PATH: &str = "/graphql";

/// Wire shape of a GraphQL request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: Map<String, Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<&'a str>,
}

impl<'a> GraphQlRequest<'a> {
    /// Builds the request for `descriptor` with its resolved `document`.
    ///
    /// `operationName` is sent only when the document declares an operation
    /// with the descriptor's name.
    pub fn new(document: &'a str, descriptor: &'a OperationDescriptor) -> Self {
        let variables = descriptor
            .parameters()
            .iter()
            .filter(|p| p.placement != Placement::Header)
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        let name = descriptor.name().as_str();
        Self {
            query: document,
            variables,
            operation_name: declares_operation(document, name).then_some(name),
        }
    }
}

/// The GraphQL [`Transport`].
#[derive(Debug)]
pub struct GraphQlTransport {
    client: ConnectionSlot<reqwest::Client>,
    endpoint_path: String,
    documents: DocumentRegistry,
}

impl GraphQlTransport {
    /// Creates an adapter with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(reqwest::Client::builder().build()?))
    }

    /// Creates an adapter over an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: ConnectionSlot::new(client),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            documents: DocumentRegistry::new(),
        }
    }

    /// Sets the path of the GraphQL endpoint below the base endpoint.
    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = path.into();
        self
    }

    /// Registers the document sent for operations whose target is `target`.
    pub fn with_document(mut self, target: impl Into<String>, document: impl Into<String>) -> Self {
        self.documents.insert(target, document);
        self
    }

    fn endpoint(&self, base_endpoint: &str) -> Result<Url, TransportError> {
        let mut url = Url::parse(base_endpoint)
            .map_err(|e| TransportError::Encode(format!("invalid base endpoint {base_endpoint:?}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| TransportError::Encode(format!("base endpoint {base_endpoint:?} cannot carry a path")))?
            .pop_if_empty()
            .extend(self.endpoint_path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }
}

#[async_trait]
impl Transport for GraphQlTransport {
    fn protocol(&self) -> Protocol {
        Protocol::GraphQl
    }

    async fn execute(
        &self,
        descriptor: &OperationDescriptor,
        config: &ClientConfig,
    ) -> Result<RawResponse, TransportError> {
        let client = self.client.acquire()?;
        let document = self.documents.resolve(descriptor)?;
        let url = self.endpoint(config.base_endpoint())?;
        let headers = http::request_headers(descriptor, config)?;
        let body = GraphQlRequest::new(&document, descriptor);

        debug!(url = %url, operation = ?body.operation_name, "sending GraphQL request");
        let response = client
            .post(url)
            .headers(headers)
            .timeout(descriptor.effective_timeout(config))
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_send_error(&e))?;
        let raw = http::read_response(response).await?;
        debug!(status = raw.status, bytes = raw.body.len(), "GraphQL response received");
        Ok(raw)
    }

    fn close(&self) {
        self.client.release();
    }
}
