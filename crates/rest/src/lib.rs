//! REST adapter for the resilient client pipeline.
//!
//! Implements the [`pipeline::Transport`] port over HTTP/1.1 and HTTP/2 with
//! [`reqwest`]. One [`RestTransport`] owns one connection pool, shared by
//! every concurrent call on the client.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate contains no retry or classification rules:
//! it turns a descriptor into one HTTP exchange and hands back the raw
//! response.
//!
//! ## Request mapping
//!
//! | Placement | Wire |
//! |-----------|------|
//! | `Path` | `{name}` placeholder in the target path, percent-encoded |
//! | `Query` | query string pair (arrays repeat the key, nulls are skipped) |
//! | `Header` | HTTP header, overriding the client's default headers |
//! | `Body` | field of a JSON object body; a lone parameter named `body` is sent as the whole body |

pub mod http;
pub mod target;

use async_trait::async_trait;
use pipeline::{
    ClientConfig, ConnectionSlot, OperationDescriptor, Placement, Protocol, RawResponse, Transport,
    TransportError,
};
use serde_json::{Map, Value};
use tracing::debug;

pub use target::{build_url, parse_target, RestTarget};

/// Parameter name whose value is sent as the entire request body.
pub const WHOLE_BODY_PARAMETER: &str = "body";

/// The REST [`Transport`].
#[derive(Debug)]
pub struct RestTransport {
    client: ConnectionSlot<reqwest::Client>,
}

impl RestTransport {
    /// Creates an adapter with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the HTTP client cannot be built
    /// (for example when the TLS backend fails to initialise).
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client))
    }

    /// Creates an adapter over an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client: ConnectionSlot::new(client) }
    }
}

#[async_trait]
impl Transport for RestTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Rest
    }

    async fn execute(
        &self,
        descriptor: &OperationDescriptor,
        config: &ClientConfig,
    ) -> Result<RawResponse, TransportError> {
        let client = self.client.acquire()?;
        let target = parse_target(descriptor.target())?;
        let url = build_url(config.base_endpoint(), target.path_template, descriptor)?;
        let headers = http::request_headers(descriptor, config)?;

        debug!(method = %target.method, url = %url, "sending REST request");
        let mut request = client
            .request(target.method, url)
            .headers(headers)
            .timeout(descriptor.effective_timeout(config));
        if let Some(body) = request_body(descriptor) {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| http::map_send_error(&e))?;
        let raw = http::read_response(response).await?;
        debug!(status = raw.status, bytes = raw.body.len(), "REST response received");
        Ok(raw)
    }

    fn close(&self) {
        self.client.release();
    }
}

/// The JSON body for a descriptor's `Body` parameters, if it has any.
pub fn request_body(descriptor: &OperationDescriptor) -> Option<Value> {
    let params: Vec<_> = descriptor.parameters_in(Placement::Body).collect();
    match params.as_slice() {
        [] => None,
        [only] if only.name == WHOLE_BODY_PARAMETER => Some(only.value.clone()),
        many => Some(Value::Object(
            many.iter()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect::<Map<String, Value>>(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::OperationName;
    use serde_json::json;

    fn builder() -> pipeline::OperationDescriptorBuilder {
        OperationDescriptor::builder(OperationName::new("createPet").unwrap(), Protocol::Rest, "POST /pets")
    }

    #[test]
    fn no_body_parameters_means_no_body() {
        assert_eq!(request_body(&builder().query("dryRun", true).build()), None);
    }

    #[test]
    fn lone_body_parameter_is_sent_whole() {
        let d = builder().body("body", json!({"name": "Rex"})).build();
        assert_eq!(request_body(&d), Some(json!({"name": "Rex"})));
    }

    #[test]
    fn body_parameters_form_an_object() {
        let d = builder().body("name", "Rex").body("age", 3).build();
        assert_eq!(request_body(&d), Some(json!({"name": "Rex", "age": 3})));
    }

    #[tokio::test]
    async fn closed_transport_refuses_attempts() {
        let transport = RestTransport::new().unwrap();
        transport.close();
        let config = ClientConfig::builder("http://127.0.0.1:9").build().unwrap();
        let err = transport.execute(&builder().build(), &config).await.unwrap_err();
        assert_eq!(err, TransportError::Closed);
    }
}
