//! HTTP plumbing shared by the REST and GraphQL adapters.

use std::collections::BTreeMap;

use pipeline::{ClientConfig, OperationDescriptor, Placement, RawResponse, TransportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

/// Builds the request headers for one attempt: the client's default headers,
/// then the descriptor's header parameters (which win on conflict), then the
/// client's user agent.
///
/// # Errors
///
/// Returns [`TransportError::Encode`] for a name or value that is not a
/// valid HTTP header.
pub fn request_headers(
    descriptor: &OperationDescriptor,
    config: &ClientConfig,
) -> Result<HeaderMap, TransportError> {
    let mut merged: BTreeMap<String, String> = config
        .default_headers()
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect();
    for param in descriptor.parameters_in(Placement::Header) {
        merged.insert(param.name.to_ascii_lowercase(), param.value_as_text());
    }

    let mut headers = HeaderMap::with_capacity(merged.len() + 1);
    for (name, value) in merged {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::Encode(format!("invalid header name {name:?}")))?;
        let header_value = HeaderValue::from_str(&value)
            .map_err(|_| TransportError::Encode(format!("invalid value for header {name:?}")))?;
        headers.insert(header_name, header_value);
    }
    if !headers.contains_key(USER_AGENT) {
        let agent = HeaderValue::from_str(config.user_agent())
            .map_err(|_| TransportError::Encode("invalid user agent".to_string()))?;
        headers.insert(USER_AGENT, agent);
    }
    Ok(headers)
}

/// Maps a `reqwest` failure onto the transport error taxonomy.
pub fn map_send_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() {
        TransportError::Encode(err.to_string())
    } else {
        TransportError::Io(err.to_string())
    }
}

/// Reads a response in full. Headers with non-text values are dropped.
///
/// # Errors
///
/// Returns a [`TransportError`] if the body cannot be read.
pub async fn read_response(response: reqwest::Response) -> Result<RawResponse, TransportError> {
    let status = i32::from(response.status().as_u16());
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();
    let body = response.bytes().await.map_err(|e| map_send_error(&e))?;

    let mut raw = RawResponse::new(status, body);
    for (name, value) in headers {
        raw = raw.with_header(name, value);
    }
    Ok(raw)
}
