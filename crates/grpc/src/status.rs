//! Mapping between descriptors, tonic types and raw responses.

use std::error::Error as _;

use bytes::Bytes;
use http::uri::PathAndQuery;
use pipeline::{ClientConfig, OperationDescriptor, Placement, RawResponse, TransportError};
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::{Code, Status};

/// Resolves `"package.Service/Method"` (leading `/` optional) to the
/// HTTP/2 request path.
///
/// # Errors
///
/// Returns [`TransportError::Encode`] unless the target names both a
/// service and a method.
pub fn method_path(target: &str) -> Result<PathAndQuery, TransportError> {
    let trimmed = target.trim().trim_start_matches('/');
    let valid = trimmed
        .split_once('/')
        .is_some_and(|(service, method)| !service.is_empty() && !method.is_empty() && !method.contains('/'));
    if !valid {
        return Err(TransportError::Encode(format!(
            "gRPC target {target:?} is not of the form package.Service/Method"
        )));
    }
    PathAndQuery::try_from(format!("/{trimmed}"))
        .map_err(|e| TransportError::Encode(format!("invalid gRPC path {trimmed:?}: {e}")))
}

/// Request metadata: the client's default headers, then the descriptor's
/// `Header` parameters.
///
/// # Errors
///
/// Returns [`TransportError::Encode`] for a name or value that is not valid
/// ASCII metadata.
pub fn request_metadata(
    descriptor: &OperationDescriptor,
    config: &ClientConfig,
) -> Result<MetadataMap, TransportError> {
    let mut metadata = MetadataMap::new();
    let defaults = config.default_headers().iter().map(|(k, v)| (k.clone(), v.clone()));
    let params = descriptor
        .parameters_in(Placement::Header)
        .map(|p| (p.name.clone(), p.value_as_text()));
    for (name, value) in defaults.chain(params) {
        let key = MetadataKey::<Ascii>::from_bytes(name.to_ascii_lowercase().as_bytes())
            .map_err(|_| TransportError::Encode(format!("invalid metadata key {name:?}")))?;
        let value = MetadataValue::<Ascii>::try_from(value.as_str())
            .map_err(|_| TransportError::Encode(format!("invalid value for metadata key {name:?}")))?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}

/// Converts a successful response into a [`RawResponse`] with status `0`.
pub fn success_response(message: Bytes, metadata: &MetadataMap) -> RawResponse {
    metadata
        .clone()
        .into_headers()
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .fold(RawResponse::new(0, message), |raw, (name, value)| raw.with_header(name, value))
}

/// Converts a failed call into what the classifier expects.
///
/// A status produced by the server becomes a [`RawResponse`] carrying its
/// code. A status tonic produced locally, because the channel never got a
/// response, is a low-level transport error instead.
pub fn status_response(status: &Status) -> Result<RawResponse, TransportError> {
    if status.source().is_some() {
        return Err(match status.code() {
            Code::DeadlineExceeded | Code::Cancelled => TransportError::Timeout(status.message().to_string()),
            _ => TransportError::Connect(status.message().to_string()),
        });
    }
    Ok(RawResponse::new(i32::from(status.code()), Bytes::copy_from_slice(status.details()))
        .with_header("grpc-message", status.message()))
}
