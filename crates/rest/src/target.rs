//! REST target parsing and URL construction.
//!
//! A REST target reads `"<VERB> <path template>"`. The verb is optional and
//! defaults to `GET`; placeholders in the template are written `{name}` and
//! filled from the descriptor's path parameters.

use pipeline::{OperationDescriptor, Placement, TransportError};
use reqwest::{Method, Url};

/// A parsed REST target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestTarget<'a> {
    pub method: Method,
    pub path_template: &'a str,
}

/// Splits `target` into verb and path template.
///
/// # Errors
///
/// Returns [`TransportError::Encode`] for an unknown verb or an empty path.
pub fn parse_target(target: &str) -> Result<RestTarget<'_>, TransportError> {
    let target = target.trim();
    let (verb, path) = match target.split_once(char::is_whitespace) {
        Some((verb, path)) => (verb, path.trim()),
        None if target.starts_with('/') => ("GET", target),
        None => return Err(TransportError::Encode(format!("REST target {target:?} has no path"))),
    };
    if path.is_empty() {
        return Err(TransportError::Encode(format!("REST target {target:?} has no path")));
    }
    let method = Method::from_bytes(verb.to_ascii_uppercase().as_bytes())
        .map_err(|_| TransportError::Encode(format!("invalid HTTP verb {verb:?}")))?;
    Ok(RestTarget { method, path_template: path })
}

/// Joins `base_endpoint` with `path_template`, substituting every `{name}`
/// placeholder with the matching path parameter.
///
/// Substituted values are percent-encoded as single path segments, so a
/// value containing `/` cannot change the path's shape.
///
/// # Errors
///
/// Returns [`TransportError::Encode`] if the endpoint is not a base URL, a
/// placeholder is unterminated, or a placeholder has no parameter.
pub fn build_url(
    base_endpoint: &str,
    path_template: &str,
    descriptor: &OperationDescriptor,
) -> Result<Url, TransportError> {
    let mut url = Url::parse(base_endpoint)
        .map_err(|e| TransportError::Encode(format!("invalid base endpoint {base_endpoint:?}: {e}")))?;

    let segments = path_template
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| substitute(segment, descriptor))
        .collect::<Result<Vec<_>, _>>()?;

    url.path_segments_mut()
        .map_err(|()| TransportError::Encode(format!("base endpoint {base_endpoint:?} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments.iter().map(String::as_str));

    let mut pairs = Vec::new();
    for param in descriptor.parameters_in(Placement::Query) {
        match &param.value {
            serde_json::Value::Array(items) => {
                for item in items {
                    let text = match item {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    pairs.push((param.name.clone(), text));
                }
            }
            serde_json::Value::Null => {}
            _ => pairs.push((param.name.clone(), param.value_as_text())),
        }
    }
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(url)
}

fn substitute(segment: &str, descriptor: &OperationDescriptor) -> Result<String, TransportError> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| TransportError::Encode(format!("unterminated placeholder in {segment:?}")))?;
        let name = &after[..close];
        let param = descriptor
            .parameters_in(Placement::Path)
            .find(|p| p.name == name)
            .ok_or_else(|| TransportError::Encode(format!("missing path parameter {name:?}")))?;
        out.push_str(&param.value_as_text());
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
