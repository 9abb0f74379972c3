//! Request message encoding.

use bytes::Bytes;
use pipeline::{OperationDescriptor, Placement, TransportError};
use serde_json::{Map, Value};

/// Encodes a descriptor's parameters into one request message.
///
/// Implement this over generated message types to speak protobuf; the
/// default [`JsonMarshaller`] suits services registered with a JSON codec.
pub trait Marshaller: Send + Sync {
    /// Encodes the request message for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Encode`] when the parameters cannot be
    /// encoded.
    fn marshal(&self, descriptor: &OperationDescriptor) -> Result<Bytes, TransportError>;
}

/// Encodes every non-header parameter as a field of one JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaller;

impl Marshaller for JsonMarshaller {
    fn marshal(&self, descriptor: &OperationDescriptor) -> Result<Bytes, TransportError> {
        let message: Map<String, Value> = descriptor
            .parameters()
            .iter()
            .filter(|p| p.placement != Placement::Header)
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        serde_json::to_vec(&message)
            .map(Bytes::from)
            .map_err(|e| TransportError::Encode(e.to_string()))
    }
}

impl<F> Marshaller for F
where
    F: Fn(&OperationDescriptor) -> Result<Bytes, TransportError> + Send + Sync,
{
    fn marshal(&self, descriptor: &OperationDescriptor) -> Result<Bytes, TransportError> {
        self(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{OperationName, Protocol};
    use serde_json::json;

    #[test]
    fn json_marshaller_skips_headers() {
        let d = OperationDescriptor::builder(OperationName::new("GetPet").unwrap(), Protocol::Grpc, "pets.v1.Pets/GetPet")
            .body("id", 4)
            .query("view", "FULL")
            .header("x-tenant", "acme")
            .build();
        let bytes = JsonMarshaller.marshal(&d).unwrap();
        let decoded: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, json!({"id": 4, "view": "FULL"}));
    }

    #[test]
    fn closures_are_marshallers() {
        let fixed = |_: &OperationDescriptor| -> Result<Bytes, TransportError> { Ok(Bytes::from_static(b"\x08\x01")) };
        let d = OperationDescriptor::builder(OperationName::new("GetPet").unwrap(), Protocol::Grpc, "pets.v1.Pets/GetPet")
            .build();
        assert_eq!(fixed.marshal(&d).unwrap(), Bytes::from_static(b"\x08\x01"));
    }
}
