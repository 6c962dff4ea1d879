use std::time::SystemTime;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of embedding work.
///
/// The id is generated at submission time and is the sole correlation key
/// between the client leg and the worker leg. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    id: Uuid,
    payload: String,
    created_at: SystemTime,
}

impl EmbedRequest {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: payload.into(),
            created_at: SystemTime::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Encodes the request into a transport frame.
    pub fn to_frame(&self) -> Result<Bytes, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self).map(Bytes::from)
    }

    /// Decodes a transport frame back into a request.
    pub fn from_frame(frame: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip_preserves_id_and_payload() {
        let request = EmbedRequest::new("the payload");
        let frame = request.to_frame().unwrap();
        let decoded = EmbedRequest::from_frame(&frame).unwrap();

        assert_eq!(decoded.id(), request.id());
        assert_eq!(decoded.payload(), "the payload");
    }

    #[test]
    fn each_request_gets_a_fresh_id() {
        let a = EmbedRequest::new("same text");
        let b = EmbedRequest::new("same text");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn garbage_frame_fails_to_decode() {
        assert!(EmbedRequest::from_frame(b"not msgpack at all").is_err());
    }
}
