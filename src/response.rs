use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::EmbedError;

/// Result of one embedding request, tagged with the originating id.
///
/// Exactly one of `result` / `error` is set: a failure response carries the
/// strategy's error text and no vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    request_id: Uuid,
    result: Option<Vec<f32>>,
    error: Option<String>,
}

impl EmbedResponse {
    pub fn new(request_id: Uuid, result: Option<Vec<f32>>, error: Option<String>) -> Self {
        Self {
            request_id,
            result,
            error,
        }
    }

    pub fn from_result(request_id: Uuid, result: Result<Vec<f32>, String>) -> Self {
        match result {
            Ok(vector) => Self::new(request_id, Some(vector), None),
            Err(message) => Self::new(request_id, None, Some(message)),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn result(&self) -> Option<&Vec<f32>> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&String> {
        self.error.as_ref()
    }

    /// Converts the response into the caller-facing outcome.
    pub fn into_result(self) -> Result<Vec<f32>, EmbedError> {
        match (self.result, self.error) {
            (Some(vector), _) => Ok(vector),
            (None, Some(message)) => Err(EmbedError::WorkerFailure(message)),
            (None, None) => Err(EmbedError::WorkerFailure(
                "worker returned no result".to_string(),
            )),
        }
    }

    /// Encodes the response into a transport frame.
    pub fn to_frame(&self) -> Result<Bytes, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self).map(Bytes::from)
    }

    /// Decodes a transport frame back into a response.
    pub fn from_frame(frame: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_result_success_carries_the_vector() {
        let id = Uuid::new_v4();
        let response = EmbedResponse::from_result(id, Ok(vec![1.0, 2.0]));

        assert_eq!(response.request_id(), id);
        assert_eq!(response.result(), Some(&vec![1.0, 2.0]));
        assert!(response.error().is_none());
        assert_eq!(response.into_result(), Ok(vec![1.0, 2.0]));
    }

    #[test]
    fn from_result_failure_becomes_worker_failure() {
        let id = Uuid::new_v4();
        let response = EmbedResponse::from_result(id, Err("model exploded".to_string()));

        assert!(response.result().is_none());
        assert_eq!(
            response.into_result(),
            Err(EmbedError::WorkerFailure("model exploded".to_string()))
        );
    }

    #[test]
    fn empty_response_is_a_worker_failure() {
        let response = EmbedResponse::new(Uuid::new_v4(), None, None);
        assert!(matches!(
            response.into_result(),
            Err(EmbedError::WorkerFailure(_))
        ));
    }

    #[test]
    fn frame_round_trip() {
        let id = Uuid::new_v4();
        let frame = EmbedResponse::from_result(id, Ok(vec![0.5]))
            .to_frame()
            .unwrap();
        let decoded = EmbedResponse::from_frame(&frame).unwrap();

        assert_eq!(decoded.request_id(), id);
        assert_eq!(decoded.result(), Some(&vec![0.5]));
    }

    #[test]
    fn malformed_frame_fails_to_decode() {
        assert!(EmbedResponse::from_frame(&[0xc1, 0xff, 0x00]).is_err());
    }
}
