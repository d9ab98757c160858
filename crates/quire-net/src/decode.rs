//! Response decoders behind the session's typed task entry points.
//!
//! These run after the status gate and never look at anything but the
//! status code and body.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::response::Response;

/// Outcome of a dual-typed decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T, E> {
    /// The response was a 200 carrying the success payload.
    Success(T),
    /// The server answered with a well-formed error payload.
    ErrorPayload(E),
}

impl<T, E> Decoded<T, E> {
    /// The success value, if any.
    pub fn result(&self) -> Option<&T> {
        match self {
            Decoded::Success(v) => Some(v),
            Decoded::ErrorPayload(_) => None,
        }
    }

    /// The error payload, if any.
    pub fn error_result(&self) -> Option<&E> {
        match self {
            Decoded::Success(_) => None,
            Decoded::ErrorPayload(e) => Some(e),
        }
    }

    /// Split into `(result, error_result)`.
    pub fn into_parts(self) -> (Option<T>, Option<E>) {
        match self {
            Decoded::Success(v) => (Some(v), None),
            Decoded::ErrorPayload(e) => (None, Some(e)),
        }
    }
}

/// Decode a body as a JSON object.
///
/// Empty bodies, invalid JSON and non-object JSON all mean "no result".
pub fn decode_json_object(body: &[u8]) -> Option<Map<String, Value>> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Decode a typed value from a 200 response.
///
/// Any other status yields `Ok(None)`; a 200 whose body does not match `T`
/// yields the decode error.
pub fn decode_decodable<T: DeserializeOwned>(response: &Response) -> Result<Option<T>> {
    if response.status != 200 {
        return Ok(None);
    }
    serde_json::from_slice(&response.body)
        .map(Some)
        .map_err(Error::from)
}

/// Decode either the success type `T` or the error type `E`.
///
/// A 200 is tried as `T` first. A non-200, or a 200 that is not a `T`, is
/// tried as `E`. When neither matches, the error from the first attempted
/// decode is returned.
pub fn decode_codable<T, E>(response: &Response) -> Result<Decoded<T, E>>
where
    T: DeserializeOwned,
    E: DeserializeOwned,
{
    let success_error = if response.status == 200 {
        match serde_json::from_slice::<T>(&response.body) {
            Ok(value) => return Ok(Decoded::Success(value)),
            Err(e) => Some(e),
        }
    } else {
        None
    };

    match serde_json::from_slice::<E>(&response.body) {
        Ok(error) => Ok(Decoded::ErrorPayload(error)),
        Err(e) => Err(Error::Decode(success_error.unwrap_or(e))),
    }
}

/// The `error.code` field of a wiki action API error body, if present.
pub fn api_error_code(body: &[u8]) -> Option<String> {
    let object = decode_json_object(body)?;
    object
        .get("error")?
        .get("code")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Summary {
        title: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct ApiError {
        code: String,
    }

    #[test]
    fn test_json_object_rejects_non_objects() {
        assert!(decode_json_object(b"").is_none());
        assert!(decode_json_object(b"[1,2]").is_none());
        assert!(decode_json_object(b"\"text\"").is_none());
        assert!(decode_json_object(b"{not json").is_none());
        let map = decode_json_object(br#"{"batchcomplete":true}"#).unwrap();
        assert_eq!(map["batchcomplete"], Value::Bool(true));
    }

    #[test]
    fn test_decodable_requires_200() {
        let ok = Response::new(200, r#"{"title":"Rust"}"#);
        assert_eq!(
            decode_decodable::<Summary>(&ok).unwrap(),
            Some(Summary {
                title: "Rust".to_string()
            })
        );

        let not_found = Response::new(404, r#"{"title":"Rust"}"#);
        assert_eq!(decode_decodable::<Summary>(&not_found).unwrap(), None);

        let garbage = Response::new(200, "<html>");
        assert!(decode_decodable::<Summary>(&garbage).unwrap_err().is_decode());
    }

    #[test]
    fn test_codable_success() {
        let response = Response::new(200, r#"{"title":"Rust"}"#);
        let decoded = decode_codable::<Summary, ApiError>(&response).unwrap();
        assert_eq!(
            decoded.into_parts(),
            (
                Some(Summary {
                    title: "Rust".to_string()
                }),
                None
            )
        );
    }

    #[test]
    fn test_codable_error_payload_on_404() {
        let response = Response::new(404, r#"{"code":"missingtitle"}"#);
        let decoded = decode_codable::<Summary, ApiError>(&response).unwrap();
        assert_eq!(
            decoded.error_result(),
            Some(&ApiError {
                code: "missingtitle".to_string()
            })
        );
        assert!(decoded.result().is_none());
    }

    #[test]
    fn test_codable_error_payload_on_200() {
        let response = Response::new(200, r#"{"code":"badtoken"}"#);
        let decoded = decode_codable::<Summary, ApiError>(&response).unwrap();
        assert!(matches!(decoded, Decoded::ErrorPayload(_)));
    }

    #[test]
    fn test_codable_neither_matches() {
        let response = Response::new(200, r#"{"unexpected":1}"#);
        let err = decode_codable::<Summary, ApiError>(&response).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_api_error_code() {
        assert_eq!(
            api_error_code(br#"{"error":{"code":"badtoken","info":"Invalid CSRF token."}}"#),
            Some("badtoken".to_string())
        );
        assert_eq!(api_error_code(br#"{"edit":{"result":"Success"}}"#), None);
        assert_eq!(api_error_code(b""), None);
    }
}
