//! Body extractors.
//!
//! A [`BodyExtractor`] turns the body of a [`RequestView`] into a typed value.
//! Extractors take the body (so it can be consumed only once), collect it up
//! to the view's size limit, and report codec failures as
//! [`BodyError::Decode`] so the handler can decide how to respond.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::Bytes;
use fnroute_core::{BodyError, DecodeError};
use serde::de::DeserializeOwned;

use crate::querydict::QueryDict;
use crate::request::RequestView;

/// Decodes a request body into `T`.
///
/// Implement this for codecs the crate does not ship. The built-in extractors
/// cover raw bytes, UTF-8 text, JSON and url-encoded forms.
#[async_trait]
pub trait BodyExtractor<T>: Send + Sync {
    /// Consumes the body of `request` and decodes it.
    async fn extract(&self, request: &RequestView) -> Result<T, BodyError>;
}

async fn collect(request: &RequestView) -> Result<Bytes, BodyError> {
    request
        .take_body()?
        .collect_bytes(request.body_limit())
        .await
}

/// Collects the raw body.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesExtractor;

#[async_trait]
impl BodyExtractor<Bytes> for BytesExtractor {
    async fn extract(&self, request: &RequestView) -> Result<Bytes, BodyError> {
        collect(request).await
    }
}

/// Collects the body as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

#[async_trait]
impl BodyExtractor<String> for TextExtractor {
    async fn extract(&self, request: &RequestView) -> Result<String, BodyError> {
        let bytes = collect(request).await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| DecodeError::new("text/plain", e.to_string()).into())
    }
}

/// Decodes a JSON body with serde.
pub struct JsonExtractor<T>(PhantomData<fn() -> T>);

impl<T> JsonExtractor<T> {
    /// Creates a JSON extractor for `T`.
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonExtractor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonExtractor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonExtractor<{}>", std::any::type_name::<T>())
    }
}

#[async_trait]
impl<T> BodyExtractor<T> for JsonExtractor<T>
where
    T: DeserializeOwned + Send,
{
    async fn extract(&self, request: &RequestView) -> Result<T, BodyError> {
        let bytes = collect(request).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DecodeError::new(mime::APPLICATION_JSON.as_ref(), e.to_string()).into())
    }
}

/// Decodes an `application/x-www-form-urlencoded` body.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormExtractor;

#[async_trait]
impl BodyExtractor<QueryDict> for FormExtractor {
    async fn extract(&self, request: &RequestView) -> Result<QueryDict, BodyError> {
        let bytes = collect(request).await?;
        let text = std::str::from_utf8(&bytes).map_err(|e| {
            DecodeError::new(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref(), e.to_string())
        })?;
        Ok(QueryDict::parse(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    use crate::body::BodyStream;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: u32,
    }

    #[tokio::test]
    async fn test_json_extractor() {
        let request = RequestView::builder()
            .body(r#"{"name":"Ada","age":36}"#)
            .build();
        let person: Person = request.body(&JsonExtractor::new()).await.unwrap();
        assert_eq!(
            person,
            Person {
                name: "Ada".into(),
                age: 36
            }
        );
    }

    #[tokio::test]
    async fn test_json_decode_failure_is_typed() {
        let request = RequestView::builder().body(r#"{"name":"Ada"}"#).build();
        match request.json::<Person>().await {
            Err(BodyError::Decode(err)) => assert_eq!(err.media_type, "application/json"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_rejects_invalid_utf8() {
        let request = RequestView::builder().body(vec![0xff_u8, 0xfe]).build();
        let err = request.text().await.unwrap_err();
        assert!(matches!(err, BodyError::Decode(_)));
    }

    #[tokio::test]
    async fn test_form_extractor() {
        let request = RequestView::builder().body("name=Ada+Lovelace&tag=a&tag=b").build();
        let form = request.form().await.unwrap();
        assert_eq!(form.get("name"), Some("Ada Lovelace"));
        assert_eq!(form.get_list("tag").map(<[String]>::len), Some(2));
    }

    #[tokio::test]
    async fn test_limit_applies_to_extractors() {
        let request = RequestView::builder().body("0123456789").body_limit(3).build();
        assert_eq!(
            request.bytes().await.unwrap_err(),
            BodyError::LimitExceeded { limit: 3 }
        );
    }

    #[tokio::test]
    async fn test_stream_error_reaches_extractor() {
        let request = RequestView::builder()
            .body_stream(BodyStream::failed(BodyError::Stream("reset".into())))
            .build();
        assert_eq!(
            request.bytes().await.unwrap_err(),
            BodyError::Stream("reset".into())
        );
    }

    struct Upper;

    #[async_trait]
    impl BodyExtractor<String> for Upper {
        async fn extract(&self, request: &RequestView) -> Result<String, BodyError> {
            Ok(request.text().await?.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_custom_extractor() {
        let request = RequestView::builder().body("shout").build();
        assert_eq!(request.body(&Upper).await.unwrap(), "SHOUT");
    }
}
