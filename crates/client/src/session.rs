use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::HttpTransport;
use crate::transport::{ApiRequest, HttpMethod, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared handle for issuing JSON requests through a transport.
#[derive(Clone)]
pub struct ApiSession {
    transport: Arc<dyn Transport>,
}

impl ApiSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        info!("api session using {} transport", transport.name());
        Self { transport }
    }

    /// Session talking to the live API described by `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::new(HttpMethod::Get, path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(HttpMethod::Post, path).with_body(serde_json::to_value(body)?);
        self.send(request).await
    }

    /// PUT with a JSON body; any response body is discarded.
    pub async fn put<B>(&self, path: &str, body: &B) -> Result<(), ApiError>
    where
        B: Serialize + ?Sized,
    {
        let request = ApiRequest::new(HttpMethod::Put, path).with_body(serde_json::to_value(body)?);
        self.send::<Value>(request).await.map(|_| ())
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send::<Value>(ApiRequest::new(HttpMethod::Delete, path))
            .await
            .map(|_| ())
    }

    async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        debug!("{} {}", request.method, request.path);

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, response.body.as_ref()));
        }

        serde_json::from_value(response.body.unwrap_or(Value::Null))
            .map_err(|e| ApiError::Decode(format!("Unexpected response shape: {}", e)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::transport::ApiResponse;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;

    struct StaticTransport {
        response: ApiResponse,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl StaticTransport {
        fn new(status: u16, body: Option<Value>) -> Arc<Self> {
            Arc::new(Self {
                response: ApiResponse::new(status, body),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for StaticTransport {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
            self.seen.lock().push(request);
            Ok(self.response.clone())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    #[derive(Debug, Deserialize)]
    struct Thing {
        id: String,
    }

    #[tokio::test]
    async fn test_get_decodes_body() {
        let transport = StaticTransport::new(200, Some(json!({"id": "abc", "extra": 1})));
        let session = ApiSession::new(transport.clone());

        let thing: Thing = session.get("/things/abc").await.unwrap();
        assert_eq!(thing.id, "abc");
        assert_eq!(session.transport_name(), "static");

        let seen = transport.seen.lock();
        assert_eq!(seen[0].method, HttpMethod::Get);
        assert_eq!(seen[0].path, "/things/abc");
        assert!(seen[0].body.is_none());
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let transport = StaticTransport::new(201, Some(json!({"id": "new"})));
        let session = ApiSession::new(transport.clone());

        let thing: Thing = session.post("/things", &json!({"name": "x"})).await.unwrap();
        assert_eq!(thing.id, "new");
        assert_eq!(transport.seen.lock()[0].body, Some(json!({"name": "x"})));
    }

    #[tokio::test]
    async fn test_put_and_delete_ignore_body() {
        let session = ApiSession::new(StaticTransport::new(204, None));
        session.put("/things/1", &json!({"name": "y"})).await.unwrap();
        session.delete("/things/1").await.unwrap();

        let session = ApiSession::new(StaticTransport::new(200, Some(json!({"ok": true}))));
        session.put("/things/1", &json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_typed() {
        let session = ApiSession::new(StaticTransport::new(
            403,
            Some(json!({"error": "Insufficient privileges"})),
        ));
        match session.get::<Value>("/things").await {
            Err(ApiError::Forbidden(msg)) => assert_eq!(msg, "Insufficient privileges"),
            other => panic!("Expected Forbidden, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_decode_error() {
        let session = ApiSession::new(StaticTransport::new(200, Some(json!([1, 2, 3]))));
        assert!(matches!(
            session.get::<Thing>("/things/1").await,
            Err(ApiError::Decode(_))
        ));
    }
}
