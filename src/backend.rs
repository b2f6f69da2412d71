use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;

use crate::error::{ForgeError, Result};
use crate::session::ConversationTurn;

/// Raw response body, chunked however the transport delivers it.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Request body understood by the chat endpoint.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ConversationTurn>,
    pub files_context: String,
    pub current_file: String,
}

/// Anything that can turn a chat request into an SSE byte stream.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream>;
}

/// Streams completions from an HTTP endpoint.
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ModelBackend for HttpBackend {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Accept", "text/event-stream")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            tracing::warn!(
                status = response.status().as_u16(),
                endpoint = %self.endpoint,
                "chat endpoint rejected request"
            );
            return Err(ForgeError::Status(response.status().as_u16()));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ForgeError::from));
        Ok(stream.boxed())
    }
}
