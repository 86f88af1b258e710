use std::time::Duration;

use async_trait::async_trait;
use chat_core::{Config, Message, Session};
use log::info;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Proxy};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::api::models::{
    ChatRequest, ChatResponse, CreateSessionRequest, MessagesEnvelope, ModelCatalog,
    SessionsEnvelope, UpdateMessageRequest,
};
use crate::backend::ChatBackend;
use crate::error::{ApiError, Result};
use crate::utils::http_utils::{decode_json, read_body, request_id, transport_error, REQUEST_ID_HEADER};

/// `ChatBackend` over the REST API.
///
/// Idempotent reads go through the retry middleware. Writes use a client
/// without it: a send must never be replayed behind the caller's back.
#[derive(Clone)]
pub struct HttpChatBackend {
    retry_client: ClientWithMiddleware,
    plain_client: ClientWithMiddleware,
    base_url: String,
    api_key: Option<String>,
}

impl HttpChatBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Self::build_http_client(config)?;
        Ok(Self {
            retry_client: Self::build_retry_client(client.clone(), config.max_retries),
            plain_client: ClientBuilder::new(client).build(),
            base_url: config.api_url(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_http_client(config: &Config) -> Result<Client> {
        let mut builder = Client::builder()
            .default_headers(Self::get_default_headers())
            .timeout(Duration::from_secs(config.timeout_secs.max(1)));
        if !config.http_proxy.is_empty() {
            let proxy = Proxy::http(&config.http_proxy)
                .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", config.http_proxy)))?;
            builder = builder.proxy(proxy);
        }
        if !config.https_proxy.is_empty() {
            let proxy = Proxy::https(&config.https_proxy)
                .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", config.https_proxy)))?;
            builder = builder.proxy(proxy);
        }
        builder.build().map_err(|e| ApiError::Transport {
            url: config.api_url(),
            message: format!("Failed to build HTTP client: {e}"),
        })
    }

    fn build_retry_client(client: Client, max_retries: u32) -> ClientWithMiddleware {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(200), Duration::from_secs(5))
            .build_with_max_retries(max_retries);

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut header = HeaderMap::new();
        header.insert(ACCEPT, HeaderValue::from_static("application/json"));
        header.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        header
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&request_id()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        if let Some(key) = &self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<Session> {
        let url = self.url("/sessions");
        info!("Creating session {:?}", request.title);
        let response = self
            .plain_client
            .post(&url)
            .headers(self.request_headers())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let session: Session = decode_json(&url, response).await?;
        if session.id.is_empty() {
            return Err(ApiError::Decode {
                url,
                message: "response carries neither id nor session_id".to_string(),
            });
        }
        Ok(session)
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let url = self.url("/sessions");
        let response = self
            .retry_client
            .get(&url)
            .headers(self.request_headers())
            .query(&[("user_id", user_id)])
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let envelope: SessionsEnvelope = decode_json(&url, response).await?;
        Ok(envelope.sessions)
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let url = self.url(&format!("/sessions/{}/messages", session_id));
        let response = self
            .retry_client
            .get(&url)
            .headers(self.request_headers())
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let envelope: MessagesEnvelope = decode_json(&url, response).await?;
        info!(
            "Fetched {} messages for session {}",
            envelope.messages.len(),
            session_id
        );
        Ok(envelope.messages)
    }

    async fn send_chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = self.url("/chat");
        info!(
            "Sending chat message ({} chars, model {}) to session {}",
            request.message.len(),
            request.model,
            request.session_id
        );
        let response = self
            .plain_client
            .post(&url)
            .headers(self.request_headers())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        decode_json(&url, response).await
    }

    async fn list_models(&self) -> Result<ModelCatalog> {
        let url = self.url("/config/models");
        let response = self
            .retry_client
            .get(&url)
            .headers(self.request_headers())
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let catalog: ModelCatalog = decode_json(&url, response).await?;
        info!("Fetched {} models", catalog.models.len());
        Ok(catalog)
    }

    async fn update_message(&self, message_id: &str, content: &str) -> Result<()> {
        let url = self.url(&format!("/messages/{}", message_id));
        let response = self
            .plain_client
            .put(&url)
            .headers(self.request_headers())
            .json(&UpdateMessageRequest { content })
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        read_body(&url, response).await.map(|_| ())
    }
}
