use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use super::endpoints::Endpoints;
use super::errors::ApiError;
use crate::core::config::ApiSettings;
use crate::schemas::payload::SubmitPayload;

/// The exam endpoints a session consumes. Every call resolves to data or an [`ApiError`].
#[async_trait]
pub trait ExamBackend: Send + Sync {
    async fn fetch_exam(&self, exam_id: &str) -> Result<Value, ApiError>;

    async fn resume_attempt(&self, exam_id: &str) -> Result<Value, ApiError>;

    async fn create_attempt(&self, exam_id: &str) -> Result<Value, ApiError>;

    async fn save_answers(&self, exam_id: &str, payload: &SubmitPayload)
        -> Result<Value, ApiError>;

    async fn submit_answers(
        &self,
        exam_id: &str,
        payload: &SubmitPayload,
    ) -> Result<Value, ApiError>;
}

#[derive(Debug, Clone, Default)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

#[derive(Debug)]
pub struct HttpBackend {
    client: Client,
    endpoints: Endpoints,
    tokens: RwLock<Tokens>,
    refresh_lock: Mutex<()>,
}

impl HttpBackend {
    pub fn from_settings(settings: &ApiSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(settings.request_timeout())
            .build()
            .context("Failed to build TestVerse HTTP client")?;

        Ok(Self {
            client,
            endpoints: Endpoints::new(&settings.base_url),
            tokens: RwLock::new(Tokens {
                access: settings.access_token.clone(),
                refresh: settings.refresh_token.clone(),
            }),
            refresh_lock: Mutex::new(()),
        })
    }

    pub async fn access_token(&self) -> Option<String> {
        self.tokens.read().await.access.clone()
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let token = self.access_token().await;
        let response = self.send(method.clone(), path, body.as_ref(), token.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && self.refresh(token.as_deref()).await {
            let token = self.access_token().await;
            let retried = self.send(method, path, body.as_ref(), token.as_deref()).await?;
            return parse_response(retried).await;
        }

        parse_response(response).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut request = self.client.request(method, self.endpoints.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|err| ApiError::Network(err.to_string()))
    }

    /// Exchanges the refresh token for a new access token. Returns true when a retry is worthwhile.
    async fn refresh(&self, rejected: Option<&str>) -> bool {
        let _guard = self.refresh_lock.lock().await;

        let current = self.tokens.read().await.clone();
        if current.access.as_deref() != rejected {
            // Another request refreshed while this one waited on the lock.
            return true;
        }
        let Some(refresh) = current.refresh else {
            return false;
        };

        let response = match self
            .send(Method::POST, Endpoints::token_refresh(), Some(&json!({ "refresh": refresh })), None)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "Token refresh request failed");
                return false;
            }
        };

        match parse_response(response).await {
            Ok(data) => {
                let Some(access) = data.get("access").and_then(Value::as_str) else {
                    tracing::warn!("Token refresh response carried no access token");
                    return false;
                };
                let mut tokens = self.tokens.write().await;
                tokens.access = Some(access.to_string());
                if let Some(rotated) = data.get("refresh").and_then(Value::as_str) {
                    tokens.refresh = Some(rotated.to_string());
                }
                tracing::info!("Access token refreshed");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "Token refresh rejected");
                false
            }
        }
    }
}

#[async_trait]
impl ExamBackend for HttpBackend {
    async fn fetch_exam(&self, exam_id: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, &Endpoints::exam_detail(exam_id), None).await
    }

    async fn resume_attempt(&self, exam_id: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, &Endpoints::exam_attempt(exam_id), None).await
    }

    async fn create_attempt(&self, exam_id: &str) -> Result<Value, ApiError> {
        self.request(Method::POST, &Endpoints::exam_attempt(exam_id), Some(json!({}))).await
    }

    async fn save_answers(
        &self,
        exam_id: &str,
        payload: &SubmitPayload,
    ) -> Result<Value, ApiError> {
        let body = encode(payload)?;
        self.request(Method::POST, &Endpoints::exam_save(exam_id), Some(body)).await
    }

    async fn submit_answers(
        &self,
        exam_id: &str,
        payload: &SubmitPayload,
    ) -> Result<Value, ApiError> {
        let body = encode(payload)?;
        self.request(Method::POST, &Endpoints::exam_submit(exam_id), Some(body)).await
    }
}

fn encode(payload: &SubmitPayload) -> Result<Value, ApiError> {
    serde_json::to_value(payload).map_err(|err| ApiError::Decode(err.to_string()))
}

/// Empty bodies read as absent data; rejected statuses keep whatever JSON the server sent.
async fn parse_response(response: Response) -> Result<Value, ApiError> {
    let status = response.status();
    let raw = response.text().await.map_err(|err| ApiError::Network(err.to_string()))?;

    let data = if raw.trim().is_empty() {
        None
    } else {
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Some(value),
            Err(err) if status.is_success() => {
                return Err(ApiError::Decode(format!("non-JSON body (status {status}): {err}")));
            }
            Err(_) => None,
        }
    };

    if !status.is_success() {
        return Err(ApiError::Status { status: status.as_u16(), body: data });
    }

    Ok(data.unwrap_or(Value::Null))
}
