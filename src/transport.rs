use reqwest::{header, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::auth::AuthManager;
use crate::logger::{with_logger, SharedLogger};
use crate::protocol::PATH_DEVICE_DATA;
use crate::{Error, Result};

/// Authenticated JSON requests against the Daikin API.
///
/// A 401 triggers one token refresh and one retry. Anything else that is not
/// a 200, including a second 401, becomes `Error::Service`.
pub(crate) struct Transport {
    http: reqwest::Client,
    base_url: String,
    auth: AuthManager,
    logger: Option<SharedLogger>,
}

impl Transport {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        auth: AuthManager,
        logger: Option<SharedLogger>,
    ) -> Self {
        Self {
            http,
            base_url,
            auth,
            logger,
        }
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn logger(&self) -> &Option<SharedLogger> {
        &self.logger
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut retry = true;

        loop {
            let token = self.auth.access_token().await;

            debug!(method = %method, path, "sending request to Daikin API");
            with_logger(&self.logger, |l| l.log_request(method.as_str(), path, body));

            let mut req = self.http.request(method.clone(), &url);
            if let Some(ref t) = token {
                req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
            }
            if let Some(b) = body {
                req = req.json(b);
            }

            let resp = req.send().await?;
            let status = resp.status();

            if status == StatusCode::OK {
                let text = resp.text().await?;
                let payload = if text.trim().is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&text).map_err(|e| Error::decode(path, e.to_string()))?
                };
                if method == Method::GET && path.starts_with(PATH_DEVICE_DATA) {
                    with_logger(&self.logger, |l| l.log_poll(path, status.as_u16(), &payload));
                }
                trace!(path, "request succeeded");
                return Ok(payload);
            }

            if status == StatusCode::UNAUTHORIZED && retry {
                debug!(path, "access token rejected, refreshing and retrying once");
                retry = false;
                if !self.auth.refresh_rejected(token.as_deref()).await {
                    warn!("token refresh failed, retrying with current credentials");
                }
                continue;
            }

            let body = resp.text().await.unwrap_or_default();
            warn!(method = %method, path, status = status.as_u16(), "request to Daikin API failed");
            return Err(Error::Service {
                status: status.as_u16(),
                body,
            });
        }
    }
}
