use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::logger::{with_logger, SharedLogger};
use crate::protocol::{
    LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, PATH_LOGIN, PATH_REFRESH_TOKEN,
};
use crate::types::Credentials;

#[derive(Debug, Default)]
struct AuthState {
    authenticated: bool,
    refresh_token: Option<String>,
    access_token: Option<String>,
}

/// Holds the credential pair and the token pair for one integration
/// instance. Login and refresh are serialized through the state mutex, so
/// concurrent callers observe the outcome of whichever call ran first.
///
/// Failures are reported as `false` and logged; they never escape as errors.
pub(crate) struct AuthManager {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    state: Mutex<AuthState>,
    logger: Option<SharedLogger>,
}

impl AuthManager {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        credentials: Credentials,
        logger: Option<SharedLogger>,
    ) -> Self {
        Self {
            http,
            base_url,
            credentials,
            state: Mutex::new(AuthState::default()),
            logger,
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.authenticated
    }

    pub async fn login(&self) -> bool {
        let mut state = self.state.lock().await;
        self.login_locked(&mut state).await
    }

    /// Replace the access token using the stored refresh token, logging in
    /// first when no session exists yet.
    pub async fn refresh_token(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    /// Refresh after `rejected` was answered with 401. When another caller
    /// already swapped the token in the meantime, the new one is kept as is.
    pub async fn refresh_rejected(&self, rejected: Option<&str>) -> bool {
        let mut state = self.state.lock().await;
        if state.authenticated && state.access_token.is_some() && state.access_token.as_deref() != rejected {
            debug!("access token already refreshed by a concurrent request");
            return true;
        }
        self.refresh_locked(&mut state).await
    }

    /// Current access token, logging in first if not authenticated.
    pub async fn access_token(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        if !state.authenticated {
            self.login_locked(&mut state).await;
        }
        state.access_token.clone()
    }

    async fn login_locked(&self, state: &mut AuthState) -> bool {
        info!(email = %self.credentials.email, "logging in to Daikin API");
        with_logger(&self.logger, |l| l.log_request("POST", PATH_LOGIN, None));

        let body = LoginRequest {
            email: &self.credentials.email,
            password: &self.credentials.password,
        };
        let resp = match self
            .http
            .post(format!("{}{}", self.base_url, PATH_LOGIN))
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!("login request failed: {e}");
                state.authenticated = false;
                return false;
            }
        };

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            error!(status = status.as_u16(), "login rejected");
            state.authenticated = false;
            return false;
        }

        let payload: LoginResponse = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                error!("malformed login response: {e}");
                state.authenticated = false;
                return false;
            }
        };

        let (Some(access), Some(refresh)) = (payload.access_token, payload.refresh_token) else {
            error!("login response is missing a token");
            state.authenticated = false;
            return false;
        };

        state.access_token = Some(access);
        state.refresh_token = Some(refresh);
        state.authenticated = true;
        debug!("login succeeded");
        true
    }

    async fn refresh_locked(&self, state: &mut AuthState) -> bool {
        debug!("refreshing access token");
        if !state.authenticated && !self.login_locked(state).await {
            return false;
        }

        let Some(refresh_token) = state.refresh_token.clone() else {
            error!("no refresh token held");
            state.authenticated = false;
            return false;
        };

        with_logger(&self.logger, |l| l.log_request("POST", PATH_REFRESH_TOKEN, None));

        let body = RefreshRequest {
            email: &self.credentials.email,
            refresh_token: &refresh_token,
        };
        let resp = match self
            .http
            .post(format!("{}{}", self.base_url, PATH_REFRESH_TOKEN))
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!("token refresh request failed: {e}");
                state.authenticated = false;
                return false;
            }
        };

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            error!(status = status.as_u16(), "token refresh rejected");
            state.authenticated = false;
            return false;
        }

        match resp.json::<RefreshResponse>().await {
            Ok(RefreshResponse {
                access_token: Some(access),
            }) => {
                state.access_token = Some(access);
                state.authenticated = true;
                true
            }
            Ok(_) => {
                error!("refresh response is missing an access token");
                state.authenticated = false;
                false
            }
            Err(e) => {
                error!("malformed refresh response: {e}");
                state.authenticated = false;
                false
            }
        }
    }
}
