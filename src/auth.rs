//! GitHub OAuth login and session resolution.
//!
//! The OAuth web flow itself is handled by the `oauth2` crate; this module wires it to
//! the session store and exposes the `/auth/*` handlers.

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::session::Identity;
use crate::types::UserProfile;
use crate::AppState;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::url::Url;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SESSION_COOKIE: &str = "dashboard_session";

/// Access to private repositories is needed to read their pull requests and branches.
const OAUTH_SCOPE: &str = "repo";

pub struct GitHubOAuth {
    client: BasicClient,
}

impl GitHubOAuth {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let base = config.github_oauth_url.trim_end_matches('/');

        let client = BasicClient::new(
            ClientId::new(config.github_client_id.clone()),
            Some(ClientSecret::new(config.github_client_secret.clone())),
            AuthUrl::new(format!("{base}/login/oauth/authorize"))?,
            Some(TokenUrl::new(format!("{base}/login/oauth/access_token"))?),
        )
        .set_auth_type(AuthType::RequestBody)
        .set_redirect_uri(RedirectUrl::new(config.callback_url.clone())?);

        Ok(Self { client })
    }

    /// URL of the GitHub consent page together with the CSRF state embedded in it.
    pub fn authorize_url(&self) -> (Url, CsrfToken) {
        self.client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(OAUTH_SCOPE.to_string()))
            .url()
    }

    pub async fn exchange_code(&self, code: String) -> Result<String, ApiError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(async_http_client)
            .await
            .map_err(|e| ApiError::OAuth(e.to_string()))?;

        Ok(token.access_token().secret().clone())
    }
}

impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session_id = session_cookie(&parts.headers).ok_or(ApiError::Unauthenticated)?;

        state
            .sessions
            .get(&session_id)
            .await
            .ok_or(ApiError::Unauthenticated)
    }
}

/// Extracts the session id from the request's `Cookie` headers.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// The cookie is marked `Secure` whenever the OAuth callback is served over https.
fn session_set_cookie(session_id: &str, config: &AppConfig) -> String {
    let secure = if config.callback_url.starts_with("https://") {
        "; Secure"
    } else {
        ""
    };
    format!(
        "{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{secure}",
        config.session_ttl_seconds
    )
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub user: UserProfile,
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

pub async fn begin_login(State(state): State<Arc<AppState>>) -> Redirect {
    let (url, csrf) = state.oauth.authorize_url();
    state.sessions.remember_login_state(csrf.secret().clone()).await;
    Redirect::to(url.as_str())
}

pub async fn login_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let frontend = state.config.frontend_url.as_str();

    match complete_login(&state, params).await {
        Ok(session_id) => (
            [(SET_COOKIE, session_set_cookie(&session_id, &state.config))],
            Redirect::to(frontend),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("GitHub login failed: {}", e);
            Redirect::to(frontend).into_response()
        }
    }
}

/// Validates the callback, trades the code for a token and opens a session for the user.
async fn complete_login(state: &AppState, params: CallbackParams) -> Result<String, ApiError> {
    if let Some(error) = params.error {
        return Err(ApiError::OAuth(format!("authorization denied: {error}")));
    }

    let login_state = params
        .state
        .ok_or_else(|| ApiError::OAuth("missing state parameter".to_string()))?;
    if !state.sessions.take_login_state(&login_state).await {
        return Err(ApiError::OAuth("unknown or expired login state".to_string()));
    }

    let code = params
        .code
        .ok_or_else(|| ApiError::OAuth("missing code parameter".to_string()))?;
    let access_token = state.oauth.exchange_code(code).await?;

    let client = state.github.for_user(&access_token)?;
    let profile = client.current_user().await?;

    Ok(state
        .sessions
        .create(Identity {
            profile,
            access_token,
        })
        .await)
}

pub async fn current_user(identity: Identity) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        user: identity.profile,
        access_token: identity.access_token,
    })
}
