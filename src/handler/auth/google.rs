use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::{
    entities::accounts::Provider,
    handler::{auth_error_response, auth_failed, error_response},
    service::claims::IdentityAssertion,
    state::AppState,
};

const GOOGLE_SCOPES: &str = "openid email profile";

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GoogleCallbackQuery {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

struct GoogleOAuthConfig {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    authorize_url: String,
    token_url: String,
    userinfo_url: String,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/auth/google", get(start_google_auth))
        .route("/api/v1/auth/google/callback", get(google_callback))
        .with_state(state)
}

fn google_config(state: &AppState) -> Result<GoogleOAuthConfig, Response> {
    let config = state.config().values();
    let missing = |name: &str| {
        tracing::error!("{} is not set", name);
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "provider_not_configured",
            "google sign-in is not configured",
        )
    };
    let Some(client_id) = &config.google_client_id else {
        return Err(missing("AUTH_GOOGLE_CLIENT_ID"));
    };
    let Some(client_secret) = &config.google_client_secret else {
        return Err(missing("AUTH_GOOGLE_CLIENT_SECRET"));
    };
    let Some(redirect_url) = &config.google_redirect_url else {
        return Err(missing("AUTH_GOOGLE_REDIRECT_URL"));
    };

    Ok(GoogleOAuthConfig {
        client_id: client_id.clone(),
        client_secret: client_secret.clone(),
        redirect_url: redirect_url.clone(),
        authorize_url: config.google_authorize_url.clone(),
        token_url: config.google_token_url.clone(),
        userinfo_url: config.google_userinfo_url.clone(),
    })
}

fn authorize_url(config: &GoogleOAuthConfig) -> String {
    let delimiter = if config.authorize_url.contains('?') {
        "&"
    } else {
        "?"
    };
    format!(
        "{}{}client_id={}&redirect_uri={}&response_type=code&scope={}",
        config.authorize_url,
        delimiter,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_url),
        urlencoding::encode(GOOGLE_SCOPES)
    )
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/google",
    responses(
        (status = 307, description = "Redirect to the Google consent screen"),
        (status = 500, description = "Provider not configured", body = crate::handler::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn start_google_auth(State(state): State<Arc<AppState>>) -> Response {
    let config = match google_config(&state) {
        Ok(config) => config,
        Err(response) => return response,
    };
    Redirect::temporary(&authorize_url(&config)).into_response()
}

/// Trades the authorization code for the user's verified claims.
async fn fetch_assertion(
    client: &reqwest::Client,
    config: &GoogleOAuthConfig,
    code: &str,
) -> Result<IdentityAssertion, reqwest::Error> {
    let token = client
        .post(&config.token_url)
        .header("Accept", "application/json")
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", config.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json::<GoogleTokenResponse>()
        .await?;

    client
        .get(&config.userinfo_url)
        .bearer_auth(&token.access_token)
        .send()
        .await?
        .error_for_status()?
        .json::<IdentityAssertion>()
        .await
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/google/callback",
    params(GoogleCallbackQuery),
    responses(
        (status = 200, description = "Signed in", body = crate::service::auth::AuthResponse),
        (status = 400, description = "Provider reported an error", body = crate::handler::ErrorResponse),
        (status = 401, description = "Authentication failed", body = crate::handler::ErrorResponse),
        (status = 502, description = "Provider unreachable", body = crate::handler::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GoogleCallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        tracing::info!(
            %error,
            description = query.error_description.as_deref().unwrap_or(""),
            "google oauth returned an error"
        );
        return auth_failed(StatusCode::BAD_REQUEST);
    }

    let Some(code) = query.code else {
        return auth_failed(StatusCode::BAD_REQUEST);
    };

    let config = match google_config(&state) {
        Ok(config) => config,
        Err(response) => return response,
    };

    let assertion = match fetch_assertion(state.http(), &config, &code).await {
        Ok(assertion) => assertion,
        Err(err) => {
            tracing::warn!(error = %err, "google code exchange failed");
            return auth_failed(StatusCode::BAD_GATEWAY);
        }
    };

    match state
        .auth()
        .login_federated(Provider::Google, &assertion)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => auth_error_response(err),
    }
}
