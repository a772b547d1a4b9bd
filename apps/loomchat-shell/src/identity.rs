//! Identity session probe. The shared wiring reads a session the host
//! environment already established; the direct wiring asks the provider's
//! user-info endpoint with a bearer token.

use reqwest::StatusCode;
use serde::Deserialize;

use loomchat_client_core::auth::{
    AuthSnapshot, IdentityProviderConfig, IdentityWiring, UserIdentity,
};

pub const ENV_ACCESS_TOKEN: &str = "LOOMCHAT_ACCESS_TOKEN";
pub const ENV_SESSION_USER_ID: &str = "LOOMCHAT_SESSION_USER_ID";
pub const ENV_SESSION_USER_EMAIL: &str = "LOOMCHAT_SESSION_USER_EMAIL";
pub const ENV_SESSION_USER_NAME: &str = "LOOMCHAT_SESSION_USER_NAME";

#[derive(Debug, thiserror::Error)]
pub enum IdentityClientError {
    #[error("identity_request_failed:{message}")]
    Request { message: String },
    #[error("identity_read_failed:{message}")]
    Read { message: String },
    #[error("identity_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("identity_json_decode_failed:{message}")]
    Decode { message: String },
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Resolve the current auth snapshot. Errors surface in the snapshot for
/// the page machine to render; nothing is recovered here.
pub async fn resolve_auth(wiring: &IdentityWiring) -> AuthSnapshot {
    match wiring {
        IdentityWiring::SharedSession { .. } => shared_session_snapshot(),
        IdentityWiring::DirectProvider(config) => {
            let Some(token) = env_non_empty(ENV_ACCESS_TOKEN) else {
                return AuthSnapshot::anonymous();
            };
            match fetch_user(config, &token).await {
                Ok(Some(user)) => AuthSnapshot::signed_in(user),
                Ok(None) => AuthSnapshot::anonymous(),
                Err(error) => AuthSnapshot::failed(error.to_string()),
            }
        }
    }
}

fn shared_session_snapshot() -> AuthSnapshot {
    match env_non_empty(ENV_SESSION_USER_ID) {
        Some(id) => {
            let mut user = UserIdentity::from_id(id);
            user.email = env_non_empty(ENV_SESSION_USER_EMAIL);
            user.name = env_non_empty(ENV_SESSION_USER_NAME);
            AuthSnapshot::signed_in(user)
        }
        None => AuthSnapshot::anonymous(),
    }
}

/// `GET {domain}/userinfo`. A 401/403 means the token no longer stands for
/// a session, which is the anonymous state, not a failure.
pub async fn fetch_user(
    config: &IdentityProviderConfig,
    access_token: &str,
) -> Result<Option<UserIdentity>, IdentityClientError> {
    let response = reqwest::Client::new()
        .get(config.userinfo_url())
        .header("authorization", format!("Bearer {access_token}"))
        .send()
        .await
        .map_err(|error| IdentityClientError::Request {
            message: error.to_string(),
        })?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        tracing::debug!(%status, "identity token rejected; treating session as anonymous");
        return Ok(None);
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|error| IdentityClientError::Read {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes);
        let body = body.trim();
        return Err(IdentityClientError::Http {
            status,
            body: if body.is_empty() { "<empty>" } else { body }.to_string(),
        });
    }

    let info: UserInfoResponse =
        serde_json::from_slice(&bytes).map_err(|error| IdentityClientError::Decode {
            message: error.to_string(),
        })?;
    Ok(Some(UserIdentity {
        id: info.sub,
        email: info.email,
        name: info.name,
    }))
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
