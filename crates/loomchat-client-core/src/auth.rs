use serde::{Deserialize, Serialize};

pub const ENV_IDENTITY_DOMAIN: &str = "LOOMCHAT_IDENTITY_DOMAIN";
pub const ENV_IDENTITY_CLIENT_ID: &str = "LOOMCHAT_IDENTITY_CLIENT_ID";
pub const ENV_IDENTITY_REDIRECT_URI: &str = "LOOMCHAT_IDENTITY_REDIRECT_URI";
pub const ENV_LOGIN_ROUTE: &str = "LOOMCHAT_LOGIN_ROUTE";

pub const DEFAULT_LOGIN_ROUTE: &str = "/api/auth/login";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthConfigError {
    #[error("identity domain must not be empty")]
    EmptyDomain,
    #[error("identity domain must use http:// or https:// and include a host")]
    InvalidDomain,
    #[error("client id must not be empty")]
    EmptyClientId,
    #[error("redirect uri must use http:// or https:// and include a host")]
    InvalidRedirectUri,
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
}

/// Identity record returned by the provider. Fields beyond the subject id
/// are optional; providers differ in what they populate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserIdentity {
    #[must_use]
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
        }
    }
}

/// Point-in-time view of the identity session. `is_authenticated` is fixed
/// at construction as `user.is_some()`; the snapshot is recomputed from the
/// identity boundary on every evaluation and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub user: Option<UserIdentity>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AuthSnapshot {
    #[must_use]
    pub fn derive(user: Option<UserIdentity>, is_loading: bool, error: Option<String>) -> Self {
        let is_authenticated = user.is_some();
        Self {
            user,
            is_authenticated,
            is_loading,
            error,
        }
    }

    #[must_use]
    pub fn loading() -> Self {
        Self::derive(None, true, None)
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::derive(None, false, None)
    }

    #[must_use]
    pub fn signed_in(user: UserIdentity) -> Self {
        Self::derive(Some(user), false, None)
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::derive(None, false, Some(message.into()))
    }
}

/// Provider settings for the direct wiring: the three externally supplied
/// strings, validated up front so a bad deployment fails at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProviderConfig {
    pub domain: String,
    pub client_id: String,
    pub redirect_uri: String,
}

impl IdentityProviderConfig {
    pub fn new(
        domain: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self, AuthConfigError> {
        let domain = normalize_origin(domain.into().as_str())
            .map_err(|error| match error {
                AuthConfigError::EmptyDomain => AuthConfigError::EmptyDomain,
                _ => AuthConfigError::InvalidDomain,
            })?;
        let client_id = client_id.into().trim().to_string();
        if client_id.is_empty() {
            return Err(AuthConfigError::EmptyClientId);
        }
        let redirect_uri = redirect_uri.into();
        let redirect_uri = redirect_uri.trim();
        if !has_http_origin(redirect_uri) {
            return Err(AuthConfigError::InvalidRedirectUri);
        }
        Ok(Self {
            domain,
            client_id,
            redirect_uri: redirect_uri.to_string(),
        })
    }

    pub fn from_env() -> Result<Self, AuthConfigError> {
        let domain = env_non_empty(ENV_IDENTITY_DOMAIN)
            .ok_or(AuthConfigError::MissingEnv(ENV_IDENTITY_DOMAIN))?;
        let client_id = env_non_empty(ENV_IDENTITY_CLIENT_ID)
            .ok_or(AuthConfigError::MissingEnv(ENV_IDENTITY_CLIENT_ID))?;
        let redirect_uri = env_non_empty(ENV_IDENTITY_REDIRECT_URI)
            .ok_or(AuthConfigError::MissingEnv(ENV_IDENTITY_REDIRECT_URI))?;
        Self::new(domain, client_id, redirect_uri)
    }

    /// Login endpoint reachable by simple navigation.
    #[must_use]
    pub fn authorize_url(&self) -> String {
        format!(
            "{}/authorize?response_type=code&client_id={}&redirect_uri={}",
            self.domain,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri)
        )
    }

    #[must_use]
    pub fn userinfo_url(&self) -> String {
        format!("{}/userinfo", self.domain)
    }
}

/// The two auth-wrapping strategies observed in deployments. They are
/// alternate configurations of one contract, never merged: a deployment
/// picks one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityWiring {
    /// The session is established by the surrounding host; this client only
    /// reads it and points anonymous users at the host's login route.
    SharedSession { login_route: String },
    /// This client wraps the provider itself using the three
    /// environment-supplied strings.
    DirectProvider(IdentityProviderConfig),
}

impl IdentityWiring {
    #[must_use]
    pub fn shared_from_env() -> Self {
        Self::SharedSession {
            login_route: env_non_empty(ENV_LOGIN_ROUTE)
                .unwrap_or_else(|| DEFAULT_LOGIN_ROUTE.to_string()),
        }
    }

    pub fn direct_from_env() -> Result<Self, AuthConfigError> {
        IdentityProviderConfig::from_env().map(Self::DirectProvider)
    }

    /// Where an anonymous user is sent to log in.
    #[must_use]
    pub fn login_destination(&self) -> String {
        match self {
            Self::SharedSession { login_route } => login_route.clone(),
            Self::DirectProvider(config) => config.authorize_url(),
        }
    }
}

pub fn normalize_origin(raw: &str) -> Result<String, AuthConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthConfigError::EmptyDomain);
    }
    if !has_http_origin(trimmed) {
        return Err(AuthConfigError::InvalidDomain);
    }
    Ok(trimmed.to_string())
}

fn has_http_origin(value: &str) -> bool {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return false;
    }
    let Some((_, remainder)) = value.split_once("://") else {
        return false;
    };
    !remainder.trim().is_empty() && !remainder.starts_with('/')
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
