//! Firebase Authentication over the Identity Toolkit and Secure Token REST
//! APIs.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use so_core::backend::IdentityProvider;
use so_core::config::FirebaseConfig;
use so_core::error::AuthError;
use so_core::storage::{get_json, KeyValueStore};
use so_core::types::Session;

use super::{check, trim_base, FirebaseError, Result};

/// Key under which tokens are kept when storage is attached.
pub const TOKEN_KEY: &str = "socially_firebase_auth";

/// Tokens are refreshed this long before they actually expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Supplies a Google OIDC id token for provider sign-in.
///
/// The interactive part (popup, device flow) is the host's business; this
/// crate only exchanges the result.
#[async_trait(?Send)]
pub trait IdpTokenSource {
    async fn google_id_token(&self) -> std::result::Result<String, AuthError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenState {
    user_id: String,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl TokenState {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

/// Response shared by `signInWithPassword`, `signUp` and `signInWithIdp`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    profile_picture: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

impl AuthResponse {
    fn session(&self) -> Session {
        let mut session = Session::new(&self.local_id);
        session.email = self.email.clone().filter(|e| !e.is_empty());
        session.display_name = self.display_name.clone().filter(|n| !n.is_empty());
        session.avatar = self
            .photo_url
            .clone()
            .or_else(|| self.profile_picture.clone())
            .filter(|a| !a.is_empty());
        session
    }

    fn tokens(&self) -> TokenState {
        TokenState {
            user_id: self.local_id.clone(),
            id_token: self.id_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: expiry(self.expires_in.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

fn expiry(expires_in: Option<&str>) -> DateTime<Utc> {
    let secs = expires_in.and_then(|s| s.parse::<i64>().ok()).unwrap_or(3600);
    Utc::now() + Duration::seconds(secs)
}

/// Firebase Authentication client.
pub struct FirebaseIdentity {
    http: reqwest::Client,
    api_key: String,
    identity_base: String,
    token_base: String,
    tokens: RefCell<Option<TokenState>>,
    storage: Option<Rc<dyn KeyValueStore>>,
    idp: Option<Rc<dyn IdpTokenSource>>,
}

impl FirebaseIdentity {
    pub fn new(config: &FirebaseConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(FirebaseError::MissingApiKey(config.api_key_env.clone()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            identity_base: trim_base(&config.identity_base_url),
            token_base: trim_base(&config.token_base_url),
            tokens: RefCell::new(None),
            storage: None,
            idp: None,
        })
    }

    /// Persist tokens in `kv` and pick up any left by a previous run.
    pub fn with_storage(mut self, kv: Rc<dyn KeyValueStore>) -> Self {
        match get_json::<TokenState>(kv.as_ref(), TOKEN_KEY) {
            Ok(Some(tokens)) => {
                tracing::debug!(user = %tokens.user_id, "loaded stored firebase tokens");
                *self.tokens.get_mut() = Some(tokens);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "could not read stored firebase tokens"),
        }
        self.storage = Some(kv);
        self
    }

    /// Enable provider sign-in through `source`.
    pub fn with_idp(mut self, source: Rc<dyn IdpTokenSource>) -> Self {
        self.idp = Some(source);
        self
    }

    /// User id of the held tokens, if any.
    pub fn user_id(&self) -> Option<String> {
        self.tokens.borrow().as_ref().map(|t| t.user_id.clone())
    }

    fn accounts_url(&self, method: &str) -> String {
        format!("{}/v1/accounts:{method}", self.identity_base)
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        tracing::debug!(method, "identity toolkit request");
        let resp = self
            .http
            .post(self.accounts_url(method))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        check(resp).await
    }

    async fn authenticate(&self, method: &str, body: serde_json::Value) -> Result<Session> {
        let resp: AuthResponse = self.call(method, body).await?.json().await?;
        self.store_tokens(Some(resp.tokens()));
        Ok(resp.session())
    }

    async fn refresh(&self) -> Result<String> {
        let refresh_token = self
            .tokens
            .borrow()
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .ok_or_else(|| FirebaseError::Decode("no refresh token held".to_string()))?;

        let resp = self
            .http
            .post(format!("{}/v1/token", self.token_base))
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;
        let body: RefreshResponse = check(resp).await?.json().await?;

        let user_id = body
            .user_id
            .clone()
            .or_else(|| self.user_id())
            .unwrap_or_default();
        let id_token = body.id_token.clone();
        self.store_tokens(Some(TokenState {
            user_id,
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry(body.expires_in.as_deref()),
        }));
        tracing::debug!("refreshed firebase id token");
        Ok(id_token)
    }

    fn store_tokens(&self, tokens: Option<TokenState>) {
        if let Some(kv) = &self.storage {
            let result = match &tokens {
                Some(t) => so_core::storage::set_json(kv.as_ref(), TOKEN_KEY, t),
                None => kv.remove(TOKEN_KEY),
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "could not persist firebase tokens");
            }
        }
        *self.tokens.borrow_mut() = tokens;
    }
}

#[async_trait(?Send)]
impl IdentityProvider for FirebaseIdentity {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn sign_in_with_provider(&self) -> std::result::Result<Session, AuthError> {
        let Some(idp) = &self.idp else {
            return Err(AuthError::Unsupported("Google sign-in"));
        };
        let google_token = idp.google_id_token().await?;
        let post_body = format!(
            "id_token={}&providerId=google.com",
            urlencoding::encode(&google_token)
        );
        self.authenticate(
            "signInWithIdp",
            json!({
                "postBody": post_body,
                "requestUri": "http://localhost",
                "returnSecureToken": true,
                "returnIdpCredential": true,
            }),
        )
        .await
        .map_err(FirebaseError::into_auth)
    }

    async fn sign_in_with_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> std::result::Result<Session, AuthError> {
        self.authenticate(
            "signInWithPassword",
            json!({
                "email": identifier,
                "password": secret,
                "returnSecureToken": true,
            }),
        )
        .await
        .map_err(FirebaseError::into_auth)
    }

    async fn register(
        &self,
        name: &str,
        identifier: &str,
        secret: &str,
    ) -> std::result::Result<Session, AuthError> {
        let session = self
            .authenticate(
                "signUp",
                json!({
                    "email": identifier,
                    "password": secret,
                    "returnSecureToken": true,
                }),
            )
            .await
            .map_err(FirebaseError::into_auth)?;

        let name = name.trim();
        if name.is_empty() {
            return Ok(session);
        }
        let id_token = self
            .tokens
            .borrow()
            .as_ref()
            .map(|t| t.id_token.clone())
            .unwrap_or_default();
        match self
            .call(
                "update",
                json!({
                    "idToken": id_token,
                    "displayName": name,
                    "returnSecureToken": false,
                }),
            )
            .await
        {
            Ok(_) => Ok(session.with_display_name(name)),
            Err(e) => {
                // the account exists either way; keep the session without a name
                tracing::warn!(error = %e, "could not set display name");
                Ok(session)
            }
        }
    }

    async fn send_password_reset(&self, identifier: &str) -> std::result::Result<(), AuthError> {
        self.call(
            "sendOobCode",
            json!({
                "requestType": "PASSWORD_RESET",
                "email": identifier,
            }),
        )
        .await
        .map(drop)
        .map_err(FirebaseError::into_auth)
    }

    async fn sign_out(&self) -> std::result::Result<(), AuthError> {
        self.store_tokens(None);
        Ok(())
    }

    async fn id_token(&self, force_refresh: bool) -> std::result::Result<String, AuthError> {
        let cached = self.tokens.borrow().clone();
        match cached {
            None => Err(AuthError::NoSession),
            Some(t) if !force_refresh && t.is_fresh(Utc::now()) => Ok(t.id_token),
            Some(_) => self.refresh().await.map_err(FirebaseError::into_auth),
        }
    }
}

impl std::fmt::Debug for FirebaseIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseIdentity")
            .field("identity_base", &self.identity_base)
            .field("user", &self.user_id())
            .finish_non_exhaustive()
    }
}
