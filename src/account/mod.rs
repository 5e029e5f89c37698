/// Account operations
///
/// Login, registration, logout, profile fetch and the post-login redirect
/// target. Token writes go through the session manager.
use crate::{
    error::{ClientError, ClientResult},
    http::{client::with_default_message, HttpClient, Method, RequestBody},
    notify::NotificationHub,
    session::{SessionManager, UserProfile},
    storage::{keys, StoreHandle},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check your connection and try again.";
const MIN_PASSWORD_LENGTH: usize = 6;
const DEFAULT_REDIRECT: &str = "/";

/// Token pair returned by `/token` and `/register`
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Registration form input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub terms_accepted: bool,
}

impl RegisterForm {
    /// Client-side checks, in the order the form reports them
    pub fn validate(&self) -> ClientResult<()> {
        let fields = [
            &self.username,
            &self.email,
            &self.password,
            &self.confirm_password,
        ];
        if fields.iter().any(|field| field.trim().is_empty()) {
            return Err(validation("Please fill in all fields"));
        }
        if self.password != self.confirm_password {
            return Err(validation("Passwords do not match"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(validation("Password must be at least 6 characters"));
        }
        if !self.terms_accepted {
            return Err(validation(
                "Please accept the Terms of Service and Privacy Policy",
            ));
        }
        Ok(())
    }
}

/// What the caller should do after a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Tokens came back; the user is logged in
    SignedIn,
    /// No tokens; send the user to the login screen
    LoginRequired,
}

fn validation(message: &str) -> ClientError {
    ClientError::Validation(message.to_string())
}

#[derive(Clone)]
pub struct AccountService {
    http: HttpClient,
    session: Arc<SessionManager>,
    store: StoreHandle,
    notifier: NotificationHub,
}

impl AccountService {
    pub fn new(
        http: HttpClient,
        session: Arc<SessionManager>,
        store: StoreHandle,
        notifier: NotificationHub,
    ) -> Self {
        Self {
            http,
            session,
            store,
            notifier,
        }
    }

    /// Password login
    ///
    /// Returns the path the user should land on.
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<String> {
        if username.is_empty() || password.is_empty() {
            return Err(self.report(validation("Please fill in all fields")));
        }

        let form = RequestBody::Form(vec![
            ("grant_type".to_string(), "password".to_string()),
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
            ("scope".to_string(), String::new()),
        ]);

        let tokens: TokenResponse = match self
            .http
            .request_public(Method::POST, "/token", Some(form))
            .await
        {
            Ok(response) => response.json().map_err(|e| self.report(e))?,
            Err(e) => {
                let e = with_default_message(e, |_| "Login failed".to_string());
                return Err(self.report(e));
            }
        };

        let Some(access_token) = tokens.access_token else {
            return Err(self.report(ClientError::InvalidResponse(
                "login response has no access token".to_string(),
            )));
        };

        self.session
            .set_session(&access_token, tokens.refresh_token.as_deref())?;
        info!("Logged in as {}", username);
        self.notifier.success("Login successful!");

        Ok(self
            .take_redirect()?
            .unwrap_or_else(|| DEFAULT_REDIRECT.to_string()))
    }

    /// Create an account; signs in when the server returns tokens
    pub async fn register(&self, form: &RegisterForm) -> ClientResult<RegisterOutcome> {
        form.validate().map_err(|e| self.report(e))?;

        let body = RequestBody::Json(json!({
            "username": form.username,
            "email": form.email,
            "password": form.password,
        }));

        let tokens: TokenResponse = match self
            .http
            .request_public(Method::POST, "/register", Some(body))
            .await
        {
            Ok(response) => response.json().unwrap_or(TokenResponse {
                access_token: None,
                refresh_token: None,
            }),
            Err(e) => {
                let e = with_default_message(e, |_| {
                    "Registration failed. Please try again.".to_string()
                });
                return Err(self.report(e));
            }
        };

        info!("Registered account {}", form.username);
        self.notifier.success("Account created successfully!");

        match tokens.access_token {
            Some(access_token) => {
                self.session
                    .set_session(&access_token, tokens.refresh_token.as_deref())?;
                Ok(RegisterOutcome::SignedIn)
            }
            None => Ok(RegisterOutcome::LoginRequired),
        }
    }

    pub fn logout(&self) -> ClientResult<()> {
        self.session.clear_session()?;
        self.notifier.success("Logged out successfully!");
        Ok(())
    }

    /// `GET /users/me`; the profile is recorded on the session
    pub async fn fetch_profile(&self) -> ClientResult<UserProfile> {
        let Some(token) = self.session.token() else {
            return Err(ClientError::NotAuthenticated);
        };

        let profile: UserProfile = match self.http.request(Method::GET, "/users/me", None).await {
            Ok(response) => response.json()?,
            Err(e) if e.requires_login() => return Err(e),
            Err(e) => {
                warn!("Profile fetch failed: {}", e);
                self.notifier.error("Failed to load user data");
                return Err(e);
            }
        };

        if !self.session.set_user_for(&token, profile.clone())? {
            debug!("Discarding profile fetched for a replaced session");
            return Err(ClientError::SessionChanged);
        }
        Ok(profile)
    }

    /// Remember where to go after the next login
    pub fn remember_redirect(&self, path: &str) -> ClientResult<()> {
        self.store.set(keys::REDIRECT_AFTER_LOGIN, path)
    }

    /// Pending redirect target, removed once read
    pub fn take_redirect(&self) -> ClientResult<Option<String>> {
        let target = self.store.get(keys::REDIRECT_AFTER_LOGIN)?;
        if target.is_some() {
            self.store.remove(keys::REDIRECT_AFTER_LOGIN)?;
        }
        Ok(target)
    }

    /// Toast the error the way the forms do, then hand it back
    fn report(&self, err: ClientError) -> ClientError {
        let message = match &err {
            ClientError::Network(_) => NETWORK_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        };
        self.notifier.error(message);
        err
    }
}
