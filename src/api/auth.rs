use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{LmsError, LmsResult};

const SIGN_IN_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword";

/// The signed-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub uid: String,
    pub email: String,
    /// Bearer token for the document store; absent offline.
    pub id_token: Option<String>,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> LmsResult<Principal>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: String,
    id_token: String,
}

/// Firebase Authentication, email/password provider.
#[derive(Clone)]
pub struct FirebaseAuth {
    client: reqwest::Client,
    api_key: String,
}

impl FirebaseAuth {
    pub fn new(api_key: impl Into<String>) -> LmsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }
}

fn sign_in_error(status: StatusCode, body: &str) -> LmsError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_default();

    // Messages look like "INVALID_PASSWORD" or "TOO_MANY_ATTEMPTS_TRY_LATER : ..."
    let code = message.split_whitespace().next().unwrap_or_default();
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL"
        | "MISSING_PASSWORD" | "USER_DISABLED" => LmsError::InvalidCredentials,
        _ if status.is_server_error() || code == "TOO_MANY_ATTEMPTS_TRY_LATER" => {
            LmsError::BackendUnavailable(format!("{}: {}", status, message))
        }
        _ => LmsError::ValidationRejected(format!("{}: {}", status, message)),
    }
}

#[async_trait]
impl AuthService for FirebaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> LmsResult<Principal> {
        let response = self
            .client
            .post(SIGN_IN_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = sign_in_error(status, &body);
            log::info!("Sign-in for {} failed: {}", email, err);
            return Err(err);
        }

        let signed_in: SignInResponse = response.json().await.map_err(|e| {
            LmsError::BackendUnavailable(format!("Failed to parse sign-in response: {}", e))
        })?;
        log::info!("Signed in as {}", signed_in.email);

        Ok(Principal {
            uid: signed_in.local_id,
            email: signed_in.email,
            id_token: Some(signed_in.id_token),
        })
    }
}

/// Fixed account table for offline use.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuth {
    accounts: HashMap<String, String>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, email: &str, password: &str) -> Self {
        self.accounts
            .insert(email.to_ascii_lowercase(), password.to_string());
        self
    }

    /// One account per role.
    pub fn demo() -> Self {
        Self::new()
            .with_account("admin@gmail.com", "admin123")
            .with_account("teacher@gmail.com", "teacher123")
            .with_account("student@gmail.com", "student123")
    }
}

#[async_trait]
impl AuthService for MemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> LmsResult<Principal> {
        let email = email.trim().to_ascii_lowercase();
        match self.accounts.get(&email) {
            Some(expected) if expected == password => Ok(Principal {
                uid: format!("local-{}", email),
                email,
                id_token: None,
            }),
            _ => Err(LmsError::InvalidCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_errors_map_to_invalid_credentials() {
        let body = r#"{"error":{"code":400,"message":"INVALID_LOGIN_CREDENTIALS","errors":[]}}"#;
        assert_eq!(
            sign_in_error(StatusCode::BAD_REQUEST, body),
            LmsError::InvalidCredentials
        );

        let body = r#"{"error":{"code":400,"message":"TOO_MANY_ATTEMPTS_TRY_LATER : Access to this account has been temporarily disabled"}}"#;
        assert!(sign_in_error(StatusCode::BAD_REQUEST, body).is_transient());
    }

    #[tokio::test]
    async fn test_memory_auth() {
        let auth = MemoryAuth::demo();

        let principal = auth.sign_in("Teacher@gmail.com", "teacher123").await.unwrap();
        assert_eq!(principal.email, "teacher@gmail.com");
        assert!(principal.id_token.is_none());

        assert_eq!(
            auth.sign_in("teacher@gmail.com", "wrong").await.unwrap_err(),
            LmsError::InvalidCredentials
        );
        assert_eq!(
            auth.sign_in("nobody@gmail.com", "x").await.unwrap_err(),
            LmsError::InvalidCredentials
        );
    }
}
