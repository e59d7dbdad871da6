//! Connection authentication.
//!
//! Tokens are opaque capabilities issued by an external login service. The
//! server only asks an [`Authenticator`] to turn a token into a verified
//! [`Identity`], once, during the WebSocket handshake.

use crate::error::{AuthError, ServerError};
use crate::world::Identity;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio_tungstenite::tungstenite::handshake::server::Request;

pub trait Authenticator: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenEntry {
    user_id: String,
    username: String,
}

/// Static token -> identity table.
#[derive(Debug, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Identity>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `{"<token>": {"user_id": "...", "username": "..."}, ...}`.
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ServerError> {
        let entries: HashMap<String, TokenEntry> = serde_json::from_str(text)?;
        let tokens = entries
            .into_iter()
            .map(|(token, entry)| {
                (
                    token,
                    Identity {
                        user_id: entry.user_id,
                        username: entry.username,
                    },
                )
            })
            .collect();
        Ok(Self { tokens })
    }

    pub fn insert(&mut self, token: impl Into<String>, user_id: &str, username: &str) {
        self.tokens.insert(
            token.into(),
            Identity {
                user_id: user_id.to_string(),
                username: username.to_string(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for TokenTable {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

/// Reads the token from the `token` query parameter, falling back to an
/// `Authorization: Bearer` header. Query values are percent-decoded.
pub fn token_from_request(request: &Request) -> Option<String> {
    let from_query = request.uri().query().and_then(|query| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "token")
            .and_then(|(_, value)| percent_decode_str(value).decode_utf8().ok())
            .map(|value| value.into_owned())
    });
    from_query.filter(|t| !t.is_empty()).or_else(|| {
        request
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Verifies the token carried by a handshake request.
pub fn authenticate(auth: &dyn Authenticator, request: &Request) -> Result<Identity, AuthError> {
    let token = token_from_request(request).ok_or(AuthError::MissingToken)?;
    auth.verify(&token)
}
