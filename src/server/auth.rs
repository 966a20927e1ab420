//! HTTP Basic authentication.

use crate::parser::Authorization;

pub(crate) const DEFAULT_REALM: &str = "Login Required";

/// Basic credentials guarding a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Realm announced in the challenge; [`DEFAULT_REALM`] when `None`.
    pub realm: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            realm: None,
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn realm(&self) -> &str {
        self.realm.as_deref().unwrap_or(DEFAULT_REALM)
    }

    /// The token a client sends after `Basic `.
    pub fn token(&self) -> String {
        basic_token(&self.username, &self.password)
    }

    pub fn verify(&self, authorization: Option<&Authorization>) -> bool {
        match authorization {
            Some(Authorization::Basic(token)) => *token == self.token(),
            // Digest hashing is not implemented.
            Some(Authorization::Digest(_)) | None => false,
        }
    }
}

pub(crate) fn basic_token(username: &str, password: &str) -> String {
    base64_encode(format!("{username}:{password}").as_bytes())
}

/// `WWW-Authenticate` value for a Basic challenge.
pub(crate) fn basic_challenge(realm: &str) -> String {
    format!("Basic realm=\"{realm}\"")
}

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for group in input.chunks(3) {
        let b = [
            group[0],
            group.get(1).copied().unwrap_or(0),
            group.get(2).copied().unwrap_or(0),
        ];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        for (i, shift) in [18u32, 12, 6, 0].into_iter().enumerate() {
            if i <= group.len() {
                out.push(char::from(ALPHABET[((n >> shift) & 0x3f) as usize]));
            } else {
                out.push('=');
            }
        }
    }
    out
}
