//! Signed anonymous usage cookie
//!
//! The cookie only carries an opaque token and its HMAC. The lesson count
//! itself lives server side in the usage tracker, so clearing or editing
//! client storage cannot reset it.

use axum::http::{header::COOKIE, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_NAME: &str = "tactics_anon";
const MAX_AGE_SECS: u64 = 60 * 60 * 24 * 365;

/// A freshly issued token and the cookie value carrying it
#[derive(Debug, Clone)]
pub struct AnonymousToken {
    pub token: String,
    pub cookie_value: String,
}

#[derive(Clone)]
pub struct CookieSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    /// Per-process secret. Cookies issued with it stop verifying on restart.
    pub fn random() -> Self {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        Self { key }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length")
    }

    fn sign(&self, token: &str) -> String {
        let mut mac = self.mac();
        mac.update(token.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    pub fn issue(&self) -> AnonymousToken {
        let token = Uuid::new_v4().simple().to_string();
        let cookie_value = format!("{}.{}", token, self.sign(&token));
        AnonymousToken {
            token,
            cookie_value,
        }
    }

    /// Returns the token if the value was signed with this key
    pub fn verify(&self, value: &str) -> Option<String> {
        let (token, signature) = value.rsplit_once('.')?;
        if token.is_empty() {
            return None;
        }
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(token.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(token.to_string())
    }
}

pub fn set_cookie_header(value: &str, secure: bool) -> String {
    let mut header = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        COOKIE_NAME, value, MAX_AGE_SECS
    );
    if secure {
        header.push_str("; Secure");
    }
    header
}

pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
