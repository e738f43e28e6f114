// KuCoin API key signing (HMAC-SHA256, key version 2)

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use sha2::Sha256;

use crate::config::Credentials;
use crate::error::{TradingError, TradingResult};

type HmacSha256 = Hmac<Sha256>;

pub const KEY_VERSION: &str = "2";

fn hmac_base64(secret: &str, message: &str) -> TradingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TradingError::Internal(format!("invalid HMAC key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Signing material for one API key. The passphrase is signed once at
/// construction; request signatures depend on the timestamp and are
/// recomputed for every attempt.
#[derive(Clone)]
pub struct KucoinAuth {
    api_key: String,
    api_secret: String,
    signed_passphrase: String,
}

impl std::fmt::Debug for KucoinAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KucoinAuth").field("api_key", &self.api_key).finish_non_exhaustive()
    }
}

impl KucoinAuth {
    pub fn new(api_key: &str, api_secret: &str, api_passphrase: &str) -> TradingResult<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            signed_passphrase: hmac_base64(api_secret, api_passphrase)?,
        })
    }

    pub fn from_credentials(credentials: &Credentials) -> TradingResult<Self> {
        Self::new(&credentials.api_key, &credentials.api_secret, &credentials.api_passphrase)
    }

    pub fn signed_passphrase(&self) -> &str {
        &self.signed_passphrase
    }

    /// `base64(HMAC-SHA256(secret, timestamp + METHOD + path_and_query + body))`
    pub fn sign(&self, timestamp_ms: i64, method: &str, path_and_query: &str, body: &str) -> TradingResult<String> {
        let prehash = format!("{}{}{}{}", timestamp_ms, method.to_ascii_uppercase(), path_and_query, body);
        hmac_base64(&self.api_secret, &prehash)
    }

    /// Authentication headers for one request attempt
    pub fn headers(&self, timestamp_ms: i64, method: &str, path_and_query: &str, body: &str) -> TradingResult<HeaderMap> {
        let signature = self.sign(timestamp_ms, method, path_and_query, body)?;

        let mut headers = HeaderMap::new();
        headers.insert("KC-API-KEY", header_value(&self.api_key)?);
        headers.insert("KC-API-SIGN", header_value(&signature)?);
        headers.insert("KC-API-TIMESTAMP", header_value(&timestamp_ms.to_string())?);
        headers.insert("KC-API-PASSPHRASE", header_value(&self.signed_passphrase)?);
        headers.insert("KC-API-KEY-VERSION", HeaderValue::from_static(KEY_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

fn header_value(value: &str) -> TradingResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| TradingError::Config("API credentials contain characters not allowed in headers".to_string()))
}
