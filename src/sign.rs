use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Value sent as `sign_method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMethod {
    /// HMAC-SHA256 keyed with the app secret.
    Sha256,
    /// MD5 over the string to sign wrapped in the app secret on both ends.
    Md5,
}

impl SignMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignMethod::Sha256 => "sha256",
            SignMethod::Md5 => "md5",
        }
    }
}

impl Default for SignMethod {
    fn default() -> Self {
        SignMethod::Sha256
    }
}

/// Builds the string the gateway signs: the optional API path followed by
/// every `key` `value` pair in ascending key order. The `sign` parameter is
/// skipped.
pub fn string_to_sign(api_path: Option<&str>, params: &BTreeMap<String, String>) -> String {
    let mut buf = String::new();
    if let Some(path) = api_path {
        buf.push_str(path);
    }
    for (k, v) in params.iter().filter(|(k, _)| k.as_str() != "sign") {
        buf.push_str(k);
        buf.push_str(v);
    }
    buf
}

/// Signature of the string to sign as upper case hex.
pub fn sign(
    method: SignMethod,
    secret: &str,
    api_path: Option<&str>,
    params: &BTreeMap<String, String>,
) -> String {
    let s = string_to_sign(api_path, params);
    match method {
        SignMethod::Sha256 => {
            // HMAC accepts keys of any length.
            let mut mac =
                HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key of any size");
            mac.update(s.as_bytes());
            hex::encode_upper(mac.finalize().into_bytes())
        }
        SignMethod::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(secret.as_bytes());
            hasher.update(s.as_bytes());
            hasher.update(secret.as_bytes());
            hex::encode_upper(hasher.finalize())
        }
    }
}
