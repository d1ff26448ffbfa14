//! OAuth 1.0a request signing (HMAC-SHA1), user context.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha1::Sha1;

use super::SearchError;
use crate::config::TwitterCredentials;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 percent-encoding, as OAuth requires.
fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Signs requests with the four user-context credentials.
pub struct OAuthSigner {
    credentials: TwitterCredentials,
}

impl OAuthSigner {
    pub fn new(credentials: TwitterCredentials) -> Self {
        Self { credentials }
    }

    /// Build the `Authorization` header value for a request.
    ///
    /// `params` are the request's query (or form) parameters, unencoded.
    pub fn authorization(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> Result<String, SearchError> {
        let creds = &self.credentials;
        let timestamp = timestamp.to_string();
        let oauth: [(&str, &str); 6] = [
            ("oauth_consumer_key", creds.consumer_key.expose_secret()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", creds.access_token.expose_secret()),
            ("oauth_version", "1.0"),
        ];

        let all: Vec<(&str, &str)> = params.iter().chain(oauth.iter()).copied().collect();
        let base = signature_base(method, url, &all);
        let signature = sign(
            &base,
            creds.consumer_secret.expose_secret(),
            creds.access_token_secret.expose_secret(),
        )?;

        let mut header: Vec<String> = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();
        header.push(format!("oauth_signature=\"{}\"", encode(&signature)));
        header.sort();
        Ok(format!("OAuth {}", header.join(", ")))
    }
}

/// `METHOD&url&sorted-params`, each part percent-encoded.
fn signature_base(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> =
        params.iter().map(|(k, v)| (encode(k), encode(v))).collect();
    encoded.sort();
    let joined = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(url),
        encode(&joined)
    )
}

fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> Result<String, SearchError> {
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| SearchError::Signing(e.to_string()))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
