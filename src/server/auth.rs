//! Signed URLs for the `/ext` routes.
//!
//! A signed URL carries an `expires` unix timestamp and a `token`, the hex
//! HMAC-SHA256 of the path and query up to (and including) `expires`:
//!
//! ```text
//! /ext/stream?id=42&player=p1&expires=1767225600&token=9f2c...
//! ```

use crate::server::{AppContext, AppError};
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const EXPIRES_PARAM: &str = "expires";
const TOKEN_PARAM: &str = "token";

/// Why a signed URL was rejected.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature")]
    Missing,
    #[error("invalid signature")]
    Invalid,
    #[error("signature expired")]
    Expired,
}

impl From<SignatureError> for streamforged_common::Error {
    fn from(e: SignatureError) -> Self {
        streamforged_common::Error::Forbidden(e.to_string())
    }
}

/// Signs and verifies URLs embedded in playlists.
pub trait UrlSigner: Send + Sync {
    /// Return `url` with `expires` and `token` appended. Absolute URLs keep
    /// their origin, which is not covered by the signature.
    fn sign(&self, url: &str, expires: DateTime<Utc>) -> String;

    /// Check a request's path and query.
    fn verify(&self, path_and_query: &str) -> Result<(), SignatureError>;
}

/// [`UrlSigner`] keyed with a shared secret.
pub struct HmacUrlSigner {
    secret: Vec<u8>,
}

impl HmacUrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC key of any length is valid"),
        }
    }
}

impl std::fmt::Debug for HmacUrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacUrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner for HmacUrlSigner {
    fn sign(&self, url: &str, expires: DateTime<Utc>) -> String {
        let (origin, path_and_query) = split_origin(url);
        let sep = if path_and_query.contains('?') { '&' } else { '?' };
        let unsigned = format!(
            "{}{}{}={}",
            path_and_query,
            sep,
            EXPIRES_PARAM,
            expires.timestamp()
        );

        let mut mac = self.mac();
        mac.update(unsigned.as_bytes());
        let token = hex::encode(mac.finalize().into_bytes());

        format!("{origin}{unsigned}&{TOKEN_PARAM}={token}")
    }

    fn verify(&self, path_and_query: &str) -> Result<(), SignatureError> {
        let (unsigned, token) = path_and_query
            .rsplit_once(&format!("&{TOKEN_PARAM}="))
            .ok_or(SignatureError::Missing)?;

        let query = unsigned.split_once('?').map(|(_, q)| q).unwrap_or("");
        let expires = url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == EXPIRES_PARAM)
            .and_then(|(_, v)| v.parse::<i64>().ok())
            .ok_or(SignatureError::Missing)?;

        let expected = hex::decode(token).map_err(|_| SignatureError::Invalid)?;
        let mut mac = self.mac();
        mac.update(unsigned.as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Invalid)?;

        if expires < Utc::now().timestamp() {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}

/// Split `http://host:port/path?q` into `("http://host:port", "/path?q")`.
fn split_origin(url: &str) -> (&str, &str) {
    let Some(scheme_end) = url.find("://") else {
        return ("", url);
    };
    let after = scheme_end + 3;
    match url[after..].find('/') {
        Some(slash) => url.split_at(after + slash),
        None => (url, "/"),
    }
}

/// Middleware rejecting `/ext` requests without a valid signature.
pub async fn verify_signed_request(
    State(ctx): State<AppContext>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| request.uri().path());

    if let Err(e) = ctx.signer.verify(path_and_query) {
        tracing::debug!(uri = %request.uri(), error = %e, "Rejected signed request");
        return Err(streamforged_common::Error::from(e).into());
    }

    Ok(next.run(request).await)
}

/// Generate a random URL signing secret
pub fn generate_secret() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn signer() -> HmacUrlSigner {
        HmacUrlSigner::new("test-secret")
    }

    fn path_of(url: &str) -> &str {
        split_origin(url).1
    }

    #[test]
    fn signed_url_verifies() {
        let url = signer().sign("/ext/stream?id=42&player=p1", Utc::now() + Duration::hours(1));
        assert!(url.starts_with("/ext/stream?id=42&player=p1&expires="));
        assert!(url.contains("&token="));
        assert_eq!(signer().verify(&url), Ok(()));
    }

    #[test]
    fn absolute_url_keeps_origin() {
        let url = signer().sign(
            "http://radio.local:4040/ext/hls?id=1",
            Utc::now() + Duration::hours(1),
        );
        assert!(url.starts_with("http://radio.local:4040/ext/hls?id=1&expires="));
        assert_eq!(signer().verify(path_of(&url)), Ok(()));
    }

    #[test]
    fn url_without_query_gets_one() {
        let url = signer().sign("/ext/stream", Utc::now() + Duration::hours(1));
        assert!(url.starts_with("/ext/stream?expires="));
        assert_eq!(signer().verify(&url), Ok(()));
    }

    #[test]
    fn tampered_url_is_rejected() {
        let url = signer().sign("/ext/stream?id=42", Utc::now() + Duration::hours(1));
        let tampered = url.replace("id=42", "id=43");
        assert_eq!(signer().verify(&tampered), Err(SignatureError::Invalid));
    }

    #[test]
    fn other_secret_is_rejected() {
        let url = signer().sign("/ext/stream?id=42", Utc::now() + Duration::hours(1));
        assert_eq!(
            HmacUrlSigner::new("other").verify(&url),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn expired_url_is_rejected() {
        let url = signer().sign("/ext/stream?id=42", Utc::now() - Duration::seconds(5));
        assert_eq!(signer().verify(&url), Err(SignatureError::Expired));
    }

    #[test]
    fn missing_token_is_rejected() {
        assert_eq!(
            signer().verify("/ext/stream?id=42"),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            signer().verify("/ext/stream?id=42&token=abcd"),
            Err(SignatureError::Missing)
        );
    }

    #[test]
    fn generated_secret_is_hex() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_secret());
    }
}
