//! Session gate for the admin endpoints.
//!
//! A session token is `base64url(claims) "." base64url(HMAC-SHA256)` where
//! the MAC covers the encoded claims. A valid signature only proves who the
//! holder was at issue time; [`AuthGate::check_account`] re-reads the
//! account on every request, so deactivating or demoting a user takes
//! effect immediately.
//!
//! ```
//! use portal_server::auth::SessionSigner;
//! use portal_sqlite::{Role, UserRecord};
//!
//! let signer = SessionSigner::new(b"0123456789abcdef0123456789abcdef", 24).unwrap();
//! let admin = UserRecord {
//!     id: 1,
//!     email: "ops@isp.example".into(),
//!     full_name: None,
//!     role: Role::Admin,
//!     is_active: true,
//! };
//! let token = signer.issue(&admin).unwrap();
//! assert_eq!(signer.verify(&token).unwrap().sub, 1);
//! ```

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use portal_sqlite::{Role, UserRecord, UserStore};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, error};

use crate::config::SessionConfig;
use crate::error::{ApiError, AuthError, ConfigError};

type HmacSha256 = Hmac<Sha256>;

/// Payload carried inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: i64,
    pub email: String,
    /// Role at issue time. Informational; the store is authoritative.
    pub role: Role,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct SessionSigner {
    keyed: HmacSha256,
    ttl_seconds: i64,
}

impl SessionSigner {
    pub fn new(secret: &[u8], ttl_hours: i64) -> Result<Self, ConfigError> {
        let keyed = HmacSha256::new_from_slice(secret)
            .map_err(|e| ConfigError::Invalid(format!("session secret rejected: {e}")))?;
        Ok(Self {
            keyed,
            ttl_seconds: ttl_hours.saturating_mul(3600),
        })
    }

    fn mac(&self) -> HmacSha256 {
        self.keyed.clone()
    }

    /// Issues a token for `user`, valid from now.
    pub fn issue(&self, user: &UserRecord) -> serde_json::Result<String> {
        self.issue_at(user, Utc::now().timestamp())
    }

    /// Issues a token as if the current time were `now` (Unix seconds).
    pub fn issue_at(&self, user: &UserRecord, now: i64) -> serde_json::Result<String> {
        let claims = SessionClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now.saturating_add(self.ttl_seconds),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    /// Verifies the signature and expiry of `token`.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verifies `token` as if the current time were `now` (Unix seconds).
    ///
    /// The signature is compared in constant time and checked before the
    /// payload is decoded.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims, AuthError> {
        let (payload, signature) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Malformed)?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&json).map_err(|_| AuthError::Malformed)?;
        if now >= claims.exp {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}

/// Authorizes requests from the session cookie.
#[derive(Clone)]
pub struct AuthGate {
    signer: SessionSigner,
    cookie_name: String,
    secure: bool,
    ttl_seconds: i64,
}

impl AuthGate {
    pub fn new(config: &SessionConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            signer: SessionSigner::new(config.secret.as_bytes(), config.ttl_hours)?,
            cookie_name: config.cookie_name.clone(),
            secure: config.secure,
            ttl_seconds: config.ttl_hours.saturating_mul(3600),
        })
    }

    pub fn signer(&self) -> &SessionSigner {
        &self.signer
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Extracts and verifies the session token from the request cookies.
    pub fn session(&self, headers: &HeaderMap) -> Result<SessionClaims, AuthError> {
        let token = cookie_value(headers, &self.cookie_name).ok_or(AuthError::MissingCookie)?;
        self.signer.verify(token)
    }

    /// Re-reads the account named by `claims` and requires it to be an
    /// active administrator.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] when the account is missing,
    /// inactive or not an administrator, and [`ApiError::Unavailable`] when
    /// the lookup itself fails.
    pub fn check_account(
        &self,
        claims: &SessionClaims,
        conn: &Connection,
    ) -> Result<UserRecord, ApiError> {
        let user = UserStore::new(conn)
            .find_by_id(claims.sub)
            .map_err(|e| {
                error!(user_id = claims.sub, error = %e, "Account lookup failed");
                ApiError::Unavailable(e.to_string())
            })?
            .ok_or(AuthError::UnknownUser(claims.sub))?;
        if !user.is_active {
            return Err(AuthError::Inactive(user.id).into());
        }
        if user.role != Role::Admin {
            return Err(AuthError::NotAdmin(user.id).into());
        }
        Ok(user)
    }

    /// Full check: cookie, signature, expiry, then the account.
    pub fn authorize(&self, headers: &HeaderMap, conn: &Connection) -> Result<UserRecord, ApiError> {
        let claims = self.session(headers)?;
        let user = self.check_account(&claims, conn)?;
        debug!(user_id = user.id, "Session authorized");
        Ok(user)
    }

    /// `Set-Cookie` value carrying `token`.
    pub fn session_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name, self.ttl_seconds
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the session.
    pub fn clear_cookie(&self) -> String {
        let mut cookie = format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            self.cookie_name
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Finds cookie `name` across all `Cookie` headers.
fn cookie_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}
