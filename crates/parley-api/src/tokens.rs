//! HS256 access and refresh tokens.
//!
//! Both kinds carry the same [`Claims`] shape; they are separated by
//! independent signing secrets, so a refresh token never verifies as an
//! access token and vice versa.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use parley_types::api::Claims;

pub const DEFAULT_ACCESS_TTL_MINS: i64 = 15;
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

#[derive(Clone)]
struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningKey {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    access: SigningKey,
    refresh: SigningKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: SigningKey::new(access_secret, access_ttl),
            refresh: SigningKey::new(refresh_secret, refresh_ttl),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Codec with the standard 15 minute / 7 day lifetimes.
    pub fn with_default_ttls(access_secret: &str, refresh_secret: &str) -> Self {
        Self::new(
            access_secret,
            refresh_secret,
            Duration::minutes(DEFAULT_ACCESS_TTL_MINS),
            Duration::days(DEFAULT_REFRESH_TTL_DAYS),
        )
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl
    }

    pub fn issue_access(&self, subject: Uuid) -> jsonwebtoken::errors::Result<String> {
        issue(&self.access, subject)
    }

    pub fn issue_refresh(&self, subject: Uuid) -> jsonwebtoken::errors::Result<String> {
        issue(&self.refresh, subject)
    }

    /// Signature and expiry only; no store lookup.
    pub fn verify_access(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        self.verify(&self.access, token)
    }

    /// Signature and expiry only. Callers still compare against the stored token.
    pub fn verify_refresh(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        self.verify(&self.refresh, token)
    }

    fn verify(&self, key: &SigningKey, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        Ok(decode::<Claims>(token, &key.decoding, &self.validation)?.claims)
    }
}

fn issue(key: &SigningKey, subject: Uuid) -> jsonwebtoken::errors::Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: subject,
        iat: now.timestamp() as usize,
        exp: (now + key.ttl).timestamp() as usize,
        jti: Uuid::new_v4(),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &key.encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::with_default_ttls("access-secret-for-tests", "refresh-secret-for-tests")
    }

    #[test]
    fn access_token_round_trips_subject() {
        let codec = codec();
        let user = Uuid::new_v4();
        let claims = codec.verify_access(&codec.issue_access(user).unwrap()).unwrap();

        assert_eq!(claims.sub, user);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn refresh_lifetime_is_seven_days() {
        let codec = codec();
        let claims = codec
            .verify_refresh(&codec.issue_refresh(Uuid::new_v4()).unwrap())
            .unwrap();
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn kinds_do_not_cross_verify() {
        let codec = codec();
        let user = Uuid::new_v4();

        assert!(codec.verify_access(&codec.issue_refresh(user).unwrap()).is_err());
        assert!(codec.verify_refresh(&codec.issue_access(user).unwrap()).is_err());
    }

    #[test]
    fn tokens_minted_together_differ() {
        let codec = codec();
        let user = Uuid::new_v4();
        assert_ne!(codec.issue_access(user).unwrap(), codec.issue_access(user).unwrap());
        assert_ne!(codec.issue_refresh(user).unwrap(), codec.issue_refresh(user).unwrap());
    }

    #[test]
    fn expired_token_is_rejected() {
        // Well past the default 60 second leeway.
        let codec = TokenCodec::new(
            "access-secret-for-tests",
            "refresh-secret-for-tests",
            Duration::minutes(-10),
            Duration::days(7),
        );
        let token = codec.issue_access(Uuid::new_v4()).unwrap();
        assert!(codec.verify_access(&token).is_err());
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let token = codec().issue_access(Uuid::new_v4()).unwrap();
        let other = TokenCodec::with_default_ttls("another-access-secret", "another-refresh-secret");
        assert!(other.verify_access(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(codec().verify_refresh("not.a.token").is_err());
        assert!(codec().verify_refresh("").is_err());
    }
}
