//! Registration, login, access-token refresh and logout.
//!
//! Each account holds at most one live refresh token, stored on the user
//! record. A refresh token is honoured only while it is both correctly
//! signed and byte-equal to the stored value, so issuing a new one (login)
//! or clearing it (logout) revokes the previous session.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_db::CredentialStore;
use parley_db::models::{NewUser, UserRow};
use parley_types::api::Claims;
use parley_types::models::{ProfilePic, UserSummary};

use crate::error::{ServiceError, ServiceResult};
use crate::password::CredentialHasher;
use crate::tokens::TokenCodec;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Shared by both login failure paths so the response does not reveal
/// whether the email exists.
const BAD_CREDENTIALS: &str = "Invalid email or password";
const INVALID_REFRESH: &str = "Invalid refresh token";

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub profile_pic: Option<ProfilePic>,
}

/// Result of register/login. The refresh token is meant for the cookie,
/// the access token for the response body.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: UserSummary,
    pub access_token: String,
    pub refresh_token: String,
}

pub struct SessionManager<S> {
    store: Arc<S>,
    hasher: CredentialHasher,
    tokens: TokenCodec,
}

impl<S: CredentialStore> SessionManager<S> {
    pub fn new(store: Arc<S>, hasher: CredentialHasher, tokens: TokenCodec) -> Self {
        Self {
            store,
            hasher,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub fn register(&self, req: Registration) -> ServiceResult<IssuedSession> {
        if req.username.is_empty() || req.email.is_empty() || req.password.is_empty() {
            return Err(ServiceError::validation("Missing required fields"));
        }
        if req.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        if !is_valid_email(&req.email) {
            return Err(ServiceError::validation("Invalid email format"));
        }

        if self.store.find_user_by_email(&req.email)?.is_some() {
            return Err(ServiceError::conflict("User already exists"));
        }

        let password_hash = self.hasher.hash(&req.password)?;
        let user_id = Uuid::new_v4();
        let refresh_token = self.tokens.issue_refresh(user_id).map_err(token_failure)?;
        let access_token = self.tokens.issue_access(user_id).map_err(token_failure)?;

        // The row is written once, already carrying its first refresh token.
        let created = self.store.create_user(&NewUser {
            id: user_id.to_string(),
            username: req.username.clone(),
            email: req.email.clone(),
            password_hash,
            profile_pic: req.profile_pic.map(|p| (p.data, p.content_type)),
            refresh_token: Some(refresh_token.clone()),
            created_at: chrono::Utc::now().to_rfc3339(),
        })?;
        if !created {
            // Lost a race against a concurrent registration for the same email.
            return Err(ServiceError::conflict("User already exists"));
        }

        info!(%user_id, "User registered");

        Ok(IssuedSession {
            user: UserSummary {
                id: user_id,
                username: req.username,
                email: req.email,
            },
            access_token,
            refresh_token,
        })
    }

    pub fn login(&self, email: &str, password: &str) -> ServiceResult<IssuedSession> {
        if email.is_empty() || password.is_empty() {
            return Err(ServiceError::validation("Email and password are required"));
        }

        let Some(user) = self.store.find_user_by_email(email)? else {
            debug!("Login for unknown email");
            return Err(ServiceError::unauthorized(BAD_CREDENTIALS));
        };

        if !self.hasher.verify(password, &user.password)? {
            warn!(user_id = %user.id, "Login with wrong password");
            return Err(ServiceError::unauthorized(BAD_CREDENTIALS));
        }

        let summary = summarize(&user)?;
        let refresh_token = self.tokens.issue_refresh(summary.id).map_err(token_failure)?;
        let access_token = self.tokens.issue_access(summary.id).map_err(token_failure)?;

        // Overwrites any previous token, ending the earlier session.
        if !self.store.set_refresh_token(&user.id, &refresh_token)? {
            return Err(ServiceError::unauthorized(BAD_CREDENTIALS));
        }

        info!(user_id = %summary.id, "User logged in");

        Ok(IssuedSession {
            user: summary,
            access_token,
            refresh_token,
        })
    }

    /// Mints a new access token. The refresh token itself is not rotated.
    pub fn refresh(&self, presented: Option<&str>) -> ServiceResult<String> {
        let token = presented
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::unauthorized("No refresh token"))?;

        let claims = self
            .tokens
            .verify_refresh(token)
            .map_err(|_| ServiceError::unauthorized(INVALID_REFRESH))?;

        let user = self
            .store
            .get_user_by_id(&claims.sub.to_string())?
            .ok_or_else(|| ServiceError::unauthorized(INVALID_REFRESH))?;

        if user.refresh_token.as_deref() != Some(token) {
            debug!(user_id = %claims.sub, "Stale refresh token presented");
            return Err(ServiceError::unauthorized(INVALID_REFRESH));
        }

        self.tokens.issue_access(claims.sub).map_err(token_failure)
    }

    /// Revokes the account's stored refresh token whenever the presented one
    /// verifies, even if a later login has since replaced it.
    /// Never fails: the caller discards its cookie regardless.
    pub fn logout(&self, presented: Option<&str>) {
        let Some(token) = presented.filter(|t| !t.is_empty()) else {
            return;
        };
        let Ok(claims) = self.tokens.verify_refresh(token) else {
            debug!("Logout with unverifiable refresh token");
            return;
        };

        match self.store.clear_refresh_token(&claims.sub.to_string()) {
            Ok(true) => info!(user_id = %claims.sub, "User logged out"),
            Ok(false) => debug!(user_id = %claims.sub, "Logout for unknown user"),
            Err(e) => warn!(user_id = %claims.sub, "Failed to revoke refresh token: {:#}", e),
        }
    }

    /// Stateless bearer check for protected routes.
    pub fn authenticate(&self, access_token: &str) -> ServiceResult<Claims> {
        self.tokens
            .verify_access(access_token)
            .map_err(|_| ServiceError::unauthorized("Invalid or expired token"))
    }
}

/// `local@domain.tld`: no whitespace, a single `@`, and a dot inside the domain
/// with at least one character on each side.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

fn summarize(row: &UserRow) -> ServiceResult<UserSummary> {
    let id = row
        .id
        .parse::<Uuid>()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", row.id, e))?;
    Ok(UserSummary {
        id,
        username: row.username.clone(),
        email: row.email.clone(),
    })
}

fn token_failure(e: jsonwebtoken::errors::Error) -> ServiceError {
    error!("Token signing failed: {}", e);
    ServiceError::internal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_db::Database;

    fn manager() -> SessionManager<Database> {
        SessionManager::new(
            Arc::new(Database::open_in_memory().unwrap()),
            CredentialHasher::with_cost(256, 1, 1).unwrap(),
            TokenCodec::with_default_ttls("access-secret", "refresh-secret"),
        )
    }

    fn alice() -> Registration {
        Registration {
            username: "alice".into(),
            email: "a@x.com".into(),
            password: "secret1".into(),
            profile_pic: None,
        }
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@mail.example.org"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a@x."));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("a@b@x.com"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("ax.com"));
    }

    #[test]
    fn register_returns_public_fields_and_tokens() {
        let sessions = manager();
        let issued = sessions.register(alice()).unwrap();

        assert_eq!(issued.user.email, "a@x.com");
        assert_eq!(issued.user.username, "alice");
        let claims = sessions.authenticate(&issued.access_token).unwrap();
        assert_eq!(claims.sub, issued.user.id);

        let stored = sessions.store.get_user_by_id(&issued.user.id.to_string()).unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(issued.refresh_token.as_str()));
        assert_ne!(stored.password, "secret1");
    }

    #[test]
    fn register_stores_profile_picture() {
        let sessions = manager();
        let issued = sessions
            .register(Registration {
                profile_pic: Some(ProfilePic {
                    content_type: "image/png".into(),
                    data: vec![0x89, b'P', b'N', b'G'],
                }),
                ..alice()
            })
            .unwrap();

        let stored = sessions.store.get_user_by_id(&issued.user.id.to_string()).unwrap().unwrap();
        assert_eq!(stored.profile_pic.as_deref(), Some(&[0x89, b'P', b'N', b'G'][..]));
        assert_eq!(stored.profile_pic_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn uploaded_picture_without_type_is_stored_as_jpeg() {
        let sessions = manager();
        let req: parley_types::api::RegisterRequest = serde_json::from_str(
            r#"{"username":"alice","email":"a@x.com","password":"secret1","profilePic":{"data":"/9j/"}}"#,
        )
        .unwrap();
        let issued = sessions
            .register(Registration {
                username: req.username,
                email: req.email,
                password: req.password,
                profile_pic: req.profile_pic,
            })
            .unwrap();

        let stored = sessions.store.get_user_by_id(&issued.user.id.to_string()).unwrap().unwrap();
        assert_eq!(stored.profile_pic.as_deref(), Some(&[0xff, 0xd8, 0xff][..]));
        assert_eq!(stored.profile_pic_type.as_deref(), Some("image/jpeg"));

        let plain = sessions
            .register(Registration { email: "b@x.com".into(), ..alice() })
            .unwrap();
        let stored = sessions.store.get_user_by_id(&plain.user.id.to_string()).unwrap().unwrap();
        assert!(stored.profile_pic.is_none());
        assert!(stored.profile_pic_type.is_none());
    }

    #[test]
    fn register_validates_before_touching_the_store() {
        let sessions = manager();
        let cases = [
            Registration { username: String::new(), ..alice() },
            Registration { password: "12345".into(), ..alice() },
            Registration { email: "not-an-email".into(), ..alice() },
        ];
        for case in cases {
            assert!(matches!(sessions.register(case), Err(ServiceError::Validation(_))));
        }
        assert!(sessions.store.find_user_by_email("a@x.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_conflicts_and_keeps_first_user() {
        let sessions = manager();
        let first = sessions.register(alice()).unwrap();
        let before = sessions.store.find_user_by_email("a@x.com").unwrap().unwrap();

        let second = sessions.register(Registration {
            username: "mallory".into(),
            password: "another-password".into(),
            ..alice()
        });
        assert!(matches!(second, Err(ServiceError::Conflict(_))));

        let after = sessions.store.find_user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(after.id, first.user.id.to_string());
        assert_eq!(after.username, "alice");
        assert_eq!(after.password, before.password);
        assert_eq!(after.refresh_token, before.refresh_token);
    }

    #[test]
    fn login_failures_are_indistinguishable() {
        let sessions = manager();
        sessions.register(alice()).unwrap();

        let wrong_password = sessions.login("a@x.com", "wrong-password").unwrap_err();
        let unknown_email = sessions.login("nobody@x.com", "secret1").unwrap_err();

        assert!(matches!(wrong_password, ServiceError::Unauthorized(_)));
        assert!(matches!(unknown_email, ServiceError::Unauthorized(_)));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[test]
    fn login_requires_both_fields() {
        let sessions = manager();
        assert!(matches!(sessions.login("", "secret1"), Err(ServiceError::Validation(_))));
        assert!(matches!(sessions.login("a@x.com", ""), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn login_rotates_refresh_token() {
        let sessions = manager();
        sessions.register(alice()).unwrap();

        let first = sessions.login("a@x.com", "secret1").unwrap();
        let second = sessions.login("a@x.com", "secret1").unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        assert!(matches!(
            sessions.refresh(Some(&first.refresh_token)),
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(sessions.refresh(Some(&second.refresh_token)).is_ok());
    }

    #[test]
    fn refresh_rejects_missing_and_forged_tokens() {
        let sessions = manager();
        assert!(matches!(sessions.refresh(None), Err(ServiceError::Unauthorized(_))));
        assert!(matches!(sessions.refresh(Some("")), Err(ServiceError::Unauthorized(_))));
        assert!(matches!(sessions.refresh(Some("garbage")), Err(ServiceError::Unauthorized(_))));

        // Well-formed but for a user that does not exist.
        let orphan = sessions.tokens.issue_refresh(Uuid::new_v4()).unwrap();
        assert!(matches!(sessions.refresh(Some(&orphan)), Err(ServiceError::Unauthorized(_))));

        // An access token is not a refresh token.
        let issued = sessions.register(alice()).unwrap();
        assert!(matches!(
            sessions.refresh(Some(&issued.access_token)),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn full_session_lifecycle() {
        let sessions = manager();
        let registered = sessions.register(alice()).unwrap();
        assert_eq!(registered.user.email, "a@x.com");

        let login = sessions.login("a@x.com", "secret1").unwrap();
        let renewed = sessions.refresh(Some(&login.refresh_token)).unwrap();
        assert_ne!(renewed, login.access_token);
        assert_eq!(
            sessions.authenticate(&renewed).unwrap().sub,
            sessions.authenticate(&login.access_token).unwrap().sub
        );

        sessions.logout(Some(&login.refresh_token));
        assert!(matches!(
            sessions.refresh(Some(&login.refresh_token)),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn logout_is_idempotent() {
        let sessions = manager();
        let issued = sessions.register(alice()).unwrap();

        sessions.logout(None);
        sessions.logout(Some(""));
        sessions.logout(Some("garbage"));
        sessions.logout(Some(&issued.refresh_token));
        sessions.logout(Some(&issued.refresh_token));

        let stored = sessions.store.find_user_by_email("a@x.com").unwrap().unwrap();
        assert!(stored.refresh_token.is_none());
    }

    #[test]
    fn logout_with_superseded_token_revokes_current_session() {
        let sessions = manager();
        let old = sessions.register(alice()).unwrap();
        let current = sessions.login("a@x.com", "secret1").unwrap();

        sessions.logout(Some(&old.refresh_token));

        let stored = sessions.store.find_user_by_email("a@x.com").unwrap().unwrap();
        assert!(stored.refresh_token.is_none());
        assert!(matches!(
            sessions.refresh(Some(&current.refresh_token)),
            Err(ServiceError::Unauthorized(_))
        ));
    }
}
