use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use parley_db::Database;
use parley_types::api::{AuthResponse, LoginRequest, RegisterRequest, StatusMessage, TokenResponse};

use crate::conversations::ConversationResolver;
use crate::error::ServiceError;
use crate::password::CredentialHasher;
use crate::run_blocking;
use crate::session::{Registration, SessionManager};
use crate::tokens::TokenCodec;

pub const REFRESH_COOKIE: &str = "refresh_token";

/// The refresh cookie is only ever sent back to the session endpoints.
const REFRESH_COOKIE_PATH: &str = "/auth";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub sessions: SessionManager<Database>,
    pub chats: ConversationResolver<Database>,
    pub secure_cookies: bool,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        hasher: CredentialHasher,
        tokens: TokenCodec,
        secure_cookies: bool,
    ) -> Self {
        Self {
            sessions: SessionManager::new(db.clone(), hasher, tokens),
            chats: ConversationResolver::new(db),
            secure_cookies,
        }
    }

    fn refresh_cookie(&self, token: String) -> Cookie<'static> {
        let max_age = self.sessions.tokens().refresh_ttl().num_seconds();
        Cookie::build((REFRESH_COOKIE, token))
            .path(REFRESH_COOKIE_PATH)
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure_cookies)
            .max_age(time::Duration::seconds(max_age))
            .build()
    }
}

fn presented_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE).map(|c| c.value().to_string())
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = body?;

    let st = state.clone();
    let issued = run_blocking(move || {
        st.sessions.register(Registration {
            username: req.username,
            email: req.email,
            password: req.password,
            profile_pic: req.profile_pic,
        })
    })
    .await?;

    let jar = jar.add(state.refresh_cookie(issued.refresh_token));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            user: issued.user,
            token: issued.access_token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = body?;

    let st = state.clone();
    let issued = run_blocking(move || st.sessions.login(&req.email, &req.password)).await?;

    let jar = jar.add(state.refresh_cookie(issued.refresh_token));

    Ok((
        jar,
        Json(AuthResponse {
            user: issued.user,
            token: issued.access_token,
        }),
    ))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<TokenResponse>, ServiceError> {
    let presented = presented_token(&jar);
    let token = run_blocking(move || state.sessions.refresh(presented.as_deref())).await?;
    Ok(Json(TokenResponse { token }))
}

/// Always succeeds and always removes the cookie, whatever it held.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let presented = presented_token(&jar);
    let _ = run_blocking(move || {
        state.sessions.logout(presented.as_deref());
        Ok(())
    })
    .await;

    let jar = jar.remove(Cookie::build(REFRESH_COOKIE).path(REFRESH_COOKIE_PATH));

    (
        jar,
        Json(StatusMessage {
            message: "Logged out".into(),
        }),
    )
}
