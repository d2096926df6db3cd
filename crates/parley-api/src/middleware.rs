use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::AppState;
use crate::error::ServiceError;

/// Extract and validate the bearer access token. Signature and expiry only;
/// the verified claims are attached to the request for handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::unauthorized("No token"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServiceError::unauthorized("No token"))?;

    let claims = state.sessions.authenticate(token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
