use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;

use crate::errors::AppError;
use crate::state::AppState;
use crate::user::{Role, User};

const SCHEME: &str = "TOKEN";

fn extract_api_key(parts: &Parts) -> Result<String, AppError> {
    let header = parts
        .headers
        .get("Authorization")
        .ok_or(AppError::AuthMissing)?
        .to_str()
        .map_err(|_| AppError::AuthMalformed)?;
    let (scheme, key) = header.split_once(' ').ok_or(AppError::AuthMalformed)?;
    if scheme != SCHEME || key.is_empty() {
        return Err(AppError::AuthMalformed);
    }
    Ok(key.to_string())
}

/// Resolves `Authorization: TOKEN <api_key>` into the caller's identity
/// (spec.md §6). Grounded on the original source's `get_api_key`
/// dependency: missing/malformed header is a 401, an unrecognized key is
/// a 404 (the user "doesn't exist" from the caller's point of view).
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = extract_api_key(parts)?;
        let State(state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Internal("state extraction failed".into()))?;
        let user = state
            .users
            .get_by_api_key(&key)
            .ok_or(AppError::AuthUnknown)?;
        Ok(AuthUser(user))
    }
}

/// Same resolution as [`AuthUser`], additionally requiring `ADMIN` role
/// (spec.md §6: "Non-admin hitting admin route -> 403").
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}
