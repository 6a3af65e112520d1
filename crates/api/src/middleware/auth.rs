//! Bearer-token authentication and the page-owner check.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use shopfront_core::error::CoreError;
use shopfront_core::types::{DbId, PageId};
use shopfront_persistence::LayoutStore;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// Role that passes the owner check for every page.
pub const ROLE_ADMIN: &str = "admin";

/// Authenticated account extracted from a JWT Bearer token in the
/// `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The account id (from `claims.sub`).
    pub user_id: DbId,
    pub role: String,
}

fn unauthorized(msg: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(msg.into()))
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Invalid Authorization format. Expected: Bearer <token>"))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = validate_token(token, &state.config.jwt)
            .map_err(|_| unauthorized("Invalid or expired token"))?;

        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Allow the request only if this account owns `page_id` or is an admin.
    ///
    /// A page nobody has saved yet has no owner and may be claimed by the
    /// account that saves it first. Returns the current owner, if any.
    pub async fn authorize_page(
        &self,
        store: &dyn LayoutStore,
        page_id: PageId,
    ) -> Result<Option<DbId>, AppError> {
        let owner = store.owner_of(page_id).await?;
        match owner {
            Some(owner_id) if owner_id != self.user_id && self.is_admin() => {
                tracing::info!(page_id, user_id = self.user_id, owner_id, "Admin access to page");
                Ok(owner)
            }
            Some(owner_id) if owner_id != self.user_id => {
                tracing::warn!(
                    page_id,
                    user_id = self.user_id,
                    owner_id,
                    "Rejected access to another account's page"
                );
                Err(AppError::Core(CoreError::Forbidden(format!(
                    "Page {page_id} belongs to another account"
                ))))
            }
            _ => Ok(owner),
        }
    }
}
