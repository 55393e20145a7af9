//! HTTP surface for the billing core.
//!
//! The core is invoked over conventional HTTP endpoints; authentication
//! itself is an external collaborator, so this layer trusts the identity
//! headers stamped by the upstream gateway (`X-User-Id`, `X-Roles`,
//! `X-Company-Id`) and turns them into an [`AuthContext`].

pub mod routes;

pub use routes::{router, AppState};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::{AuthContext, Role};
use crate::error::TasklyError;
use crate::ids::{CompanyId, UserId};

impl<S: Send + Sync> FromRequestParts<S> for AuthContext {
    type Rejection = TasklyError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, "x-user-id")?
            .ok_or_else(|| TasklyError::unauthorized("missing X-User-Id header"))?;
        let user_id = user_id
            .parse::<uuid::Uuid>()
            .map_err(|_| TasklyError::unauthorized("invalid X-User-Id header"))?;

        let roles = header(parts, "x-roles")?
            .ok_or_else(|| TasklyError::unauthorized("missing X-Roles header"))?
            .split(',')
            .map(|s| {
                s.trim()
                    .parse::<Role>()
                    .map_err(|e| TasklyError::unauthorized(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut ctx = AuthContext::new(UserId(user_id), roles);

        if let Some(company) = header(parts, "x-company-id")? {
            let company = company
                .parse::<uuid::Uuid>()
                .map_err(|_| TasklyError::unauthorized("invalid X-Company-Id header"))?;
            ctx = ctx.for_company(CompanyId(company));
        }

        Ok(ctx)
    }
}

fn header(parts: &Parts, name: &str) -> Result<Option<String>, TasklyError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.to_string()))
            .map_err(|_| TasklyError::unauthorized(format!("invalid {} header", name))),
    }
}
