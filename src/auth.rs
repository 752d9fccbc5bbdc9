//! Principal extraction from headers set by the upstream session gateway.
//!
//! Sessions live outside this service; the gateway forwards the
//! authenticated user's id and role, and handlers pick the extractor that
//! matches the role they require.

use std::str::FromStr;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Driver,
    Station,
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "driver" => Ok(Role::Driver),
            "station" => Ok(Role::Station),
            other => Err(AppError::Unauthorized(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
        };

        let user_id = Uuid::parse_str(header(USER_ID_HEADER)?)
            .map_err(|_| AppError::Unauthorized(format!("malformed {USER_ID_HEADER} header")))?;
        let role = header(USER_ROLE_HEADER)?.parse()?;

        Ok(Principal { user_id, role })
    }
}

/// Only drivers; every trip operation is scoped to the driver's own id.
pub struct RequireDriver(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for RequireDriver
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;
        if principal.role != Role::Driver {
            return Err(AppError::Forbidden("driver role required".to_string()));
        }
        Ok(RequireDriver(principal))
    }
}

/// Ticket desk roles: admin, staff and station.
pub struct RequireStaff(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for RequireStaff
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;
        if principal.role == Role::Driver {
            return Err(AppError::Forbidden("staff role required".to_string()));
        }
        Ok(RequireStaff(principal))
    }
}

pub struct RequireAdmin(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;
        if principal.role != Role::Admin {
            return Err(AppError::Forbidden("admin role required".to_string()));
        }
        Ok(RequireAdmin(principal))
    }
}
