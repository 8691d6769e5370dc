//! Caller identity supplied by the upstream authentication layer.

use crate::error::{Result, ServiceError};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";
pub const SCOPES_HEADER: &str = "x-user-scopes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    SuperAdmin,
    Admin,
    User,
}

#[derive(Debug, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub role: Role,
    pub scopes: Vec<String>,
}

impl Claims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|allowed| allowed == scope)
    }
}

/// Per-request context. Claims are absent when the caller was not authenticated.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    claims: Option<Claims>,
}

impl CallContext {
    pub fn new(claims: Claims) -> Self {
        Self {
            claims: Some(claims),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Reads claims forwarded by the gateway. An unknown role is treated as no claims.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let claims = header(USER_ID_HEADER).and_then(|user_id| {
            let role = header(ROLE_HEADER)?.parse::<Role>().ok()?;
            let scopes = header(SCOPES_HEADER)
                .map(|csv| {
                    csv.split(',')
                        .map(str::trim)
                        .filter(|scope| !scope.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(Claims {
                user_id: user_id.to_string(),
                role,
                scopes,
            })
        });

        Self { claims }
    }

    pub fn claims(&self) -> Result<&Claims> {
        self.claims.as_ref().ok_or(ServiceError::Unauthenticated)
    }

    /// Checks every requested scope is granted to the caller and returns the first one,
    /// which single-scope operations act on.
    pub fn authorize<'a>(&self, scopes: &'a [String]) -> Result<&'a str> {
        let claims = self.claims()?;
        let first = scopes
            .first()
            .ok_or_else(|| ServiceError::invalid("scope is required"))?;
        if let Some(denied) = scopes.iter().find(|scope| !claims.has_scope(scope)) {
            return Err(ServiceError::PermissionDenied(format!(
                "no access to scope '{denied}'"
            )));
        }
        Ok(first.as_str())
    }

    /// Like `authorize`, and additionally requires an administrator role.
    pub fn authorize_admin<'a>(&self, scopes: &'a [String]) -> Result<&'a str> {
        let scope = self.authorize(scopes)?;
        match self.claims()?.role {
            Role::SuperAdmin | Role::Admin => Ok(scope),
            Role::User => Err(ServiceError::PermissionDenied(
                "only admin users can import metrics".into(),
            )),
        }
    }
}
