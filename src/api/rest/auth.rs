use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, Role};

// Identity and token verification live in the upstream gateway; it forwards
// the authenticated actor in these headers and we only do per-ride
// authorization here.
const ACTOR_ID_HEADER: &str = "x-actor-id";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header_value(parts, ACTOR_ID_HEADER)?;
        let id = id
            .parse::<Uuid>()
            .map_err(|_| AppError::Unauthenticated(format!("invalid {ACTOR_ID_HEADER}")))?;

        let role = header_value(parts, ACTOR_ROLE_HEADER)?;
        let role = Role::parse(&role)
            .ok_or_else(|| AppError::Unauthenticated(format!("invalid {ACTOR_ROLE_HEADER}")))?;

        Ok(Actor { id, role })
    }
}

fn header_value(parts: &Parts, name: &str) -> Result<String, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .ok_or_else(|| AppError::Unauthenticated(format!("missing {name} header")))
}
