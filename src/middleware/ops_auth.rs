// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ops-token middleware for the trigger and per-event routes.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const OPS_TOKEN_HEADER: &str = "x-ops-token";

/// Require `x-ops-token` to match the configured token for `/tasks/*` routes.
pub async fn require_ops_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected = state.config.ops_token.as_bytes();
    let presented = request
        .headers()
        .get(OPS_TOKEN_HEADER)
        .map(|h| h.as_bytes());

    let authorized = match presented {
        Some(token) if !expected.is_empty() => bool::from(token.ct_eq(expected)),
        _ => false,
    };

    if !authorized {
        tracing::warn!(
            path = %request.uri().path(),
            header_present = presented.is_some(),
            "Blocked tasks request with invalid ops token"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
