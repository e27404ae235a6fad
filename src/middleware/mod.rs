// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules.

pub mod ops_auth;

pub use ops_auth::{require_ops_token, OPS_TOKEN_HEADER};
