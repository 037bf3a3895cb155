//! Authentication module for the Warden server
//!
//! This module handles credential verification, token issuance,
//! refresh-token rotation, and session revocation.

pub mod handlers;
mod password;
mod service;
mod tokens;

pub use service::{AuthService, LoginOutcome, TokenPair};
pub use tokens::{generate_refresh_token, token_digest, AccessClaims, TokenIssuer};
