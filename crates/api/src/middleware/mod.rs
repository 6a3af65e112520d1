//! Request extractors.
//!
//! - [`auth::AuthUser`] -- the authenticated account behind a Bearer token,
//!   plus the page-owner check.

pub mod auth;
