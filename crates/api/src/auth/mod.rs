//! Bearer-token validation. Token issuance belongs to the auth service;
//! [`jwt::issue_token`] exists for tests and operational tooling.

pub mod jwt;
