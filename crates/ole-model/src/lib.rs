//! Data-transfer objects for the OIDC login example.
//!
//! This crate holds the identity provider's password policy model as it is
//! returned by the management API (HAL+JSON). It carries no I/O; callers fetch
//! the JSON and deserialize it into these types.
//!
//! The crate is standalone: the login server does not depend on it.

pub mod password_policy;

pub use password_policy::{Length, PasswordPolicies, PasswordPolicy, PolicyViolation};
