//! Admin capability check for the surfaces that call into the registrar.
//!
//! The registration pipeline itself never authenticates anyone. An outer
//! surface (the `pdfseal` CLI, a web handler) logs the operator in with
//! [`AdminCredentials::login`] and only calls
//! [`crate::Registrar::register`] when the resulting
//! [`AccessPolicy::is_authorized`] returns `true`.

use crate::error::RegistryError;
use std::fmt;

/// Environment variable holding the admin user name.
pub const ENV_ADMIN_USER: &str = "ADMIN_USER";
/// Environment variable holding the admin password.
pub const ENV_ADMIN_PASS: &str = "ADMIN_PASS";

/// Capability check handed to an outer surface.
pub trait AccessPolicy {
    fn is_authorized(&self) -> bool;
}

/// The configured admin login.
#[derive(Clone)]
pub struct AdminCredentials {
    user: String,
    password: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AdminCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Result<Self, RegistryError> {
        let user = user.into();
        let password = password.into();
        if user.trim().is_empty() {
            return Err(RegistryError::InvalidConfig("admin user must not be empty".into()));
        }
        if password.is_empty() {
            return Err(RegistryError::InvalidConfig(
                "admin password must not be empty".into(),
            ));
        }
        Ok(Self { user, password })
    }

    /// Read `ADMIN_USER` (default `admin`) and `ADMIN_PASS` (required).
    pub fn from_env() -> Result<Self, RegistryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RegistryError> {
        let user = lookup(ENV_ADMIN_USER).unwrap_or_else(|| "admin".to_string());
        let password = lookup(ENV_ADMIN_PASS).ok_or_else(|| {
            RegistryError::InvalidConfig(format!("{ENV_ADMIN_PASS} is not set"))
        })?;
        Self::new(user, password)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Compare a login attempt against the configured credentials.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        // Evaluate both comparisons so timing does not reveal which one failed.
        let user_ok = constant_time_eq(self.user.as_bytes(), user.as_bytes());
        let password_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        user_ok & password_ok
    }

    /// Attempt a login; the session is authorized only if the credentials match.
    pub fn login(&self, user: &str, password: &str) -> AdminSession {
        AdminSession {
            authorized: self.verify(user, password),
        }
    }
}

/// Outcome of [`AdminCredentials::login`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdminSession {
    authorized: bool,
}

impl AccessPolicy for AdminSession {
    fn is_authorized(&self) -> bool {
        self.authorized
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> AdminCredentials {
        AdminCredentials::new("admin", "s3cret").unwrap()
    }

    #[test]
    fn matching_login_is_authorized() {
        assert!(creds().login("admin", "s3cret").is_authorized());
    }

    #[test]
    fn wrong_password_or_user_is_rejected() {
        assert!(!creds().login("admin", "s3cre").is_authorized());
        assert!(!creds().login("root", "s3cret").is_authorized());
        assert!(!creds().login("", "").is_authorized());
    }

    #[test]
    fn default_session_is_unauthorized() {
        assert!(!AdminSession::default().is_authorized());
    }

    #[test]
    fn debug_redacts_password() {
        let dbg = format!("{:?}", creds());
        assert!(dbg.contains("admin"));
        assert!(!dbg.contains("s3cret"));
    }

    #[test]
    fn from_lookup_requires_password() {
        let err = AdminCredentials::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfig(_)));

        let creds = AdminCredentials::from_lookup(|k| {
            (k == ENV_ADMIN_PASS).then(|| "pw".to_string())
        })
        .unwrap();
        assert_eq!(creds.user(), "admin");
        assert!(creds.verify("admin", "pw"));
    }
}
