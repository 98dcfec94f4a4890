//! Request authentication against gRPC metadata.
//!
//! Every gNMI/gNOI RPC carries `username` and `password` metadata keys;
//! the authenticator checks them against its registered users.

use std::collections::HashMap;

use tonic::metadata::MetadataMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct User {
    username: String,
    password: String,
}

/// Username/password store checked against per-RPC request metadata.
#[derive(Debug, Default, Clone)]
pub struct Authenticator {
    users: HashMap<String, User>,
}

impl Authenticator {
    /// Create an authenticator seeded with the admin user.
    pub fn new(admin_username: impl Into<String>, admin_password: impl Into<String>) -> Self {
        let mut a = Self { users: HashMap::new() };
        a.add_user(admin_username, admin_password);
        a
    }

    /// Register an additional user.
    pub fn add_user(&mut self, username: impl Into<String>, password: impl Into<String>) {
        let username = username.into();
        self.users.insert(
            username.clone(),
            User { username, password: password.into() },
        );
    }

    /// Check the credentials carried in the request metadata.
    pub fn authorize(&self, metadata: &MetadataMap) -> Result<()> {
        let username = metadata
            .get("username")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::PermissionDenied("no username in metadata".to_string()))?;

        let password = metadata
            .get("password")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                Error::PermissionDenied(format!(
                    "found username \"{}\" but no password in metadata",
                    username
                ))
            })?;

        if let Some(user) = self.users.get(username) {
            if user.password == password && user.username == username {
                return Ok(());
            }
        }

        Err(Error::PermissionDenied(format!(
            "not authorized with \"{}:{}\"",
            username, password
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&'static str, &'static str)]) -> MetadataMap {
        let mut m = MetadataMap::new();
        for (k, v) in pairs {
            m.insert(*k, v.parse().unwrap());
        }
        m
    }

    #[test]
    fn test_authorize_valid() {
        let auth = Authenticator::new("admin", "testpassword");
        let m = metadata(&[("username", "admin"), ("password", "testpassword")]);
        assert!(auth.authorize(&m).is_ok());
    }

    #[test]
    fn test_authorize_wrong_password() {
        let auth = Authenticator::new("admin", "testpassword");
        let m = metadata(&[("username", "admin"), ("password", "nope")]);
        assert!(auth.authorize(&m).is_err());
    }

    #[test]
    fn test_authorize_missing_metadata() {
        let auth = Authenticator::new("admin", "testpassword");
        assert!(auth.authorize(&MetadataMap::new()).is_err());

        let m = metadata(&[("username", "admin")]);
        assert!(auth.authorize(&m).is_err());
    }
}
