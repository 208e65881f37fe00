use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::errors::{HttpError, HttpResult};

/// Authentication schemes the client can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthType {
    #[default]
    Basic,
}

/// Credentials attached to every request of a client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
    auth_type: AuthType,
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("auth_type", &self.auth_type)
            .finish()
    }
}

impl Credentials {
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` when user or password is empty, or when a
    /// Basic user name contains ':'.
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        auth_type: AuthType,
    ) -> HttpResult<Self> {
        let user = user.into();
        let password = password.into();

        if user.is_empty() || password.is_empty() {
            return Err(HttpError::InvalidArgument(
                "The username and the password cannot be empty".into(),
            ));
        }
        if auth_type == AuthType::Basic && user.contains(':') {
            return Err(HttpError::InvalidArgument(
                "The user name cannot contain ':' in Basic HTTP authentication".into(),
            ));
        }

        Ok(Self {
            user,
            password,
            auth_type,
        })
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    /// The `Authorization` header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        match self.auth_type {
            AuthType::Basic => format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", self.user, self.password))
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// WHY: Basic credentials are base64 of user:password
    /// WHAT: Encodes the RFC 7617 example
    #[test]
    fn test_basic_header_value() {
        let credentials = Credentials::new("Aladdin", "open sesame", AuthType::Basic).unwrap();
        assert_eq!(
            credentials.header_value(),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    /// WHY: Empty credentials and ':' in Basic user names are invalid
    /// WHAT: Builds rejected credentials
    #[test]
    fn test_invalid_credentials() {
        assert!(Credentials::new("", "pw", AuthType::Basic)
            .unwrap_err()
            .is_invalid_argument());
        assert!(Credentials::new("user", "", AuthType::Basic)
            .unwrap_err()
            .is_invalid_argument());
        assert!(Credentials::new("us:er", "pw", AuthType::Basic)
            .unwrap_err()
            .is_invalid_argument());
    }

    /// WHY: Passwords must not end up in logs
    /// WHAT: Formats credentials with Debug
    #[test]
    fn test_debug_redacts_password() {
        let credentials = Credentials::new("user", "hunter2", AuthType::Basic).unwrap();
        let printed = format!("{credentials:?}");
        assert!(printed.contains("user"));
        assert!(!printed.contains("hunter2"));
    }
}
