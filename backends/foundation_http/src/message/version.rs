use crate::errors::{HttpError, HttpResult};

/// Supported protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    /// Parses `1.0` or `1.1`.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` for any other value.
    pub fn parse(value: &str) -> HttpResult<Self> {
        match value {
            "1.0" => Ok(Self::Http10),
            "1.1" => Ok(Self::Http11),
            other => Err(HttpError::InvalidArgument(format!(
                "Not valid or not supported HTTP version: {other}"
            ))),
        }
    }

    /// The numeric form, e.g. `1.1`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http10 => "1.0",
            Self::Http11 => "1.1",
        }
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP/{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versions() {
        assert_eq!(Version::parse("1.0").unwrap(), Version::Http10);
        assert_eq!(Version::parse("1.1").unwrap().to_string(), "HTTP/1.1");
        assert!(Version::parse("2.0").unwrap_err().is_invalid_argument());
    }
}
