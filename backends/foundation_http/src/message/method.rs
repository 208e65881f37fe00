use crate::errors::{HttpError, HttpResult};
use crate::headers::is_token;

/// HTTP request method.
///
/// Standard verbs are matched case-insensitively and stored uppercase; anything else
/// must be a valid HTTP token and is kept exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Method {
    Options,
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Custom(String),
}

impl Method {
    /// Parses a method name.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` when a non-standard method is not a token.
    pub fn parse(value: &str) -> HttpResult<Self> {
        let method = match value.to_ascii_uppercase().as_str() {
            "OPTIONS" => Self::Options,
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "TRACE" => Self::Trace,
            "CONNECT" => Self::Connect,
            _ => {
                if !is_token(value) {
                    return Err(HttpError::InvalidArgument(format!(
                        "Invalid HTTP method '{value}' passed"
                    )));
                }
                Self::Custom(value.to_string())
            }
        };
        Ok(method)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Options => "OPTIONS",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
            Self::Custom(name) => name,
        }
    }
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
