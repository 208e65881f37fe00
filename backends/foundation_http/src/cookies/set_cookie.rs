use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use crate::errors::{HttpError, HttpResult};
use crate::headers::is_token;

/// Date layouts seen in `Expires` attributes, besides RFC 2822.
const EXPIRES_FORMATS: &[&str] = &[
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%a, %d-%b-%Y %H:%M:%S GMT",
    "%a, %d %b %Y %H:%M:%S GMT",
    "%a %b %e %H:%M:%S %Y",
];

/// A parsed `Set-Cookie` header value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl SetCookie {
    /// Parses `name=value; Domain=..; Path=..; Expires=..; Max-Age=..; Secure; HttpOnly`.
    ///
    /// Attribute names are case-insensitive and unknown attributes are ignored, as is
    /// an `Expires` date that cannot be parsed.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` when the leading `name=value` pair is
    /// missing or the name is not a token.
    pub fn parse(header_value: &str) -> HttpResult<Self> {
        let mut parts = header_value.split(';');
        let pair = parts.next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            return Err(HttpError::InvalidArgument(format!(
                "Set-Cookie header has no name=value pair: '{header_value}'"
            )));
        };

        let name = name.trim();
        if !is_token(name) {
            return Err(HttpError::InvalidArgument(format!(
                "Invalid cookie name: '{name}'"
            )));
        }

        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);

        let mut cookie = Self {
            name: name.to_string(),
            value: value.to_string(),
            ..Self::default()
        };

        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((key, val)) => (key.trim(), val.trim()),
                None => (attribute.trim(), ""),
            };

            match key.to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => cookie.domain = Some(val.to_string()),
                "path" if val.starts_with('/') => cookie.path = Some(val.to_string()),
                "expires" => {
                    cookie.expires = parse_cookie_date(val);
                    if cookie.expires.is_none() {
                        tracing::debug!("Ignoring unparseable cookie expiry '{val}'");
                    }
                }
                "max-age" => cookie.max_age = val.parse::<i64>().ok(),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        Ok(cookie)
    }

    /// Absolute expiry; `Max-Age` wins over `Expires`. `None` means a session cookie.
    #[must_use]
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.max_age {
            Some(seconds) if seconds <= 0 => Some(DateTime::<Utc>::UNIX_EPOCH),
            Some(seconds) => Some(
                Duration::try_seconds(seconds)
                    .and_then(|age| now.checked_add_signed(age))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            None => self.expires,
        }
    }
}

/// Parses an HTTP cookie date in any of the common layouts.
#[must_use]
pub fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    EXPIRES_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    })
}
