//! TOML loading for option structs.

use serde::de::DeserializeOwned;

use crate::errors::{HttpError, HttpResult};

/// Deserializes a TOML document into `T`.
///
/// # Errors
///
/// Returns `HttpError::Configuration` when the document does not match `T`.
pub fn from_toml_str<T: DeserializeOwned>(content: &str) -> HttpResult<T> {
    let config_obj: T = toml::from_str(content)?;
    Ok(config_obj)
}

/// Reads and deserializes a TOML file into `T`.
///
/// # Errors
///
/// Returns `HttpError::Configuration` when the file cannot be read or parsed.
pub fn from_path<T, V>(target: V) -> HttpResult<T>
where
    T: DeserializeOwned,
    V: Into<std::path::PathBuf>,
{
    let target_path = target.into();
    let config_content = std::fs::read_to_string(&target_path).map_err(|err| {
        HttpError::Configuration(format!(
            "unable to read {}: {err}",
            target_path.display()
        ))
    })?;
    from_toml_str(&config_content)
}
