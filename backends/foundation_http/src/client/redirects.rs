use url::Url;

use crate::errors::{HttpError, HttpResult};
use crate::headers::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, TRANSFER_ENCODING};
use crate::message::{Method, Request};

/// Resolve a `Location` header value against the URI of the request that got
/// redirected.
///
/// Absolute URIs are taken as they are; absolute paths, query-only and relative
/// references are merged with `base` and dot segments removed.
///
/// # Errors
///
/// Returns `HttpError::InvalidArgument` when the location cannot be resolved.
pub fn resolve_location(base: &Url, location: &str) -> HttpResult<Url> {
    let location = location.trim();
    base.join(location).map_err(|err| {
        HttpError::InvalidArgument(format!("Invalid redirect location '{location}': {err}"))
    })
}

/// Whether a redirect with `status` turns the follow-up into a body-less GET.
///
/// 303 always does; 301 and 302 do unless `strict` is set.
#[must_use]
pub fn switches_to_get(status: u16, strict: bool) -> bool {
    status == 303 || (!strict && matches!(status, 301 | 302))
}

/// Turn `request` into the follow-up for a redirect to `new_url`.
///
/// Returns `None` when the follow-up has to replay a body that cannot be read twice;
/// the caller then hands back the redirect response.
///
/// # Errors
///
/// Returns `HttpError::InvalidArgument` when `new_url` is not http(s), or propagates a
/// failed body rewind.
pub fn build_followup_request(
    mut request: Request,
    status: u16,
    new_url: Url,
    strict: bool,
) -> HttpResult<Option<Request>> {
    let original_host = request.uri().host_str().unwrap_or_default().to_string();
    let new_host = new_url.host_str().unwrap_or_default().to_string();

    request.set_uri(new_url)?;
    request.headers_mut().remove(HOST);
    // Each hop carries only what the cookie store computes for its own URI.
    request.headers_mut().remove(COOKIE);

    if switches_to_get(status, strict) {
        request.set_method(Method::Get);
        request.set_body(Vec::new());
        request.headers_mut().remove(CONTENT_LENGTH);
        request.headers_mut().remove(CONTENT_TYPE);
        request.headers_mut().remove(TRANSFER_ENCODING);
    } else if !request.body_mut().rewind()? {
        tracing::info!("Not following redirect {status}: request body cannot be replayed");
        return Ok(None);
    }

    strip_sensitive_headers_for_redirect(&mut request, &original_host, &new_host);
    Ok(Some(request))
}

/// Credentials do not travel to another host.
pub fn strip_sensitive_headers_for_redirect(
    request: &mut Request,
    original_host: &str,
    new_host: &str,
) {
    if !original_host.eq_ignore_ascii_case(new_host) {
        request.headers_mut().remove(AUTHORIZATION);
    }
}
