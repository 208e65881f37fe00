use std::collections::VecDeque;

use url::Url;

use crate::entity::Body;
use crate::errors::{HttpError, HttpResult};
use crate::headers::Headers;
use crate::message::{Method, Request, Response, Version};

use super::Transport;

/// What a [`TestTransport`] saw for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub method: Method,
    pub uri: Url,
    pub version: Version,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Scripted in-memory transport.
///
/// Answers from the response queue first, then with the default response; with both
/// empty, `send` is a configuration error. Every request is recorded, body included.
#[derive(Debug, Default)]
pub struct TestTransport {
    queue: VecDeque<Response>,
    default_response: Option<Response>,
    sent: Vec<SentRequest>,
}

impl TestTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport answering every call with `response`.
    #[must_use]
    pub fn with_default(response: Response) -> Self {
        Self {
            default_response: Some(response),
            ..Self::default()
        }
    }

    pub fn push_response(&mut self, response: Response) {
        self.queue.push_back(response);
    }

    /// Queues a response given as raw text.
    ///
    /// # Errors
    ///
    /// See [`Response::from_string`].
    pub fn push_raw_response(&mut self, raw: &str) -> HttpResult<()> {
        self.queue.push_back(Response::from_string(raw)?);
        Ok(())
    }

    pub fn set_default_response(&mut self, response: Option<Response>) {
        self.default_response = response;
    }

    #[must_use]
    pub fn default_response(&self) -> Option<&Response> {
        self.default_response.as_ref()
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn sent_requests(&self) -> &[SentRequest] {
        &self.sent
    }

    #[must_use]
    pub fn last_request(&self) -> Option<&SentRequest> {
        self.sent.last()
    }

    fn record(request: &mut Request) -> HttpResult<SentRequest> {
        let body = request.body_mut().read_all()?;
        if let Body::Rewindable(_) = request.body() {
            request.body_mut().rewind()?;
        }

        Ok(SentRequest {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
            body,
        })
    }
}

impl Transport for TestTransport {
    fn send(&mut self, request: &mut Request) -> HttpResult<Response> {
        let sent = Self::record(request)?;
        tracing::debug!("TestTransport: {} {}", sent.method, sent.uri);
        self.sent.push(sent);

        if let Some(response) = self.queue.pop_front() {
            return Ok(response);
        }
        self.default_response.clone().ok_or_else(|| {
            HttpError::Configuration(
                "Response queue is empty and no default response has been defined".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::StringEntity;

    /// WHY: Queued responses come out in order before the default
    /// WHAT: Queues two responses and sends three requests
    #[test]
    fn test_queue_then_default() {
        let mut transport = TestTransport::with_default(Response::new(204).unwrap());
        transport.push_response(Response::new(200).unwrap());
        transport
            .push_raw_response("HTTP/1.1 404 Not Found\r\n\r\n")
            .unwrap();

        let mut request = Request::get("http://example.com/").unwrap();
        assert_eq!(transport.send(&mut request).unwrap().status(), 200);
        assert_eq!(transport.send(&mut request).unwrap().status(), 404);
        assert_eq!(transport.send(&mut request).unwrap().status(), 204);
        assert_eq!(transport.send(&mut request).unwrap().status(), 204);
        assert_eq!(transport.sent_requests().len(), 4);
    }

    /// WHY: An unscripted call is a test setup mistake
    /// WHAT: Sends with nothing queued and no default
    #[test]
    fn test_empty_transport_is_configuration_error() {
        let mut transport = TestTransport::new();
        let mut request = Request::get("http://example.com/").unwrap();
        let err = transport.send(&mut request).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Response queue is empty"));
    }

    /// WHY: Tests assert on what was sent, bodies included
    /// WHAT: Sends a rewindable body and checks it is recorded and still readable
    #[test]
    fn test_records_body_and_rewinds() {
        let mut transport = TestTransport::with_default(Response::new(200).unwrap());
        let mut request = Request::post("http://example.com/upload").unwrap();
        request.set_body(Body::rewindable(StringEntity::new("data")));

        transport.send(&mut request).unwrap();
        let sent = transport.last_request().unwrap();
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.body, b"data".to_vec());
        assert_eq!(request.body_mut().read_all().unwrap(), b"data".to_vec());
    }
}
