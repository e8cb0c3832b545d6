//! HTTP session transport.
//!
//! The orchestrator only sees the [`Transport`] trait; [`UreqSession`] is the
//! production implementation, a blocking `ureq` agent whose cookie store
//! carries the login session between requests.

use crate::error::TransportError;
use std::io::Read;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Status plus decoded text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

/// Status plus raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
}

/// A session that keeps whatever state the remote login established.
///
/// Non-2xx statuses are returned as responses, not errors; only failures to
/// talk to the server at all are errors.
pub trait Transport: Sync {
    fn fetch(&self, method: Method, url: &str, form: &[(&str, &str)]) -> Result<Response, TransportError>;

    fn fetch_binary(&self, url: &str) -> Result<BinaryResponse, TransportError>;
}

/// Cookie-keeping blocking HTTP session.
pub struct UreqSession {
    agent: ureq::Agent,
}

impl UreqSession {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(60))
            .timeout_write(Duration::from_secs(30))
            .user_agent(concat!("usdb-sync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    fn send(&self, method: Method, url: &str, form: &[(&str, &str)]) -> Result<ureq::Response, TransportError> {
        let result = match method {
            Method::Get => self.agent.get(url).call(),
            Method::Post => self.agent.post(url).send_form(form),
        };
        match result {
            Ok(response) | Err(ureq::Error::Status(_, response)) => Ok(response),
            Err(ureq::Error::Transport(transport)) => Err(TransportError::Request {
                url: url.to_string(),
                message: transport.to_string(),
            }),
        }
    }
}

impl Default for UreqSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqSession {
    fn fetch(&self, method: Method, url: &str, form: &[(&str, &str)]) -> Result<Response, TransportError> {
        let response = self.send(method, url, form)?;
        let status = response.status();
        let body = response.into_string()?;
        Ok(Response { status, body })
    }

    fn fetch_binary(&self, url: &str) -> Result<BinaryResponse, TransportError> {
        let response = self.send(Method::Get, url, &[])?;
        let status = response.status();
        let mut bytes = Vec::new();
        response.into_reader().read_to_end(&mut bytes)?;
        Ok(BinaryResponse { status, bytes })
    }
}
