use std::fmt;
use std::io::{self, Read};

use http::header::{REFERER, USER_AGENT};
use http::HeaderMap;
use serde::Serialize;

use crate::field::{Field, HTTP_REQUEST_KEY};

/// Raw peer address (`host:port`) of an inbound request, stored in the
/// request extensions by whatever accepted the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

type Body = Box<dyn Read + Send>;

/// Proxy of an inbound request handed to [`HttpPayload::new`].
///
/// Building the payload drains `body`, so pass a proxy rather than the
/// request downstream code still needs to read. Unset fields keep their
/// empty value.
#[derive(Default)]
pub struct HttpRequest {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub protocol: String,
    pub remote_addr: String,
    pub headers: HeaderMap,
    pub body: Option<Body>,
}

impl HttpRequest {
    pub fn with_body(mut self, body: impl Read + Send + 'static) -> Self {
        self.body = Some(Box::new(body));
        self
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("protocol", &self.protocol)
            .field("remote_addr", &self.remote_addr)
            .field("headers", &self.headers)
            .field("body", &self.body.is_some())
            .finish()
    }
}

impl<B> From<http::Request<B>> for HttpRequest
where
    B: Read + Send + 'static,
{
    fn from(req: http::Request<B>) -> Self {
        let (parts, body) = req.into_parts();
        let host = parts
            .uri
            .authority()
            .map(|a| a.as_str().rsplit('@').next().unwrap_or_default().to_string())
            .unwrap_or_default();
        let remote_addr = parts
            .extensions
            .get::<RemoteAddr>()
            .map(|addr| addr.0.clone())
            .unwrap_or_default();

        HttpRequest {
            method: parts.method.as_str().to_string(),
            scheme: parts.uri.scheme_str().unwrap_or_default().to_string(),
            host,
            protocol: format!("{:?}", parts.version),
            remote_addr,
            headers: parts.headers,
            body: Some(Box::new(body)),
        }
    }
}

/// Proxy of an outbound response handed to [`HttpPayload::new`].
#[derive(Default)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Option<Body>,
}

impl HttpResponse {
    pub fn with_body(mut self, body: impl Read + Send + 'static) -> Self {
        self.body = Some(Box::new(body));
        self
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("body", &self.body.is_some())
            .finish()
    }
}

impl<B> From<http::Response<B>> for HttpResponse
where
    B: Read + Send + 'static,
{
    fn from(res: http::Response<B>) -> Self {
        let (parts, body) = res.into_parts();
        HttpResponse { status: parts.status.as_u16(), body: Some(Box::new(body)) }
    }
}

/// The `httpRequest` group of a Cloud Logging entry.
///
/// Every member is always rendered: data that was not supplied shows up as
/// an empty string, or `0` for `status`. A real zero status or an empty
/// body therefore looks the same as "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpPayload {
    pub request_method: String,
    pub request_url: String,
    pub request_size: String,
    pub status: u16,
    pub user_agent: String,
    pub remote_ip: String,
    pub referer: String,
    pub response_size: String,
    pub protocol: String,
}

impl HttpPayload {
    /// Extract HTTP metadata from either side of an exchange.
    ///
    /// Bodies are read to the end to measure them; this blocks for as long
    /// as the body takes to produce its bytes.
    pub fn new(request: Option<HttpRequest>, response: Option<HttpResponse>) -> Self {
        let mut payload = HttpPayload::default();

        if let Some(req) = request {
            payload.request_method = req.method;
            payload.user_agent = header(&req.headers, USER_AGENT);
            payload.referer = header(&req.headers, REFERER);
            payload.remote_ip = req.remote_addr;
            payload.protocol = req.protocol;
            // Path and query are not part of the reconstructed URL.
            if !req.scheme.is_empty() && !req.host.is_empty() {
                payload.request_url = format!("{}://{}", req.scheme, req.host);
            }
            if let Some(mut body) = req.body {
                payload.request_size = drain(&mut body).to_string();
            }
        }

        if let Some(res) = response {
            payload.status = res.status;
            if let Some(mut body) = res.body {
                payload.response_size = drain(&mut body).to_string();
            }
        }

        payload
    }

    pub fn field(&self) -> Field {
        Field::any(HTTP_REQUEST_KEY, self)
    }
}

fn header(headers: &HeaderMap, name: http::header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Read `body` to the end and return how many bytes it produced. A read
/// error stops the count at what was read so far.
fn drain(body: &mut dyn Read) -> u64 {
    let mut buf = [0u8; 8 * 1024];
    let mut total = 0u64;
    loop {
        match body.read(&mut buf) {
            Ok(0) => return total,
            Ok(n) => total += n as u64,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(error = %e, read = total, "body read failed while measuring size");
                return total;
            }
        }
    }
}
