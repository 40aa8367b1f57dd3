//! Reporter request template.
//!
//! A hyper request body is consumed when the request is sent, so the
//! same request object cannot be reissued every sampling tick. The
//! template holds the immutable pieces and stamps out a fresh request
//! per sample: deep-copied headers, independent body reader over the
//! shared body bytes.

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Uri};
use http_body_util::Full;

/// The prepared reporter request, cloned once per sample.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestTemplate {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    /// The reporter URI, for logging.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Produce an independent request from the template.
    ///
    /// The header map is a deep copy — mutating one clone's headers
    /// never shows through to another clone or to the template. The
    /// body is a fresh `Full` reader over the shared bytes; `Bytes`
    /// is immutable, so sharing the storage is safe.
    pub fn clone_request(&self) -> Request<Full<Bytes>> {
        let mut req = Request::new(Full::new(self.body.clone()));
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = self.uri.clone();
        *req.headers_mut() = self.headers.clone();
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderValue, CONTENT_TYPE, USER_AGENT};

    fn template() -> RequestTemplate {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        RequestTemplate::new(
            Method::GET,
            "http://localhost:6000/cpu".parse().unwrap(),
            headers,
            Bytes::from_static(b"payload"),
        )
    }

    #[test]
    fn clone_carries_template_fields() {
        let req = template().clone_request();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri(), &"http://localhost:6000/cpu".parse::<Uri>().unwrap());
        assert_eq!(req.headers()[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn clones_have_independent_headers() {
        let tpl = template();
        let mut first = tpl.clone_request();
        let second = tpl.clone_request();

        first
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static("mutated"));

        assert!(second.headers().get(USER_AGENT).is_none());
        // The template itself is untouched as well.
        let third = tpl.clone_request();
        assert!(third.headers().get(USER_AGENT).is_none());
    }

    #[test]
    fn clones_share_equal_header_contents() {
        let tpl = template();
        let a = tpl.clone_request();
        let b = tpl.clone_request();
        assert_eq!(a.headers(), b.headers());
    }
}
