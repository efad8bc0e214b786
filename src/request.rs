//! Incoming requests.
use url::Url;

use crate::ext::Extensions;
use crate::header::{HeaderName, Headers, KnownHeader};
use crate::method::Method;
use crate::path::{Param, ParamName};
use crate::version::HttpVersion;

/// A parsed request, as handed to filters and endpoints.
///
/// The URI is always absolute: the parser reconstructs it from the
/// request-target and the `Host` header (or the local endpoint, for
/// HTTP/1.0 requests that carry none).
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) smethod: String,
    pub(crate) uri: Url,
    pub(crate) version: HttpVersion,
    pub(crate) params: Vec<Param>,
    pub(crate) headers: Headers,
    pub(crate) payload: Vec<u8>,
    pub(crate) extensions: Extensions,
}

impl Request {
    /// The request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The original (uppercased) method token when [`Method::Other`];
    /// empty otherwise.
    pub fn smethod(&self) -> &str {
        &self.smethod
    }

    /// The method's wire spelling, whichever field holds it.
    pub fn method_name(&self) -> &str {
        if self.method == Method::Other {
            &self.smethod
        } else {
            self.method.as_str()
        }
    }

    /// The absolute request URI.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// The HTTP version from the request line.
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// Parameters bound by the matched route pattern.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Looks up a named route parameter.
    pub fn find_param(&self, name: &str) -> Option<&str> {
        self.params.iter().find_map(|param| match param.name {
            ParamName::Name(ref key) if key == name => Some(param.value.as_str()),
            _ => None,
        })
    }

    /// Looks up a positional route parameter.
    pub fn find_param_index(&self, index: usize) -> Option<&str> {
        self.params.iter().find_map(|param| match param.name {
            ParamName::Index(key) if key == index => Some(param.value.as_str()),
            _ => None,
        })
    }

    /// The header table.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The first value of a header, if present.
    pub fn find_front<K: Into<HeaderName>>(&self, key: K) -> Option<&str> {
        self.headers.find_front(key)
    }

    /// The `Host` header, if present.
    pub fn host(&self) -> Option<&str> {
        self.find_front(KnownHeader::Host)
    }

    /// The request body; loaded only when `Content-Length` was present
    /// and parseable.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Type-erased per-request attributes.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable access to the per-request attributes.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}
