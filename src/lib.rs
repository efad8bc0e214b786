//! # hearth
//!
//! A small, embeddable HTTP/1.x server library: a blocking
//! thread-per-connection core that parses HTTP/1.0 and 1.1 requests,
//! dispatches them through path-scoped filters and an Express-style
//! routing table, and writes responses with correct connection-lifetime
//! semantics (explicit `keep-alive`, chunked streaming fallback,
//! conditional GET for static files).
//!
//! ```no_run
//! use hearth::{Method, Router, Server};
//!
//! let mut router = Router::new();
//! router.add("/", |_req, resp| resp.print("hello"), Method::Get);
//! router.add(
//!     r"/users/:id(\d+)",
//!     |req, resp| {
//!         let id = req.find_param("id").unwrap_or("?");
//!         resp.print(id)
//!     },
//!     Method::Get,
//! );
//!
//! let mut server = Server::new();
//! server.set_routes(router).unwrap();
//! server.print_routes();
//!
//! let mut listening = server.listen(8080).unwrap();
//! // ... serve until shutdown ...
//! listening.close();
//! ```
#![deny(missing_docs)]

pub use url::Url;

pub use crate::error::{Error, Result};
pub use crate::ext::Extensions;
pub use crate::header::{HeaderName, Headers, KnownHeader};
pub use crate::method::Method;
pub use crate::middleware::{Flow, Middleware};
pub use crate::path::{CompileOptions, Matcher, Param, ParamName};
pub use crate::request::Request;
pub use crate::response::Response;
pub use crate::router::{CompiledRouter, Handler, Route, Router};
pub use crate::server::{Listening, Server, TcpTransport};
pub use crate::status::StatusCode;
pub use crate::stream::{Endpoint, Stream, Transport};
pub use crate::version::HttpVersion;

mod error;
mod ext;
mod header;
mod method;
pub mod middleware;
pub mod mime;
mod parser;
mod path;
mod request;
mod response;
mod router;
mod server;
mod status;
mod stream;
mod uri;
mod version;

#[cfg(test)]
mod mock;
