//! The server: route dispatch wired to a per-connection loop.
//!
//! A connection is strictly serial: one request is parsed, dispatched
//! and answered before the next request line is read. The connection
//! stays open only while requests carry an explicit
//! `Connection: keep-alive` token; HTTP/1.1's implicit persistence is
//! deliberately not honored, matching the wire behavior this crate
//! grew out of.
use log::{debug, error, info};

use crate::header::KnownHeader;
use crate::method::Method;
use crate::middleware::{self, Flow};
use crate::parser::RequestParser;
use crate::request::Request;
use crate::response::Response;
use crate::router::{CompiledRouter, Router};
use crate::status::StatusCode;
use crate::stream::Stream;
use crate::version::HttpVersion;

mod tcp;

pub use self::tcp::{Listening, TcpTransport};

/// Dispatches connections against a compiled routing table.
#[derive(Default)]
pub struct Server {
    routes: CompiledRouter,
    name: String,
}

impl Server {
    /// Creates a server with an empty routing table.
    pub fn new() -> Server {
        Server::default()
    }

    /// Sets the identity echoed in the `Server` response header.
    pub fn set_server(&mut self, name: &str) {
        self.name = name.to_owned();
    }

    /// The configured server identity.
    pub fn server(&self) -> &str {
        &self.name
    }

    /// Compiles and installs the routing table.
    pub fn set_routes(&mut self, router: Router) -> crate::Result<()> {
        self.routes = router.compile()?;
        Ok(())
    }

    /// The installed routing table.
    pub fn routes(&self) -> &CompiledRouter {
        &self.routes
    }

    /// Logs the installed filters and the route map.
    pub fn print_routes(&self) {
        for (prefix, _) in self.routes.filters() {
            info!("[FILTER] {}", prefix);
        }

        fn push(list: &mut Vec<(String, String)>, mask: &str, method: &str) {
            match list.iter_mut().find(|(key, _)| key == mask) {
                Some((_, methods)) => {
                    methods.push('|');
                    methods.push_str(method);
                }
                None => list.push((mask.to_owned(), method.to_owned())),
            }
        }

        let mut list: Vec<(String, String)> = Vec::new();
        for &method in &[
            Method::Connect,
            Method::Delete,
            Method::Get,
            Method::Head,
            Method::Options,
            Method::Post,
            Method::Put,
            Method::Trace,
        ] {
            if let Some(routes) = self.routes.routes().get(&method) {
                for route in routes {
                    push(&mut list, route.mask(), method.as_str());
                }
            }
        }
        for (token, routes) in self.routes.sroutes() {
            for route in routes {
                push(&mut list, route.mask(), token);
            }
        }

        for (mask, methods) in list {
            info!("[ROUTE] {} {}", methods, mask);
        }
    }

    /// Runs the request/response loop over one accepted connection.
    /// This is the transport callback: every worker lands here with its
    /// own stream and blocks until the connection is done.
    pub fn on_connection(&self, io: &mut Stream<'_>, secure: bool) {
        let mut conn_no = 0u32;
        while io.is_open() {
            conn_no += 1;
            io.set_conn_no(conn_no);

            let mut parser = RequestParser::default();
            if let Err(err) = parser.decode(io) {
                debug!("[CONN {}] {}", conn_no, err);
                io.shutdown();
                break;
            }

            let local = io.local_endpoint();
            let remote = io.remote_endpoint();

            let mut req = match parser.extract(secure, local.port, &local.host) {
                Ok(req) => req,
                Err(err) => {
                    debug!(
                        "[CONN {}] REQ {}:{} {}",
                        conn_no, remote.host, remote.port, err
                    );
                    let mut resp = Response::new(io, None);
                    let _ = resp.set_version(HttpVersion::HTTP_11);
                    let _ = resp.stock_response(StatusCode::BadRequest);
                    let _ = resp.finish();
                    io.shutdown();
                    break;
                }
            };

            let query = req
                .uri()
                .query()
                .map(|q| format!("?{}", q))
                .unwrap_or_default();
            let path = req.uri().path().to_owned();
            debug!(
                "[CONN {}] REQ  | {}:{} | {} {}{} {}",
                conn_no,
                remote.host,
                remote.port,
                req.method_name(),
                path,
                query,
                req.version()
            );
            for (name, values) in req.headers().iter() {
                for value in values {
                    debug!("[CONN {}]      | {}: {}", conn_no, name, value);
                }
            }
            let peer = match req.find_front("x-forwarded-for") {
                Some(forwarded) => {
                    format!("{}:{}|{}", remote.host, remote.port, forwarded)
                }
                None => format!("{}:{}", remote.host, remote.port),
            };

            Self::load_content(io, &mut req);

            let mut close = false;
            {
                let mut resp = Response::new(io, Some(&req));
                let _ = resp.set_version(req.version());
                if !self.name.is_empty() {
                    let _ = resp.set(KnownHeader::Server, self.name.as_str());
                }

                let outcome = self
                    .handle_connection(&mut req, &mut resp)
                    .and_then(|_| resp.finish());
                match outcome {
                    Ok(()) => {
                        debug!(
                            "[CONN {}] RESP | {}:{} | {} {}",
                            conn_no,
                            remote.host,
                            remote.port,
                            resp.version(),
                            resp.status()
                        );
                        for (name, values) in resp.headers().iter() {
                            for value in values {
                                debug!("[CONN {}]      | {}: {}", conn_no, name, value);
                            }
                        }
                        info!(
                            "REQ [{}] {} \"{}{}\" {} -- {}",
                            peer,
                            req.method_name(),
                            path,
                            query,
                            req.version(),
                            resp.status().to_u16()
                        );
                    }
                    Err(err) if err.is_write() => {
                        debug!("[CONN {}] {}", conn_no, err);
                        close = true;
                    }
                    Err(err) => {
                        // an endpoint failure the application did not
                        // convert; answer 500 when that is still possible
                        error!("[CONN {}] handler failed: {}", conn_no, err);
                        if !resp.headers_sent() {
                            let _ = resp.stock_response(StatusCode::InternalServerError);
                            let _ = resp.finish();
                        }
                        close = true;
                    }
                }
            }
            if close {
                io.shutdown();
                break;
            }

            if !should_keep_alive(&req) {
                debug!("[CONN {}] shutdown: don't keep alive", conn_no);
                io.shutdown();
                break;
            }
        }
    }

    /// Loads the request body when a parseable `Content-Length` is
    /// present; anything else leaves the payload empty.
    fn load_content(io: &mut Stream<'_>, req: &mut Request) {
        let length = match req
            .find_front(KnownHeader::ContentLength)
            .and_then(|value| value.trim().parse::<usize>().ok())
        {
            Some(length) => length,
            None => return,
        };

        req.payload.resize(length, 0);
        let got = io.read(&mut req.payload);
        req.payload.truncate(got);
    }

    // Filters in registration order, then the routing tables, then the
    // trailing-slash reconciliation, and finally the endpoint.
    fn handle_connection(
        &self,
        req: &mut Request,
        resp: &mut Response<'_, '_>,
    ) -> crate::Result<()> {
        let resource = req.uri().path().to_owned();

        for (prefix, filter) in self.routes.filters() {
            if middleware::prefix_matches(&resource, prefix)
                && filter.handle(req, resp)? == Flow::Finished
            {
                return Ok(());
            }
        }

        let mut params = Vec::new();
        let route = if req.method() == Method::Other {
            self.routes.find_custom(req.smethod(), &resource, &mut params)
        } else {
            self.routes.find(req.method(), &resource, &mut params)
        };
        let route = match route {
            Some(route) => route,
            None => return resp.stock_response(StatusCode::NotFound),
        };

        let mask_has_slash = route.mask().ends_with('/');
        let path_has_slash = resource.ends_with('/');
        if mask_has_slash != path_has_slash {
            return if mask_has_slash {
                let mut uri = req.uri().clone();
                uri.set_path(&format!("{}/", resource));
                resp.add(KnownHeader::Location, uri.as_str())?;
                resp.stock_response(StatusCode::MovedPermanently)
            } else {
                resp.stock_response(StatusCode::NotFound)
            };
        }

        std::mem::swap(&mut params, &mut req.params);
        route.call(req, resp)
    }
}

/// Whether the request's `Connection` header lists the `keep-alive`
/// token. Matching is case-insensitive and bounded at commas or
/// whitespace so that e.g. `not-keep-alive-today` does not count.
pub(crate) fn should_keep_alive(req: &Request) -> bool {
    let value = match req.find_front(KnownHeader::Connection) {
        Some(value) => value.to_ascii_lowercase(),
        None => return false,
    };

    const TOKEN: &str = "keep-alive";
    let bytes = value.as_bytes();
    let mut from = 0;
    while let Some(found) = value[from..].find(TOKEN) {
        let start = from + found;
        let end = start + TOKEN.len();
        let left_ok = start == 0
            || bytes[start - 1] == b','
            || bytes[start - 1].is_ascii_whitespace();
        let right_ok = end == bytes.len()
            || bytes[end] == b','
            || bytes[end].is_ascii_whitespace();
        if left_ok && right_ok {
            return true;
        }
        from = start + 1;
    }
    false
}
