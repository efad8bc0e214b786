//! Route registration and dispatch tables.
//!
//! A [`Router`] is write-only: handlers, filters and sub-routers
//! accumulate in registration order. [`Router::compile`] collapses the
//! tree (each mounted child surrenders its entries to the parent with
//! the mount prefix applied) and produces the immutable
//! [`CompiledRouter`] the server dispatches against.
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::method::Method;
use crate::middleware::Middleware;
use crate::path::{CompileOptions, Matcher, Param};
use crate::request::Request;
use crate::response::Response;

/// A boxed endpoint callable.
pub type Handler =
    Box<dyn Fn(&Request, &mut Response<'_, '_>) -> crate::Result<()> + Send + Sync>;

/// A compiled route: the original mask, its matcher and the endpoint.
pub struct Route {
    mask: String,
    matcher: Matcher,
    endpoint: Handler,
}

impl Route {
    /// The textual pattern this route was registered under.
    pub fn mask(&self) -> &str {
        &self.mask
    }

    pub(crate) fn matches(&self, path: &str, params: &mut Vec<Param>) -> bool {
        self.matcher.matches(path, params)
    }

    pub(crate) fn call(
        &self,
        req: &Request,
        resp: &mut Response<'_, '_>,
    ) -> crate::Result<()> {
        (self.endpoint)(req, resp)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route").field("mask", &self.mask).finish()
    }
}

struct PendingRoute {
    mask: String,
    endpoint: Handler,
    options: CompileOptions,
}

type Filters = Vec<(String, Arc<dyn Middleware>)>;

/// The write-time routing table.
#[derive(Default)]
pub struct Router {
    handlers: HashMap<Method, Vec<PendingRoute>>,
    shandlers: HashMap<String, Vec<PendingRoute>>,
    filters: Filters,
    routers: Vec<(String, Router)>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Router {
        Router::default()
    }

    /// Registers an endpoint for one of the known methods.
    ///
    /// # Panics
    ///
    /// Panics when called with [`Method::Other`]; custom methods go
    /// through [`Router::add_custom`].
    pub fn add<F>(&mut self, mask: &str, endpoint: F, method: Method)
    where
        F: Fn(&Request, &mut Response<'_, '_>) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.add_with_options(mask, endpoint, method, CompileOptions::default());
    }

    /// Registers an endpoint with explicit mask compilation options.
    pub fn add_with_options<F>(
        &mut self,
        mask: &str,
        endpoint: F,
        method: Method,
        options: CompileOptions,
    ) where
        F: Fn(&Request, &mut Response<'_, '_>) -> crate::Result<()> + Send + Sync + 'static,
    {
        assert!(method != Method::Other, "custom methods go through add_custom");
        self.handlers.entry(method).or_default().push(PendingRoute {
            mask: mask.to_owned(),
            endpoint: Box::new(endpoint),
            options,
        });
    }

    /// Registers an endpoint under a method given by its token. Known
    /// tokens land in the regular tables; anything else is looked up by
    /// the (uppercased) token at dispatch time.
    pub fn add_custom<F>(&mut self, mask: &str, endpoint: F, method: &str)
    where
        F: Fn(&Request, &mut Response<'_, '_>) -> crate::Result<()> + Send + Sync + 'static,
    {
        let token = method.to_ascii_uppercase();
        match Method::from_token(&token) {
            Method::Other => {
                self.shandlers.entry(token).or_default().push(PendingRoute {
                    mask: mask.to_owned(),
                    endpoint: Box::new(endpoint),
                    options: CompileOptions::default(),
                });
            }
            method => self.add(mask, endpoint, method),
        }
    }

    /// Mounts a sub-router: at compile time its entries are folded into
    /// this router with their masks prefixed by `prefix`.
    pub fn append(&mut self, prefix: &str, sub: Router) {
        self.routers.push((prefix.to_owned(), sub));
    }

    /// Registers a filter for every path under `prefix`.
    pub fn filter<M: Middleware + 'static>(&mut self, prefix: &str, middleware: M) {
        self.filter_arc(prefix, Arc::new(middleware));
    }

    /// Registers an already-shared filter.
    pub fn filter_arc(&mut self, prefix: &str, middleware: Arc<dyn Middleware>) {
        self.filters.push((prefix.to_owned(), middleware));
    }

    fn surrender(
        mut self,
        prefix: &str,
        handlers: &mut HashMap<Method, Vec<PendingRoute>>,
        shandlers: &mut HashMap<String, Vec<PendingRoute>>,
        filters: &mut Filters,
    ) {
        for (method, pending) in self.handlers.drain() {
            let dst = handlers.entry(method).or_default();
            for mut handler in pending {
                handler.mask = format!("{}{}", prefix, handler.mask);
                dst.push(handler);
            }
        }
        for (token, pending) in self.shandlers.drain() {
            let dst = shandlers.entry(token).or_default();
            for mut handler in pending {
                handler.mask = format!("{}{}", prefix, handler.mask);
                dst.push(handler);
            }
        }
        for (path, middleware) in self.filters.drain(..) {
            filters.push((format!("{}{}", prefix, path), middleware));
        }
        for (mask, sub) in mem::take(&mut self.routers) {
            sub.surrender(&format!("{}{}", prefix, mask), handlers, shandlers, filters);
        }
    }

    /// Collapses mounted sub-routers and compiles every mask, consuming
    /// the router.
    pub fn compile(mut self) -> crate::Result<CompiledRouter> {
        for (mask, sub) in mem::take(&mut self.routers) {
            sub.surrender(&mask, &mut self.handlers, &mut self.shandlers, &mut self.filters);
        }

        let mut routes = HashMap::new();
        for (method, pending) in self.handlers.drain() {
            let mut compiled = Vec::with_capacity(pending.len());
            for handler in pending {
                compiled.push(Route {
                    matcher: Matcher::new(&handler.mask, handler.options)?,
                    mask: handler.mask,
                    endpoint: handler.endpoint,
                });
            }
            routes.insert(method, compiled);
        }

        let mut sroutes = HashMap::new();
        for (token, pending) in self.shandlers.drain() {
            let mut compiled = Vec::with_capacity(pending.len());
            for handler in pending {
                compiled.push(Route {
                    matcher: Matcher::new(&handler.mask, handler.options)?,
                    mask: handler.mask,
                    endpoint: handler.endpoint,
                });
            }
            sroutes.insert(token, compiled);
        }

        Ok(CompiledRouter {
            routes,
            sroutes,
            filters: self.filters,
        })
    }
}

/// The immutable routing tables a server dispatches against. Shared
/// read-only across every connection.
#[derive(Default)]
pub struct CompiledRouter {
    routes: HashMap<Method, Vec<Route>>,
    sroutes: HashMap<String, Vec<Route>>,
    filters: Filters,
}

impl CompiledRouter {
    /// Finds the first route registered under `method` that matches
    /// `path`, binding `params` on success.
    pub fn find(&self, method: Method, path: &str, params: &mut Vec<Param>) -> Option<&Route> {
        self.routes
            .get(&method)?
            .iter()
            .find(|route| route.matches(path, params))
    }

    /// [`CompiledRouter::find`] for custom (non-enum) method tokens.
    pub fn find_custom(
        &self,
        method: &str,
        path: &str,
        params: &mut Vec<Param>,
    ) -> Option<&Route> {
        self.sroutes
            .get(method)?
            .iter()
            .find(|route| route.matches(path, params))
    }

    /// The method-indexed route table.
    pub fn routes(&self) -> &HashMap<Method, Vec<Route>> {
        &self.routes
    }

    /// The custom-method route table.
    pub fn sroutes(&self) -> &HashMap<String, Vec<Route>> {
        &self.sroutes
    }

    /// The flattened filter list, in pre-order registration order.
    pub fn filters(&self) -> &[(String, Arc<dyn Middleware>)] {
        &self.filters
    }
}

#[cfg(test)]
mod tests {
    use super::Router;
    use crate::method::Method;
    use crate::middleware::{Flow, Middleware};
    use crate::path::{Param, ParamName};
    use crate::request::Request;
    use crate::response::Response;

    fn noop(_req: &Request, _resp: &mut Response<'_, '_>) -> crate::Result<()> {
        Ok(())
    }

    struct NullFilter;

    impl Middleware for NullFilter {
        fn handle(
            &self,
            _req: &mut Request,
            _resp: &mut Response<'_, '_>,
        ) -> crate::Result<Flow> {
            Ok(Flow::CarryOn)
        }
    }

    #[test]
    fn test_first_registered_match_wins() {
        let mut router = Router::new();
        router.add("/users/:id", noop, Method::Get);
        router.add("/users/admin", noop, Method::Get);
        let compiled = router.compile().unwrap();

        let mut params = Vec::new();
        let route = compiled.find(Method::Get, "/users/admin", &mut params).unwrap();
        assert_eq!(route.mask(), "/users/:id");
        assert_eq!(
            params,
            [Param {
                name: ParamName::Name("id".to_owned()),
                value: "admin".to_owned(),
            }]
        );
    }

    #[test]
    fn test_method_tables_are_separate() {
        let mut router = Router::new();
        router.add("/x", noop, Method::Get);
        let compiled = router.compile().unwrap();

        let mut params = Vec::new();
        assert!(compiled.find(Method::Get, "/x", &mut params).is_some());
        assert!(compiled.find(Method::Post, "/x", &mut params).is_none());
    }

    #[test]
    fn test_custom_method_token() {
        let mut router = Router::new();
        router.add_custom("/repo", noop, "propfind");
        // a known token routed through add_custom still lands in the enum table
        router.add_custom("/known", noop, "get");
        let compiled = router.compile().unwrap();

        let mut params = Vec::new();
        assert!(compiled.find_custom("PROPFIND", "/repo", &mut params).is_some());
        assert!(compiled.find_custom("PROPFIND", "/nope", &mut params).is_none());
        assert!(compiled.find(Method::Get, "/known", &mut params).is_some());
    }

    #[test]
    fn test_mounting_prefixes_masks() {
        let mut api = Router::new();
        api.add("/users/:id", noop, Method::Get);
        api.filter("/users", NullFilter);

        let mut deep = Router::new();
        deep.add("/ping", noop, Method::Get);
        api.append("/internal", deep);

        let mut root = Router::new();
        root.filter("/", NullFilter);
        root.append("/api", api);
        let compiled = root.compile().unwrap();

        let mut params = Vec::new();
        let route = compiled.find(Method::Get, "/api/users/7", &mut params).unwrap();
        assert_eq!(route.mask(), "/api/users/:id");
        assert!(compiled
            .find(Method::Get, "/api/internal/ping", &mut params)
            .is_some());
        assert!(compiled.find(Method::Get, "/users/7", &mut params).is_none());

        // parent filters come before the surrendered child's, and the
        // child's prefix is applied
        let prefixes: Vec<_> = compiled
            .filters()
            .iter()
            .map(|(prefix, _)| prefix.as_str())
            .collect();
        assert_eq!(prefixes, ["/", "/api/users"]);
    }

    #[test]
    fn test_bad_mask_fails_compile() {
        let mut router = Router::new();
        router.add("/x/(+)", noop, Method::Get);
        assert!(router.compile().is_err());
    }
}
