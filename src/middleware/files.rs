//! Static file serving.
use std::fs;
use std::path::PathBuf;

use log::debug;

use crate::header::KnownHeader;
use crate::method::Method;
use crate::middleware::{Flow, Middleware};
use crate::request::Request;
use crate::response::Response;
use crate::status::StatusCode;

/// Serves files under a filesystem root.
///
/// The request path maps directly under the root. Directories are served
/// through their `index.html` (redirecting first when the request URI
/// lacks its trailing slash); paths that do not exist fall through to the
/// rest of the pipeline; methods other than GET/HEAD against an existing
/// path get `405` with an `Allow` header.
pub struct Files {
    root: PathBuf,
}

impl Files {
    /// Creates the middleware over `root`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Files {
        Files { root: root.into() }
    }
}

impl Middleware for Files {
    fn handle(&self, req: &mut Request, resp: &mut Response<'_, '_>) -> crate::Result<Flow> {
        let resource = req.uri().path().to_owned();
        let path = self.root.join(resource.trim_start_matches('/'));

        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(_) => return Ok(Flow::CarryOn),
        };

        let method = req.method();
        if method != Method::Get && method != Method::Head {
            resp.add(KnownHeader::Allow, "GET,HEAD")?;
            resp.stock_response(StatusCode::MethodNotAllowed)?;
            return Ok(Flow::Finished);
        }

        if meta.is_dir() {
            let index = path.join("index.html");
            match fs::metadata(&index) {
                Ok(meta) if !meta.is_dir() => {
                    if resource.ends_with('/') {
                        debug!("serving {}", index.display());
                        resp.send_file(&index)?;
                    } else {
                        let mut uri = req.uri().clone();
                        uri.set_path(&format!("{}/", resource));
                        resp.add(KnownHeader::Location, uri.as_str())?;
                        resp.stock_response(StatusCode::MovedPermanently)?;
                    }
                    Ok(Flow::Finished)
                }
                _ => Ok(Flow::CarryOn),
            }
        } else {
            debug!("serving {}", path.display());
            resp.send_file(&path)?;
            Ok(Flow::Finished)
        }
    }
}
