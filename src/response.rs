//! The response writer.
//!
//! A response starts in buffered mode: writes accumulate in memory and
//! `finish` emits the whole message with a computed `Content-Length`.
//! Turning `cache_contents` off switches to streaming: the first write
//! flushes the headers (forcing `Transfer-Encoding: chunked` when none is
//! set) and every write goes out as one chunk.
//!
//! Anything that would change wire-visible state after the headers went
//! out is an error, and a failed transport write aborts the exchange.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use bytes::BytesMut;

use crate::error::Error;
use crate::ext::Extensions;
use crate::header::{HeaderName, Headers, KnownHeader};
use crate::method::Method;
use crate::mime;
use crate::request::Request;
use crate::status::StatusCode;
use crate::stream::Stream;
use crate::uri;
use crate::version::HttpVersion;

const FILE_CHUNK_SIZE: usize = 8192;

/// The outgoing half of an exchange, owned by the connection loop for
/// the duration of one request.
pub struct Response<'a, 't> {
    headers: Headers,
    status: StatusCode,
    version: HttpVersion,
    headers_sent: bool,
    cache_content: bool,
    contents: BytesMut,
    stream: &'a mut Stream<'t>,
    head: bool,
    if_modified_since: Option<String>,
    extensions: Extensions,
}

impl<'a, 't> Response<'a, 't> {
    pub(crate) fn new(stream: &'a mut Stream<'t>, req: Option<&Request>) -> Response<'a, 't> {
        let (head, if_modified_since) = match req {
            Some(req) => (
                req.method() == Method::Head,
                req.find_front(KnownHeader::IfModifiedSince)
                    .map(str::to_owned),
            ),
            None => (false, None),
        };
        Response {
            headers: Headers::new(),
            status: StatusCode::Ok,
            version: HttpVersion::NONE,
            headers_sent: false,
            cache_content: true,
            contents: BytesMut::new(),
            stream,
            head,
            if_modified_since,
            extensions: Extensions::new(),
        }
    }

    fn check_sent(&self, what: &'static str) -> crate::Result<()> {
        if self.headers_sent {
            Err(Error::new_user_headers_sent(what))
        } else {
            Ok(())
        }
    }

    /// The header table as composed so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Whether `key` has at least one value.
    pub fn has<K: Into<HeaderName>>(&self, key: K) -> bool {
        self.headers.has(key)
    }

    /// The first value of a header, if present.
    pub fn find_front<K: Into<HeaderName>>(&self, key: K) -> Option<&str> {
        self.headers.find_front(key)
    }

    /// The `Location` header, if set.
    pub fn location(&self) -> Option<&str> {
        self.find_front(KnownHeader::Location)
    }

    /// Appends a header value.
    pub fn add<K, V>(&mut self, key: K, value: V) -> crate::Result<()>
    where
        K: Into<HeaderName>,
        V: Into<String>,
    {
        self.check_sent("add(header)")?;
        self.headers.add(key, value);
        Ok(())
    }

    /// Replaces a header.
    pub fn set<K, V>(&mut self, key: K, value: V) -> crate::Result<()>
    where
        K: Into<HeaderName>,
        V: Into<String>,
    {
        self.check_sent("set(header)")?;
        self.headers.set(key, value);
        Ok(())
    }

    /// Removes a header.
    pub fn erase<K: Into<HeaderName>>(&mut self, key: K) -> crate::Result<()> {
        self.check_sent("erase(header)")?;
        self.headers.erase(key);
        Ok(())
    }

    /// The status as set so far.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status line code.
    pub fn set_status(&mut self, status: StatusCode) -> crate::Result<()> {
        self.check_sent("status")?;
        self.status = status;
        Ok(())
    }

    /// The version the status line will carry.
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// Sets the status line version.
    pub fn set_version(&mut self, version: HttpVersion) -> crate::Result<()> {
        self.check_sent("version")?;
        self.version = version;
        Ok(())
    }

    /// Switches between buffered (`true`, the default) and streaming
    /// chunked output (`false`).
    pub fn cache_contents(&mut self, value: bool) -> crate::Result<()> {
        self.check_sent("cache_contents")?;
        self.cache_content = value;
        Ok(())
    }

    /// Type-erased per-response attributes.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable access to the per-response attributes.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub(crate) fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Writes body bytes: buffered in the default mode, a chunk per call
    /// when streaming.
    pub fn write(&mut self, data: &[u8]) -> crate::Result<()> {
        if self.cache_content {
            self.contents.extend_from_slice(data);
            return Ok(());
        }

        if !self.headers_sent {
            if !self.headers.has(KnownHeader::TransferEncoding) {
                self.headers.set(KnownHeader::TransferEncoding, "chunked");
            }
            self.send_headers()?;
        }
        if data.is_empty() {
            return Ok(());
        }
        self.ll_print(&format!("{:X}\r\n", data.len()))?;
        self.ll_write(data)?;
        self.ll_write(b"\r\n")
    }

    /// Writes a string slice to the body.
    pub fn print(&mut self, text: &str) -> crate::Result<()> {
        self.write(text.as_bytes())
    }

    /// Writes a string slice to the body with JSON string escaping
    /// applied (quotes, backslashes and control characters).
    pub fn print_json(&mut self, text: &str) -> crate::Result<()> {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '"' => escaped.push_str("\\\""),
                '\\' => escaped.push_str("\\\\"),
                '\n' => escaped.push_str("\\n"),
                '\r' => escaped.push_str("\\r"),
                '\t' => escaped.push_str("\\t"),
                c if (c as u32) < 0x20 => {
                    escaped.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => escaped.push(c),
            }
        }
        self.print(&escaped)
    }

    /// Replaces the body with a minimal HTML document for `status`. A
    /// status without a canonical reason falls back to 500.
    pub fn stock_response(&mut self, status: StatusCode) -> crate::Result<()> {
        let (status, text) = match status.canonical_reason() {
            Some(reason) => (status, reason),
            None => (StatusCode::InternalServerError, "Internal Server Error"),
        };
        self.set_status(status)?;
        self.contents.clear();

        let code = status.to_u16();
        self.print(&format!(
            "<html><head><title>{} {}</title></head><body><h1>{} {}</h1>",
            code, text, code, text
        ))?;
        if let Some(location) = self.location().map(str::to_owned) {
            let shown = uri::ui_safe_str(&location);
            self.print(&format!("<p>See <a href='{}'>{}</a></p>", location, shown))?;
        }
        self.print("</body></html>")
    }

    /// Serves a file: 404 when missing or unopenable, 403 for a
    /// directory, otherwise the file with `Content-Length`,
    /// `Content-Type` and `Last-Modified`, honoring `If-Modified-Since`
    /// for non-HEAD requests.
    pub fn send_file<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<()> {
        self.check_sent("send_file")?;
        let path = path.as_ref();

        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) => return self.stock_response(StatusCode::NotFound),
        };
        if meta.is_dir() {
            return self.stock_response(StatusCode::Forbidden);
        }
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(_) => return self.stock_response(StatusCode::NotFound),
        };

        let mut length = itoa::Buffer::new();
        self.headers
            .set(KnownHeader::ContentLength, length.format(meta.len()));
        self.headers
            .set(KnownHeader::ContentType, mime::mime_type(&path.to_string_lossy()));
        let last_modified = meta.modified().ok().map(httpdate::fmt_http_date);
        if let Some(ref last_modified) = last_modified {
            self.headers
                .set(KnownHeader::LastModified, last_modified.clone());
        }

        if !self.head {
            if let (Some(since), Some(stamp)) =
                (self.if_modified_since.as_deref(), last_modified.as_deref())
            {
                if since == stamp {
                    self.status = StatusCode::NotModified;
                    return self.send_headers();
                }
            }
        }

        self.send_headers()?;
        if self.head {
            return Ok(());
        }

        let mut chunk = [0u8; FILE_CHUNK_SIZE];
        loop {
            match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.ll_write(&chunk[..n])?,
                Err(err) => return Err(Error::new_io(err)),
            }
        }
        Ok(())
    }

    fn send_headers(&mut self) -> crate::Result<()> {
        if !self.headers.has(KnownHeader::ContentType) {
            self.headers
                .set(KnownHeader::ContentType, "text/html; charset=UTF-8");
        }
        self.headers_sent = true;

        let mut code = itoa::Buffer::new();
        let mut head = String::with_capacity(256);
        head.push_str(&format!(
            "{} {} {}\r\n",
            self.version,
            code.format(self.status.to_u16()),
            self.status.canonical_reason().unwrap_or("Unknown")
        ));
        for (name, values) in self.headers.iter() {
            for value in values {
                head.push_str(name.as_str());
                head.push_str(": ");
                head.push_str(value);
                head.push_str("\r\n");
            }
        }
        head.push_str("\r\n");
        self.ll_print(&head)
    }

    /// Completes the exchange: emits headers and the buffered body, or
    /// the terminating chunk when streaming, and flushes the stream.
    pub(crate) fn finish(&mut self) -> crate::Result<()> {
        if !self.cache_content {
            if !self.headers_sent {
                if !self.headers.has(KnownHeader::TransferEncoding) {
                    self.headers.set(KnownHeader::TransferEncoding, "chunked");
                }
                self.send_headers()?;
            }
            self.ll_write(b"0\r\n\r\n")?;
            return self.flush();
        }

        if self.headers_sent {
            // send_file already wrote the whole message
            return self.flush();
        }

        if !self.headers.has(KnownHeader::ContentType) {
            self.headers
                .set(KnownHeader::ContentType, "text/html; charset=UTF-8");
        }
        if !self.headers.has(KnownHeader::ContentLength) {
            let mut length = itoa::Buffer::new();
            self.headers
                .set(KnownHeader::ContentLength, length.format(self.contents.len()));
        }

        let mut skip_body = false;
        if self.head {
            skip_body = true;
            if let (Some(since), Some(stamp)) = (
                self.if_modified_since.as_deref(),
                self.headers.find_front(KnownHeader::LastModified),
            ) {
                if since == stamp {
                    self.status = StatusCode::NotModified;
                }
            }
        }

        self.send_headers()?;
        if !skip_body {
            let body = std::mem::take(&mut self.contents);
            self.ll_write(&body)?;
        }
        self.contents.clear();
        self.flush()
    }

    fn flush(&mut self) -> crate::Result<()> {
        if self.stream.flush() {
            Ok(())
        } else {
            Err(Error::new_write())
        }
    }

    fn ll_write(&mut self, data: &[u8]) -> crate::Result<()> {
        if self.stream.write(data) != data.len() {
            return Err(Error::new_write());
        }
        Ok(())
    }

    fn ll_print(&mut self, text: &str) -> crate::Result<()> {
        self.ll_write(text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::Response;
    use crate::header::KnownHeader;
    use crate::mock::MockTransport;
    use crate::parser::RequestParser;
    use crate::request::Request;
    use crate::status::StatusCode;
    use crate::stream::Stream;
    use crate::version::HttpVersion;

    fn request(bytes: &[u8]) -> Request {
        let mut src: &[u8] = bytes;
        let mut parser = RequestParser::default();
        parser.decode(&mut src).unwrap();
        parser.extract(false, 8080, "127.0.0.1").unwrap()
    }

    fn get_request() -> Request {
        request(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")
    }

    #[test]
    fn test_buffered_response_wire_format() {
        let req = get_request();
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.print("ok").unwrap();
            resp.finish().unwrap();
        }
        assert_eq!(
            transport.output_str(),
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=UTF-8\r\nContent-Length: 2\r\n\r\nok"
        );
    }

    #[test]
    fn test_buffered_keeps_an_explicit_content_length() {
        let req = get_request();
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.set(KnownHeader::ContentLength, "10").unwrap();
            resp.print("ok").unwrap();
            resp.finish().unwrap();
        }
        assert!(transport.output_str().contains("Content-Length: 10\r\n"));
    }

    #[test]
    fn test_streaming_uses_chunked_framing() {
        let req = get_request();
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.cache_contents(false).unwrap();
            resp.print("foo bar").unwrap();
            resp.print("baz quux herp").unwrap();
            resp.finish().unwrap();
        }
        let output = transport.output_str();
        assert!(output.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!output.contains("Content-Length"));
        assert!(output.ends_with("7\r\nfoo bar\r\nD\r\nbaz quux herp\r\n0\r\n\r\n"));
    }

    #[test]
    fn test_mutation_after_headers_is_refused() {
        let req = get_request();
        let mut transport = MockTransport::empty();
        let mut io = Stream::new(&mut transport);
        let mut resp = Response::new(&mut io, Some(&req));
        resp.set_version(HttpVersion::HTTP_11).unwrap();
        resp.cache_contents(false).unwrap();
        resp.print("x").unwrap();

        let err = resp.set(KnownHeader::ContentType, "text/plain").unwrap_err();
        assert!(err.is_user());
        assert!(resp.set_status(StatusCode::NotFound).is_err());
        assert!(resp.set_version(HttpVersion::HTTP_10).is_err());
        assert!(resp.cache_contents(true).is_err());
    }

    #[test]
    fn test_stock_response_mentions_location() {
        let req = get_request();
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.add(KnownHeader::Location, "http://example.com/dir/").unwrap();
            resp.stock_response(StatusCode::MovedPermanently).unwrap();
            resp.finish().unwrap();
        }
        let output = transport.output_str();
        assert!(output.starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
        assert!(output.contains("<h1>301 Moved Permanently</h1>"));
        assert!(output.contains("<a href='http://example.com/dir/'>"));
    }

    #[test]
    fn test_stock_response_replaces_the_body() {
        let req = get_request();
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.print("to be discarded").unwrap();
            resp.stock_response(StatusCode::NotFound).unwrap();
            resp.finish().unwrap();
        }
        let output = transport.output_str();
        assert!(!output.contains("to be discarded"));
        assert!(output.contains("<h1>404 Not Found</h1>"));
    }

    #[test]
    fn test_unknown_stock_status_becomes_500() {
        let req = get_request();
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.stock_response(StatusCode::Unregistered(599)).unwrap();
            resp.finish().unwrap();
        }
        assert!(transport
            .output_str()
            .starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[test]
    fn test_head_keeps_headers_drops_body() {
        let req = request(b"HEAD / HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.print("ok").unwrap();
            resp.finish().unwrap();
        }
        let output = transport.output_str();
        assert!(output.contains("Content-Length: 2\r\n"));
        assert!(output.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_head_if_modified_since_promotes_to_304() {
        let stamp = "Sun, 06 Nov 1994 08:49:37 GMT";
        let req = request(
            format!(
                "HEAD / HTTP/1.1\r\nHost: h\r\nIf-Modified-Since: {}\r\n\r\n",
                stamp
            )
            .as_bytes(),
        );
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.set(KnownHeader::LastModified, stamp).unwrap();
            resp.print("body").unwrap();
            resp.finish().unwrap();
        }
        let output = transport.output_str();
        assert!(output.starts_with("HTTP/1.1 304 Not Modified\r\n"));
        assert!(output.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_print_json_escapes() {
        let req = get_request();
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.print("{\"msg\":\"").unwrap();
            resp.print_json("say \"hi\"\nplease\\now").unwrap();
            resp.print("\"}").unwrap();
            resp.finish().unwrap();
        }
        let output = transport.output_str();
        assert!(output.ends_with("{\"msg\":\"say \\\"hi\\\"\\nplease\\\\now\"}"));
    }

    #[test]
    fn test_write_failure_surfaces() {
        let req = get_request();
        let mut transport = MockTransport::empty();
        transport.close();
        let mut io = Stream::new(&mut transport);
        let mut resp = Response::new(&mut io, Some(&req));
        resp.set_version(HttpVersion::HTTP_11).unwrap();
        resp.print("ok").unwrap();
        let err = resp.finish().unwrap_err();
        assert!(err.is_write());
    }

    #[test]
    fn test_send_file_conditional_get() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("page.html");
        std::fs::File::create(&file_path)
            .unwrap()
            .write_all(b"<p>hello</p>")
            .unwrap();
        let mtime = std::fs::metadata(&file_path).unwrap().modified().unwrap();
        let stamp = httpdate::fmt_http_date(mtime);

        // plain GET: full body plus validators
        let req = get_request();
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.send_file(&file_path).unwrap();
            resp.finish().unwrap();
        }
        let output = transport.output_str();
        assert!(output.contains("Content-Length: 12\r\n"));
        assert!(output.contains("Content-Type: text/html\r\n"));
        assert!(output.contains(&format!("Last-Modified: {}\r\n", stamp)));
        assert!(output.ends_with("<p>hello</p>"));

        // conditional GET with a matching stamp: 304, empty body
        let req = request(
            format!(
                "GET / HTTP/1.1\r\nHost: h\r\nIf-Modified-Since: {}\r\n\r\n",
                stamp
            )
            .as_bytes(),
        );
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.send_file(&file_path).unwrap();
            resp.finish().unwrap();
        }
        let output = transport.output_str();
        assert!(output.starts_with("HTTP/1.1 304 Not Modified\r\n"));
        assert!(output.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_send_file_missing_and_directory() {
        let dir = tempfile::tempdir().unwrap();

        let req = get_request();
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.send_file(dir.path().join("absent.txt")).unwrap();
            resp.finish().unwrap();
        }
        assert!(transport.output_str().starts_with("HTTP/1.1 404 Not Found\r\n"));

        let req = get_request();
        let mut transport = MockTransport::empty();
        {
            let mut io = Stream::new(&mut transport);
            let mut resp = Response::new(&mut io, Some(&req));
            resp.set_version(HttpVersion::HTTP_11).unwrap();
            resp.send_file(dir.path()).unwrap();
            resp.finish().unwrap();
        }
        assert!(transport.output_str().starts_with("HTTP/1.1 403 Forbidden\r\n"));
    }
}
