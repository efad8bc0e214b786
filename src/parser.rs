//! Request and header-block parsing.
//!
//! The field parser reads CRLF-delimited lines into one growing buffer
//! and keeps `(name, value)` byte spans over it; obsolete line folding
//! extends the previous value span. `rearrange` then canonicalizes names
//! and normalizes values (trim, collapse a fold to a single space).
use std::ops::Range;

use crate::error::Error;
use crate::header::{HeaderName, Headers, KnownHeader};
use crate::method::Method;
use crate::request::Request;
use crate::stream::Stream;
use crate::uri;
use crate::version::HttpVersion;

/// A blocking byte source the parsers pull from.
pub(crate) trait DataSource {
    /// Reads up to `buf.len()` bytes; 0 means end-of-stream or failure.
    fn get(&mut self, buf: &mut [u8]) -> usize;
}

impl<'t> DataSource for Stream<'t> {
    fn get(&mut self, buf: &mut [u8]) -> usize {
        self.read(buf)
    }
}

impl DataSource for &[u8] {
    fn get(&mut self, buf: &mut [u8]) -> usize {
        std::io::Read::read(self, buf).unwrap_or(0)
    }
}

fn find_byte(haystack: &[u8], from: usize, byte: u8) -> Option<usize> {
    haystack[from..]
        .iter()
        .position(|&b| b == byte)
        .map(|pos| from + pos)
}

/// Trims surrounding whitespace and collapses each CR LF WS+ run (an
/// obsolete fold) into a single space, dropping any whitespace that
/// preceded the CR.
fn produce(raw: &[u8]) -> String {
    let mut start = 0;
    let mut end = raw.len();
    while start < end && raw[start].is_ascii_whitespace() {
        start += 1;
    }
    while start < end && raw[end - 1].is_ascii_whitespace() {
        end -= 1;
    }

    let mut out: Vec<u8> = Vec::with_capacity(end - start);
    let mut in_fold = false;
    for &byte in &raw[start..end] {
        if in_fold {
            if byte.is_ascii_whitespace() {
                continue;
            }
            in_fold = false;
            out.push(byte);
            continue;
        }
        if byte == b'\r' {
            in_fold = true;
            while out.last().map_or(false, u8::is_ascii_whitespace) {
                out.pop();
            }
            out.push(b' ');
            continue;
        }
        out.push(byte);
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Reads a header block up to and including its terminating empty line.
#[derive(Default)]
pub(crate) struct FieldParser {
    contents: Vec<u8>,
    fields: Vec<(Range<usize>, Range<usize>)>,
    last_line_end: usize,
}

impl FieldParser {
    /// Appends one CRLF-terminated line (terminator included) to `dst`.
    pub(crate) fn read_line(src: &mut dyn DataSource, dst: &mut Vec<u8>) -> crate::Result<()> {
        let mut cr = false;
        loop {
            let mut byte = [0u8; 1];
            if src.get(&mut byte) != 1 {
                return Err(Error::new_incomplete());
            }
            dst.push(byte[0]);
            match byte[0] {
                b'\r' => cr = true,
                b'\n' if cr => return Ok(()),
                _ => cr = false,
            }
        }
    }

    /// Consumes field lines until the separator line.
    pub(crate) fn decode(&mut self, src: &mut dyn DataSource) -> crate::Result<()> {
        loop {
            Self::read_line(src, &mut self.contents)?;

            let mut cur = self.last_line_end;
            while cur < self.contents.len() {
                let cr = match find_byte(&self.contents, cur, b'\r') {
                    Some(cr) => cr,
                    None => break,
                };
                if cr + 1 >= self.contents.len() {
                    break;
                }
                if self.contents[cr + 1] != b'\n' {
                    // bare CR inside a field line
                    return Err(Error::new_header());
                }
                if cr == cur {
                    return Ok(());
                }

                let line_end = cr + 2;
                if self.contents[cur].is_ascii_whitespace() {
                    // obsolete fold: the line belongs to the previous value
                    let (_, value) = self.fields.last_mut().ok_or_else(Error::new_fold)?;
                    self.last_line_end = line_end;
                    value.end = line_end;
                } else {
                    let colon = find_byte(&self.contents[..cr], cur, b':')
                        .ok_or_else(Error::new_header)?;
                    self.last_line_end = line_end;
                    self.fields.push((cur..colon, colon + 1..line_end));
                }
                cur = line_end;
            }
        }
    }

    /// Moves the accumulated fields into a header table and resets.
    pub(crate) fn rearrange(&mut self, dst: &mut Headers) {
        dst.clear();
        for (name, value) in self.fields.drain(..) {
            let name = produce(&self.contents[name]);
            let value = produce(&self.contents[value]);
            dst.add(HeaderName::make(&name), value);
        }
        self.contents.clear();
        self.last_line_end = 0;
    }
}

fn parse_version_number(text: &[u8]) -> crate::Result<u16> {
    if text.is_empty() || !text.iter().all(u8::is_ascii_digit) {
        return Err(Error::new_version());
    }
    std::str::from_utf8(text)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(Error::new_version)
}

fn parse_proto(text: &[u8]) -> crate::Result<HttpVersion> {
    if !text.starts_with(b"HTTP/") {
        return Err(Error::new_version());
    }
    let rest = &text[5..];
    let dot = rest
        .iter()
        .position(|&b| b == b'.')
        .ok_or_else(Error::new_version)?;
    let major = parse_version_number(&rest[..dot])?;
    let minor = parse_version_number(&rest[dot + 1..])?;
    Ok(HttpVersion::new(major, minor))
}

/// Parses one request: request line, then the header block.
#[derive(Default)]
pub(crate) struct RequestParser {
    proto: HttpVersion,
    method: String,
    resource: String,
    fields: FieldParser,
}

impl RequestParser {
    pub(crate) fn decode(&mut self, src: &mut dyn DataSource) -> crate::Result<()> {
        self.first_line(src)?;
        self.fields.decode(src)
    }

    // Method SP Request-URI SP HTTP-Version CRLF
    fn first_line(&mut self, src: &mut dyn DataSource) -> crate::Result<()> {
        let mut line = Vec::new();
        FieldParser::read_line(src, &mut line)?;
        line.truncate(line.len() - 2);

        let proto_sp = line
            .iter()
            .rposition(|&b| b == b' ')
            .ok_or_else(Error::new_request_line)?;
        let method_sp = line
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(Error::new_request_line)?;
        if proto_sp == method_sp {
            return Err(Error::new_request_line());
        }

        self.proto = parse_proto(&line[proto_sp + 1..])?;
        self.method = String::from_utf8_lossy(&line[..method_sp]).into_owned();

        // tolerate extra spaces around the request-target
        let mut start = method_sp;
        let mut end = proto_sp;
        while start < end && line[start] == b' ' {
            start += 1;
        }
        while start < end && line[end - 1] == b' ' {
            end -= 1;
        }
        if start == end {
            return Err(Error::new_request_line());
        }
        self.resource = String::from_utf8_lossy(&line[start..end]).into_owned();
        Ok(())
    }

    /// Consumes the parsed state into a [`Request`].
    ///
    /// HTTP/1.1 requests must carry `Host`; HTTP/1.0 (and lower) fall
    /// back to the server's own endpoint when it is absent. The
    /// authority port is always forced to the server's local port.
    pub(crate) fn extract(
        mut self,
        secure: bool,
        local_port: u16,
        local_host: &str,
    ) -> crate::Result<Request> {
        let token = self.method.to_ascii_uppercase();
        let method = Method::from_token(&token);
        let smethod = if method == Method::Other {
            token
        } else {
            String::new()
        };

        let mut headers = Headers::new();
        self.fields.rearrange(&mut headers);

        let authority = if self.proto <= HttpVersion::HTTP_10 {
            match headers.find_front(KnownHeader::Host) {
                Some(host) => host.to_owned(),
                None => local_host.to_owned(),
            }
        } else {
            headers
                .find_front(KnownHeader::Host)
                .map(str::to_owned)
                .ok_or_else(Error::new_host)?
        };

        let base = uri::request_base(secure, &authority, local_port)?;
        let uri = uri::canonical(&self.resource, &base)?;

        Ok(Request {
            method,
            smethod,
            uri,
            version: self.proto,
            params: Vec::new(),
            headers,
            payload: Vec::new(),
            extensions: Default::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DataSource, FieldParser, RequestParser};
    use crate::header::{Headers, KnownHeader};
    use crate::method::Method;
    use crate::version::HttpVersion;

    fn decode_fields(block: &[u8]) -> crate::Result<Headers> {
        let mut src: &[u8] = block;
        let mut parser = FieldParser::default();
        parser.decode(&mut src)?;
        let mut headers = Headers::new();
        parser.rearrange(&mut headers);
        Ok(headers)
    }

    fn decode_request(bytes: &[u8]) -> crate::Result<RequestParser> {
        let mut src: &[u8] = bytes;
        let mut parser = RequestParser::default();
        parser.decode(&mut src)?;
        Ok(parser)
    }

    #[test]
    fn test_field_round_trip() {
        let pairs = [
            ("Host", "example.com"),
            ("Via", "a"),
            ("Via", "b"),
            ("X-Custom", "odd value"),
        ];
        let mut block = Vec::new();
        for (name, value) in &pairs {
            block.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        block.extend_from_slice(b"\r\n");

        let headers = decode_fields(&block).unwrap();
        assert_eq!(headers.find_front(KnownHeader::Host), Some("example.com"));
        assert_eq!(headers.get_all(KnownHeader::Via), ["a", "b"]);
        assert_eq!(headers.find_front("x-custom"), Some("odd value"));
    }

    #[test]
    fn test_fold_collapses_to_one_space() {
        let headers =
            decode_fields(b"Subject: one\r\n\ttwo\r\n   three\r\n\r\n").unwrap();
        assert_eq!(headers.find_front("subject"), Some("one two three"));
    }

    #[test]
    fn test_fold_drops_whitespace_before_the_break() {
        let headers = decode_fields(b"Subject: one  \r\n two\r\n\r\n").unwrap();
        assert_eq!(headers.find_front("subject"), Some("one two"));
    }

    #[test]
    fn test_value_whitespace_is_trimmed() {
        let headers = decode_fields(b"Name:   padded \r\n\r\n").unwrap();
        assert_eq!(headers.find_front("name"), Some("padded"));
    }

    #[test]
    fn test_orphan_fold_is_an_error() {
        assert!(decode_fields(b" lonely\r\n\r\n").is_err());
    }

    #[test]
    fn test_missing_colon_is_an_error() {
        assert!(decode_fields(b"no colon here\r\n\r\n").is_err());
    }

    #[test]
    fn test_truncated_block_is_an_error() {
        assert!(decode_fields(b"Host: h\r\n").is_err());
    }

    #[test]
    fn test_request_line() {
        let parser = decode_request(b"GET /echo HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
        assert_eq!(parser.method, "GET");
        assert_eq!(parser.resource, "/echo");
        assert_eq!(parser.proto, HttpVersion::HTTP_11);
    }

    #[test]
    fn test_request_line_tolerates_extra_spaces() {
        let parser = decode_request(b"GET   /echo   HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(parser.resource, "/echo");
        assert_eq!(parser.proto, HttpVersion::HTTP_10);
    }

    #[test]
    fn test_bad_request_lines() {
        assert!(decode_request(b"GET/\r\n\r\n").is_err());
        assert!(decode_request(b"GET /x\r\n\r\n").is_err());
        assert!(decode_request(b"GET /x HTTP1.1\r\n\r\n").is_err());
        assert!(decode_request(b"GET /x HTTP/1.\r\n\r\n").is_err());
        assert!(decode_request(b"GET /x HTTP/.1\r\n\r\n").is_err());
        assert!(decode_request(b"GET /x HTTP/1.1x\r\n\r\n").is_err());
    }

    #[test]
    fn test_extract_absolute_uri() {
        let parser =
            decode_request(b"GET /echo?q=1 HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
        let req = parser.extract(false, 8080, "127.0.0.1").unwrap();
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.uri().as_str(), "http://example.com:8080/echo?q=1");
        assert_eq!(req.version(), HttpVersion::HTTP_11);
    }

    #[test]
    fn test_extract_http10_falls_back_to_local_endpoint() {
        let parser = decode_request(b"GET /x HTTP/1.0\r\n\r\n").unwrap();
        let req = parser.extract(false, 8080, "127.0.0.1").unwrap();
        assert_eq!(req.uri().as_str(), "http://127.0.0.1:8080/x");
    }

    #[test]
    fn test_extract_requires_host_on_11() {
        let parser = decode_request(b"GET /x HTTP/1.1\r\n\r\n").unwrap();
        assert!(parser.extract(false, 8080, "127.0.0.1").is_err());
    }

    #[test]
    fn test_extract_retains_custom_method() {
        let parser = decode_request(b"Move /x HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
        let req = parser.extract(false, 80, "").unwrap();
        assert_eq!(req.method(), Method::Other);
        assert_eq!(req.smethod(), "MOVE");
    }

    #[test]
    fn test_extract_forces_the_local_port() {
        let parser =
            decode_request(b"GET / HTTP/1.1\r\nHost: example.com:9999\r\n\r\n").unwrap();
        let req = parser.extract(true, 8443, "").unwrap();
        assert_eq!(req.uri().as_str(), "https://example.com:8443/");
    }

    #[test]
    fn test_data_source_reads_in_chunks() {
        let mut src: &[u8] = b"abc";
        let mut buf = [0u8; 2];
        assert_eq!(DataSource::get(&mut src, &mut buf), 2);
        assert_eq!(DataSource::get(&mut src, &mut buf), 1);
        assert_eq!(DataSource::get(&mut src, &mut buf), 0);
    }
}
