//! Header names and the header table.
//!
//! A header name is either one of the closed set of RFC 2616 names, kept
//! as a cheap enum with a fixed canonical spelling, or an extension name
//! stored lower-cased. Lookup is case-insensitive either way because both
//! arms normalize at construction time.
use std::fmt;

macro_rules! known_headers {
    (
        $(
            ($canonical:literal, $variant:ident)
        ),+ $(,)?
    ) => {
        /// The closed set of header names this crate knows the canonical
        /// spelling of.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub enum KnownHeader {
            $(
                #[doc = $canonical]
                $variant,
            )+
        }

        impl KnownHeader {
            /// The canonical wire spelling.
            pub fn as_str(&self) -> &'static str {
                match *self {
                    $( KnownHeader::$variant => $canonical, )+
                }
            }

            /// Case-insensitive lookup of a header token.
            pub fn from_token(token: &str) -> Option<KnownHeader> {
                $(
                    if token.eq_ignore_ascii_case($canonical) {
                        return Some(KnownHeader::$variant);
                    }
                )+
                None
            }
        }
    }
}

known_headers! {
    // Request headers (RFC 2616, section 5.3)
    ("Accept", Accept),
    ("Accept-Charset", AcceptCharset),
    ("Accept-Encoding", AcceptEncoding),
    ("Accept-Language", AcceptLanguage),
    ("Authorization", Authorization),
    ("Expect", Expect),
    ("From", From),
    ("Host", Host),
    ("If-Match", IfMatch),
    ("If-Modified-Since", IfModifiedSince),
    ("If-None-Match", IfNoneMatch),
    ("If-Range", IfRange),
    ("If-Unmodified-Since", IfUnmodifiedSince),
    ("Max-Forwards", MaxForwards),
    ("Proxy-Authorization", ProxyAuthorization),
    ("Range", Range),
    ("Referer", Referer),
    ("TE", Te),
    ("User-Agent", UserAgent),
    // Response headers (section 6.2)
    ("Accept-Ranges", AcceptRanges),
    ("Age", Age),
    ("ETag", ETag),
    ("Location", Location),
    ("Proxy-Authenticate", ProxyAuthenticate),
    ("Retry-After", RetryAfter),
    ("Server", Server),
    ("Vary", Vary),
    ("WWW-Authenticate", WwwAuthenticate),
    // Entity headers (section 7.1)
    ("Allow", Allow),
    ("Content-Encoding", ContentEncoding),
    ("Content-Language", ContentLanguage),
    ("Content-Length", ContentLength),
    ("Content-Location", ContentLocation),
    ("Content-MD5", ContentMd5),
    ("Content-Range", ContentRange),
    ("Content-Type", ContentType),
    ("Expires", Expires),
    ("Last-Modified", LastModified),
    // General headers (section 14)
    ("Cache-Control", CacheControl),
    ("Connection", Connection),
    ("Date", Date),
    ("Pragma", Pragma),
    ("Trailer", Trailer),
    ("Transfer-Encoding", TransferEncoding),
    ("Upgrade", Upgrade),
    ("Via", Via),
    ("Warning", Warning),
    // Cookie headers
    ("Cookie", Cookie),
    ("Set-Cookie", SetCookie),
}

impl fmt::Display for KnownHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A header field name: a known name, or a lower-cased extension.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum HeaderName {
    /// One of the canonical RFC 2616 names.
    Known(KnownHeader),
    /// Anything else, stored lower-cased.
    Extension(String),
}

impl HeaderName {
    /// Canonicalizes a raw field name.
    pub fn make(name: &str) -> HeaderName {
        match KnownHeader::from_token(name) {
            Some(known) => HeaderName::Known(known),
            None => HeaderName::Extension(name.to_ascii_lowercase()),
        }
    }

    /// The name as written on the wire: the canonical spelling for known
    /// headers, the stored lower-cased form for extensions.
    pub fn as_str(&self) -> &str {
        match *self {
            HeaderName::Known(known) => known.as_str(),
            HeaderName::Extension(ref ext) => ext,
        }
    }
}

impl From<KnownHeader> for HeaderName {
    fn from(known: KnownHeader) -> HeaderName {
        HeaderName::Known(known)
    }
}

impl From<&str> for HeaderName {
    fn from(name: &str) -> HeaderName {
        HeaderName::make(name)
    }
}

impl From<String> for HeaderName {
    fn from(name: String) -> HeaderName {
        HeaderName::make(&name)
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An insertion-ordered multimap of header fields.
///
/// The same key may repeat; values under one key keep the order they were
/// added in, and keys keep the order of their first insertion.
#[derive(Clone, Debug, Default)]
pub struct Headers {
    entries: Vec<(HeaderName, Vec<String>)>,
}

impl Headers {
    /// Creates an empty table.
    pub fn new() -> Headers {
        Headers::default()
    }

    fn entry_mut(&mut self, key: &HeaderName) -> Option<&mut Vec<String>> {
        self.entries
            .iter_mut()
            .find(|(name, _)| name == key)
            .map(|(_, values)| values)
    }

    fn entry(&self, key: &HeaderName) -> Option<&Vec<String>> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, values)| values)
    }

    /// Appends a value under `key`.
    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<HeaderName>,
        V: Into<String>,
    {
        let key = key.into();
        let value = value.into();
        match self.entry_mut(&key) {
            Some(values) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Replaces all values under `key` with a single one.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<HeaderName>,
        V: Into<String>,
    {
        let key = key.into();
        self.erase(key.clone());
        self.entries.push((key, vec![value.into()]));
    }

    /// Removes `key` entirely.
    pub fn erase<K: Into<HeaderName>>(&mut self, key: K) {
        let key = key.into();
        self.entries.retain(|(name, _)| *name != key);
    }

    /// The first value under `key`, if any.
    pub fn find_front<K: Into<HeaderName>>(&self, key: K) -> Option<&str> {
        let key = key.into();
        self.entry(&key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Whether `key` has at least one value.
    pub fn has<K: Into<HeaderName>>(&self, key: K) -> bool {
        let key = key.into();
        self.entry(&key).map_or(false, |values| !values.is_empty())
    }

    /// All values under `key`, in insertion order.
    pub fn get_all<K: Into<HeaderName>>(&self, key: K) -> &[String] {
        let key = key.into();
        self.entry(&key).map_or(&[], Vec::as_slice)
    }

    /// Iterates keys with their value lists, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name, values.as_slice()))
    }

    /// The number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every field.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
