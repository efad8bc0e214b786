//! Express-style path patterns, compiled to anchored regexes.
//!
//! A mask like `/users/:id(\d+)` or `/files/*` becomes a regex plus an
//! ordered list of keys; matching a request path binds one [`Param`] per
//! key. The grammar and construction follow pillarjs/path-to-regexp.
use std::fmt;
use std::mem;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;

/// How a mask is compiled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    /// Preserve a trailing slash instead of making it optional.
    pub strict: bool,
    /// Anchor the pattern at the end of the path.
    pub end: bool,
    /// Match case-sensitively.
    pub sensitive: bool,
    /// Hint the regex engine to spend time optimizing.
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> CompileOptions {
        CompileOptions {
            strict: false,
            end: true,
            sensitive: true,
            optimize: true,
        }
    }
}

/// The name a pattern key binds under: positional for unnamed groups,
/// textual for `:name` keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamName {
    /// Unnamed group, counted left to right from zero.
    Index(usize),
    /// A `:name` key.
    Name(String),
}

/// One binding produced by a successful match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    /// Which key bound this value.
    pub name: ParamName,
    /// The captured text; empty for unmatched optional keys.
    pub value: String,
}

#[derive(Clone, Debug)]
struct Key {
    name: ParamName,
    prefix: String,
    pattern: String,
    optional: bool,
    repeat: bool,
    partial: bool,
}

#[derive(Clone, Debug)]
enum Token {
    Literal(String),
    Key(Key),
}

// Characters that would be regex operators if a literal leaked through.
fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '.' | '+' | '*' | '?' | '=' | '^' | '!' | '$' | '{' | '}' | '(' | ')' | '[' | ']'
                | ':' | '|' | '/' | '\\'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// Group-delimiting characters inside a user-supplied capture pattern.
fn escape_group(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '=' | '!' | ':' | '$' | '/' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// Matches, in one scan: escaped literals ("\:"), named keys with an
// optional capture ("/:id(\d+)?"), unnamed groups ("/(foo|bar)+") and the
// bare asterisk ("/*"), each with an optional [/.] prefix and modifier.
static PATH_SCANNER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\\.)|([/.])?(?:(?::(\w+)(?:\(((?:\\.|[^\\()])+)\))?|\(((?:\\.|[^\\()])+)\))([+*?])?|(\*))")
        .expect("path scanner pattern")
});

fn parse(mask: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut path = String::new();
    let mut key_index = 0usize;
    let mut last = 0usize;

    for caps in PATH_SCANNER.captures_iter(mask) {
        let whole = caps.get(0).expect("whole match");
        path.push_str(&mask[last..whole.start()]);
        last = whole.end();

        // Already escaped sequences pass through as literal text.
        if let Some(escaped) = caps.get(1) {
            path.push_str(&escaped.as_str()[1..]);
            continue;
        }

        let next = mask[last..].chars().next();
        let prefix = caps.get(2).map_or("", |m| m.as_str());
        let name = caps.get(3).map_or("", |m| m.as_str());
        let capture = caps.get(4).map_or("", |m| m.as_str());
        let group = caps.get(5).map_or("", |m| m.as_str());
        let modifier = caps.get(6).map_or("", |m| m.as_str());
        let asterisk = caps.get(7).is_some();

        if !path.is_empty() {
            tokens.push(Token::Literal(mem::take(&mut path)));
        }

        let partial = !prefix.is_empty() && next.map_or(false, |c| !prefix.starts_with(c));
        let repeat = modifier == "+" || modifier == "*";
        let optional = modifier == "?" || modifier == "*";
        let delimiter = if prefix.is_empty() { "/" } else { prefix };
        let pattern = if !capture.is_empty() {
            escape_group(capture)
        } else if !group.is_empty() {
            escape_group(group)
        } else if asterisk {
            ".*".to_owned()
        } else {
            format!("[^{}]+?", escape_string(delimiter))
        };

        let name = if name.is_empty() {
            let index = key_index;
            key_index += 1;
            ParamName::Index(index)
        } else {
            ParamName::Name(name.to_owned())
        };

        tokens.push(Token::Key(Key {
            name,
            prefix: prefix.to_owned(),
            pattern,
            optional,
            repeat,
            partial,
        }));
    }

    if last < mask.len() {
        path.push_str(&mask[last..]);
    }
    if !path.is_empty() {
        tokens.push(Token::Literal(path));
    }
    tokens
}

fn build_route(tokens: &[Token], options: CompileOptions) -> (String, Vec<Key>) {
    let ends_with_slash = matches!(
        tokens.last(),
        Some(Token::Literal(text)) if text.ends_with('/')
    );

    let mut route = String::new();
    let mut keys = Vec::new();

    for token in tokens {
        match token {
            Token::Literal(text) => route.push_str(&escape_string(text)),
            Token::Key(key) => {
                let prefix = escape_string(&key.prefix);
                let base = format!("(?:{})", key.pattern);
                let mut capture = base.clone();
                if key.repeat {
                    capture.push_str(&format!("(?:{}{})*", prefix, base));
                }
                let capture = if key.optional {
                    if key.partial {
                        format!("{}({})?", prefix, capture)
                    } else {
                        format!("(?:{}({}))?", prefix, capture)
                    }
                } else {
                    format!("{}({})", prefix, capture)
                };
                route.push_str(&capture);
                keys.push(key.clone());
            }
        }
    }

    // In non-strict mode a trailing slash in the mask becomes optional at
    // the very end of the match.
    if !options.strict {
        if ends_with_slash {
            route.truncate(route.len() - 2); // the escaped "\/"
        }
        route.push_str("/?");
    }

    // The matcher anchors both ends; the engine has no look-ahead, so the
    // non-end mode's (?=/|$) reduces to the same end anchor here.
    (format!("^{}$", route), keys)
}

/// A compiled mask: the anchored regex plus its key list.
pub struct Matcher {
    regex: Regex,
    keys: Vec<Key>,
}

impl Matcher {
    /// Compiles a mask.
    pub fn new(mask: &str, options: CompileOptions) -> crate::Result<Matcher> {
        let tokens = parse(mask);
        let (route, keys) = build_route(&tokens, options);
        let route = if options.sensitive {
            route
        } else {
            format!("(?i){}", route)
        };
        let regex = Regex::new(&route).map_err(Error::new_mask)?;
        Ok(Matcher { regex, keys })
    }

    /// Matches a whole path, binding one param per key on success.
    /// Unmatched optional keys bind the empty string.
    pub fn matches(&self, path: &str, params: &mut Vec<Param>) -> bool {
        let caps = match self.regex.captures(path) {
            Some(caps) => caps,
            None => return false,
        };

        params.clear();
        params.reserve(self.keys.len());
        for (index, key) in self.keys.iter().enumerate() {
            let value = caps
                .get(index + 1)
                .map_or("", |m| m.as_str())
                .to_owned();
            params.push(Param {
                name: key.name.clone(),
                value,
            });
        }
        true
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("regex", &self.regex.as_str())
            .field("keys", &self.keys.len())
            .finish()
    }
}
