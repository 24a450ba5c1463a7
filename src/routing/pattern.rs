//! Registration-key parsing and path-template compilation.
//!
//! # Responsibilities
//! - Parse a registration key into method qualifier, host qualifier, path
//! - Compile `{name}` templates into single-segment capture matchers
//! - Reject malformed keys at registration time, never at request time
//!
//! # Design Decisions
//! - Host matching is case-insensitive (per HTTP spec)
//! - Path matching is case-sensitive
//! - No regex in the match path; templates compile to typed segments
//! - Compilation happens once per distinct template string

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;

/// Verbs accepted as a leading method qualifier.
const METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::HEAD,
    Method::OPTIONS,
    Method::DELETE,
];

/// Errors raised while parsing a registration key.
///
/// All of these are registration-time failures: a router refuses to start
/// with a malformed route table rather than silently dropping entries.
#[derive(Debug, Error)]
pub enum PatternError {
    /// Leading verb token is not in the recognized method set.
    #[error("unsupported method '{method}' in pattern '{pattern}'")]
    UnknownMethod { pattern: String, method: String },

    /// The key has no path component at all.
    #[error("pattern '{0}' is missing a path")]
    MissingPath(String),

    /// A `{...}` token is unbalanced, empty, or embedded in a segment.
    #[error("malformed capture segment '{segment}' in pattern '{pattern}'")]
    MalformedCapture { pattern: String, segment: String },
}

/// One component of a compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Static text that must match exactly.
    Literal(String),
    /// A `{name}` capture matching exactly one non-slash segment.
    Capture(String),
}

/// A path template compiled into typed segments.
///
/// Matching requires the same segment count as the template, with each
/// capture consuming exactly one non-empty segment. A single trailing slash
/// on the request path is tolerated.
#[derive(Debug)]
pub struct CompiledTemplate {
    segments: Vec<Segment>,
    capture_count: usize,
}

impl CompiledTemplate {
    fn compile(pattern: &str, template: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        let mut capture_count = 0;

        for raw in template.split('/') {
            match classify_segment(raw) {
                Some(Segment::Capture(name)) => {
                    capture_count += 1;
                    segments.push(Segment::Capture(name));
                }
                Some(literal) => segments.push(literal),
                None => {
                    return Err(PatternError::MalformedCapture {
                        pattern: pattern.to_string(),
                        segment: raw.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            segments,
            capture_count,
        })
    }

    /// Number of `{name}` captures in this template.
    pub fn capture_count(&self) -> usize {
        self.capture_count
    }

    /// Match a request path, returning captured (name, value) pairs in
    /// declaration order, or `None` when the path does not fit.
    pub fn match_path(&self, path: &str) -> Option<Vec<(String, String)>> {
        // "/foo/bar/" and "/foo/bar" are the same request target here.
        let path = match path.strip_suffix('/') {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => path,
        };

        let mut parts = path.split('/');
        let mut values = Vec::with_capacity(self.capture_count);

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) => {
                    if part != lit {
                        return None;
                    }
                }
                Segment::Capture(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    values.push((name.clone(), part.to_string()));
                }
            }
        }

        // Exact segment count: a longer path is not a match.
        if parts.next().is_some() {
            return None;
        }

        Some(values)
    }
}

/// Classify one raw path segment. Returns `None` for malformed captures
/// (stray or embedded braces, empty identifier).
fn classify_segment(raw: &str) -> Option<Segment> {
    match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(name) => {
            let valid = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            valid.then(|| Segment::Capture(name.to_string()))
        }
        None => {
            // Braces anywhere else in the segment are unbalanced.
            if raw.contains('{') || raw.contains('}') {
                None
            } else {
                Some(Segment::Literal(raw.to_string()))
            }
        }
    }
}

/// Shared compilation memo, keyed by template string.
///
/// Built while a router parses its registration table, so two patterns like
/// `GET /id/{id}` and `POST /id/{id}` share one compiled matcher. Nothing
/// compiles after construction; the memo is bounded by the route table.
#[derive(Debug, Default)]
pub struct TemplateCache {
    compiled: HashMap<String, Arc<CompiledTemplate>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_compile(
        &mut self,
        pattern: &str,
        template: &str,
    ) -> Result<Arc<CompiledTemplate>, PatternError> {
        if let Some(compiled) = self.compiled.get(template) {
            return Ok(compiled.clone());
        }
        let compiled = Arc::new(CompiledTemplate::compile(pattern, template)?);
        self.compiled
            .insert(template.to_string(), compiled.clone());
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// An immutable route registration: `[METHOD ]['host/']path`.
///
/// Patterns without captures match by literal prefix (the net/http mux
/// convention: `/foo` serves both `/foo` and `/foo/...`). Patterns with
/// captures match segment-for-segment.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    key: String,
    method: Option<Method>,
    host: Option<String>,
    path: String,
    template: Option<Arc<CompiledTemplate>>,
}

impl RoutePattern {
    /// Parse a single registration key with a private compilation memo.
    pub fn parse(key: &str) -> Result<Self, PatternError> {
        Self::parse_with(key, &mut TemplateCache::new())
    }

    /// Parse a registration key, sharing compiled templates via `templates`.
    pub fn parse_with(key: &str, templates: &mut TemplateCache) -> Result<Self, PatternError> {
        let trimmed = key.trim();

        // An optional leading verb token, separated by whitespace.
        let (method, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((token, rest)) => {
                let method = METHODS
                    .iter()
                    .find(|m| m.as_str() == token)
                    .cloned()
                    .ok_or_else(|| PatternError::UnknownMethod {
                        pattern: key.to_string(),
                        method: token.to_string(),
                    })?;
                (Some(method), rest.trim_start())
            }
            None => (None, trimmed),
        };

        // Anything before the first '/' is a host qualifier.
        let (host, path) = if rest.starts_with('/') {
            (None, rest.to_string())
        } else {
            match rest.find('/') {
                Some(idx) => (
                    Some(rest[..idx].to_ascii_lowercase()),
                    rest[idx..].to_string(),
                ),
                None => return Err(PatternError::MissingPath(key.to_string())),
            }
        };

        if path.is_empty() {
            return Err(PatternError::MissingPath(key.to_string()));
        }

        let compiled = templates.get_or_compile(key, &path)?;
        let template = (compiled.capture_count() > 0).then_some(compiled);

        Ok(Self {
            key: key.to_string(),
            method,
            host,
            path,
            template,
        })
    }

    /// The raw registration key; also the handler-cache key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The literal path portion (template text for wildcard patterns).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn has_captures(&self) -> bool {
        self.template.is_some()
    }

    /// Evaluate this pattern against a request. Returns extracted bindings
    /// (empty for literal matches) or `None` when the pattern does not
    /// apply. Method and host qualifiers disqualify quietly.
    pub fn match_request(
        &self,
        path: &str,
        method: &Method,
        host: Option<&str>,
    ) -> Option<Vec<(String, String)>> {
        if let Some(required) = &self.method {
            if required != method {
                return None;
            }
        }

        if let Some(required) = &self.host {
            match host {
                Some(actual) if actual.eq_ignore_ascii_case(required) => {}
                _ => return None,
            }
        }

        // Literal prefix match first; wildcard templates segment-match.
        if path.starts_with(&self.path) {
            return Some(Vec::new());
        }

        self.template.as_ref().and_then(|t| t.match_path(path))
    }
}
