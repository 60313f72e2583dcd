use thiserror::Error;

/// Error type for configuration and programming errors.
///
/// Operational failures (network down, provider rate limit, malformed
/// payload) never surface as `FetcherError`; they travel inside a
/// [`Response`](crate::models::response::Response) instead.
#[derive(Debug, Error)]
pub enum FetcherError {
    // ── Composition ─────────────────────────────────────────────────
    #[error("No data source registered for {request} -> {result}")]
    NoSources {
        request: String,
        result: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // ── I/O and parsing ─────────────────────────────────────────────
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),
}

impl FetcherError {
    pub(crate) fn no_sources<Req, Res>() -> Self {
        FetcherError::NoSources {
            request: short_type_name::<Req>(),
            result: short_type_name::<Res>(),
        }
    }
}

/// Strip module paths from a type name, keeping generic arguments readable
/// (`alloc::vec::Vec<porteval_fetcher::models::price::PricePoint>` becomes
/// `Vec<PricePoint>`).
pub(crate) fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for c in full.chars() {
        match c {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
                segment.clear();
                out.push(c);
            }
            _ => segment.push(c),
        }
    }
    out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
    out
}

/// Remove query strings from a message. Several providers take their API key
/// as a query parameter and reqwest errors embed the full URL.
pub(crate) fn redact_query(msg: &str) -> String {
    let mut out = String::with_capacity(msg.len());
    let mut rest = msg;
    while let Some(idx) = rest.find('?') {
        out.push_str(&rest[..idx]);
        out.push_str("?<query redacted>");
        let tail = &rest[idx..];
        let end = tail
            .find(|c: char| c.is_whitespace() || c == ')' || c == '"')
            .unwrap_or(tail.len());
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for FetcherError {
    fn from(e: std::io::Error) -> Self {
        FetcherError::FileIO(e.to_string())
    }
}

impl From<serde_json::Error> for FetcherError {
    fn from(e: serde_json::Error) -> Self {
        FetcherError::Deserialization(e.to_string())
    }
}
