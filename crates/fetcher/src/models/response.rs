use serde::{Deserialize, Serialize};

/// Outcome category of a fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    /// Transient network-layer failure (timeout, DNS, TLS, refused connection).
    ConnectionError,
    /// Non-transient failure: malformed payload, provider error, invalid input.
    OtherError,
    /// Local limiter denial or provider HTTP 429.
    RateLimitExceeded,
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::Ok => write!(f, "Ok"),
            StatusCode::ConnectionError => write!(f, "ConnectionError"),
            StatusCode::OtherError => write!(f, "OtherError"),
            StatusCode::RateLimitExceeded => write!(f, "RateLimitExceeded"),
        }
    }
}

/// Uniform success/failure envelope returned by every data source attempt
/// and by the request handler itself.
///
/// `result` is present only when `status` is [`StatusCode::Ok`]; every other
/// status carries an error message. The fields are private, so a `Response`
/// comes either from the constructors below or from deserialization, which
/// rejects envelopes that break the rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "RawResponse<T>",
    bound(deserialize = "T: Deserialize<'de>")
)]
pub struct Response<T> {
    status: StatusCode,
    result: Option<T>,
    error_message: Option<String>,
}

/// Wire shape of [`Response`] before the status/result rule is checked.
#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct RawResponse<T> {
    status: StatusCode,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error_message: Option<String>,
}

impl<T> TryFrom<RawResponse<T>> for Response<T> {
    type Error = String;

    fn try_from(raw: RawResponse<T>) -> Result<Self, Self::Error> {
        match (raw.status, raw.result, raw.error_message) {
            (StatusCode::Ok, Some(result), None) => Ok(Response::ok(result)),
            (StatusCode::Ok, None, _) => Err("Ok response without a result".to_string()),
            (StatusCode::Ok, Some(_), Some(_)) => {
                Err("Ok response must not carry an error message".to_string())
            }
            (status, Some(_), _) => Err(format!("{status} response must not carry a result")),
            (status, None, None) => Err(format!("{status} response without an error message")),
            (status, None, Some(message)) => Ok(Response::failure(status, message)),
        }
    }
}

impl<T> Response<T> {
    pub fn ok(result: T) -> Self {
        Self {
            status: StatusCode::Ok,
            result: Some(result),
            error_message: None,
        }
    }

    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::failure(StatusCode::ConnectionError, message)
    }

    pub fn other_error(message: impl Into<String>) -> Self {
        Self::failure(StatusCode::OtherError, message)
    }

    pub fn rate_limit_exceeded(message: impl Into<String>) -> Self {
        Self::failure(StatusCode::RateLimitExceeded, message)
    }

    /// Build a failed response. Passing [`StatusCode::Ok`] is treated as
    /// `OtherError`, since an `Ok` response needs a result.
    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        let status = match status {
            StatusCode::Ok => StatusCode::OtherError,
            other => other,
        };
        Self {
            status,
            result: None,
            error_message: Some(message.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Ok
    }

    pub fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Transform the payload, keeping status and message.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            status: self.status,
            result: self.result.map(f),
            error_message: self.error_message,
        }
    }

    /// Continue with a fallible step on success; a failure passes through
    /// with its status and message unchanged.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Response<U>) -> Response<U> {
        match self.result {
            Some(result) if self.status == StatusCode::Ok => f(result),
            _ => Response {
                status: self.status,
                result: None,
                error_message: self.error_message,
            },
        }
    }

    /// Consume the envelope. `Err` carries the error message.
    pub fn into_result(self) -> Result<T, String> {
        match self.result {
            Some(result) if self.status == StatusCode::Ok => Ok(result),
            _ => Err(self
                .error_message
                .unwrap_or_else(|| format!("request failed with status {}", self.status))),
        }
    }
}
