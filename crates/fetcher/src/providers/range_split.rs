use chrono::{Duration, NaiveDate};

use crate::models::response::{Response, StatusCode};

/// Split the inclusive day range `from..=to` into consecutive inclusive
/// sub-ranges of at most `max_days` days. Returns nothing for an inverted
/// range; `max_days == 0` is treated as 1.
pub fn split_date_range(from: NaiveDate, to: NaiveDate, max_days: u32) -> Vec<(NaiveDate, NaiveDate)> {
    let step = i64::from(max_days.max(1));
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = (start + Duration::days(step - 1)).min(to);
        ranges.push((start, end));
        match end.succ_opt() {
            Some(next) => start = next,
            None => break,
        }
    }
    ranges
}

/// Merge the responses of the sub-calls of one logical request.
///
/// Any success makes the whole thing `Ok`, with the successful parts
/// concatenated in sub-call order. Gaps left by failed sub-calls stay empty.
/// If everything failed, the result is `ConnectionError` when every failure
/// was connection-related and `OtherError` otherwise.
pub fn merge_sub_responses<T>(source_name: &str, responses: Vec<Response<Vec<T>>>) -> Response<Vec<T>> {
    if responses.is_empty() {
        return Response::ok(Vec::new());
    }

    let total = responses.len();
    let mut merged = Vec::new();
    let mut succeeded = 0usize;
    let mut all_connection_errors = true;
    let mut last_error = None;

    for response in responses {
        if response.is_ok() {
            succeeded += 1;
            if let Ok(part) = response.into_result() {
                merged.extend(part);
            }
            continue;
        }
        if response.status() != StatusCode::ConnectionError {
            all_connection_errors = false;
        }
        last_error = response.error_message().map(str::to_owned);
    }

    if succeeded > 0 {
        if succeeded < total {
            log::warn!(
                "{source_name}: {} of {total} sub-requests failed, returning partial data ({})",
                total - succeeded,
                last_error.as_deref().unwrap_or("unknown error")
            );
        }
        return Response::ok(merged);
    }

    let message = format!(
        "{source_name}: all {total} sub-requests failed; last error: {}",
        last_error.as_deref().unwrap_or("unknown error")
    );
    if all_connection_errors {
        Response::connection_error(message)
    } else {
        Response::other_error(message)
    }
}
