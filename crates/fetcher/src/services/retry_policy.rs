use std::time::Duration;

/// Back-off intervals applied between request handler rounds.
///
/// A round is one pass over every candidate source. With `n` intervals the
/// handler runs at most `n + 1` rounds, sleeping `intervals[i]` before round
/// `i + 1`. An empty policy (the default) means a single round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    intervals: Vec<Duration>,
}

impl RetryPolicy {
    /// One round, no retry.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(intervals: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            intervals: intervals.into_iter().collect(),
        }
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs))
    }

    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    /// Total number of rounds this policy allows.
    pub fn rounds(&self) -> usize {
        self.intervals.len() + 1
    }

    pub fn is_none(&self) -> bool {
        self.intervals.is_empty()
    }
}
