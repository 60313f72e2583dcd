use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: DateTime<Utc>,
    pub price: f64,
}

/// The latest known price of an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentPrice {
    pub symbol: String,
    pub time: DateTime<Utc>,
    pub price: f64,
}

/// Exchange rates from `base_currency` to every currency in `rates`,
/// valid at `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRates {
    pub base_currency: String,
    pub time: DateTime<Utc>,
    pub rates: BTreeMap<String, f64>,
}

impl ExchangeRates {
    pub fn rate_to(&self, currency: &str) -> Option<f64> {
        self.rates.get(&currency.to_uppercase()).copied()
    }
}

/// A stock split: `numerator` new shares for every `denominator` old ones.
/// A reverse split has `denominator > numerator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSplit {
    pub time: DateTime<Utc>,
    pub numerator: u32,
    pub denominator: u32,
}

/// Largest smaller term considered when turning a split factor into a ratio.
const MAX_SPLIT_TERM: u64 = 1000;

impl InstrumentSplit {
    /// Build a split from a multiplicative factor (4.0 for a 4-for-1 split,
    /// 1.5 for 3-for-2, 0.4 for a 2-for-5 reverse split).
    ///
    /// The factor becomes the closest reduced fraction whose smaller term is
    /// at most 1000. A non-finite or non-positive factor yields 1:1.
    pub fn from_factor(time: DateTime<Utc>, factor: f64) -> Self {
        let (numerator, denominator) = if factor.is_finite() && factor > 0.0 {
            if factor >= 1.0 {
                to_ratio(factor)
            } else {
                let (d, n) = to_ratio(1.0 / factor);
                (n, d)
            }
        } else {
            (1, 1)
        };
        Self {
            time,
            numerator,
            denominator,
        }
    }

    pub fn factor(&self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }
}

/// Best rational approximation of `x >= 1` by continued-fraction convergents,
/// stopping before the denominator exceeds [`MAX_SPLIT_TERM`]. Convergents
/// are already in lowest terms.
fn to_ratio(x: f64) -> (u32, u32) {
    let (mut h_prev, mut h) = (0u64, 1u64);
    let (mut k_prev, mut k) = (1u64, 0u64);
    let mut rest = x;

    for _ in 0..32 {
        let a = rest.floor();
        if a > u32::MAX as f64 {
            break;
        }
        let a = a as u64;
        let h_next = a * h + h_prev;
        let k_next = a * k + k_prev;
        if k_next > MAX_SPLIT_TERM || h_next > u64::from(u32::MAX) {
            break;
        }
        (h_prev, h) = (h, h_next);
        (k_prev, k) = (k, k_next);

        let frac = rest - rest.floor();
        if frac < 1e-9 || (h as f64 / k as f64 - x).abs() < 1e-9 {
            break;
        }
        rest = 1.0 / frac;
    }

    if k == 0 {
        return ((x.round() as u32).max(1), 1);
    }
    (h.max(1) as u32, k as u32)
}
