//! Health pool arithmetic.
//!
//! Sign convention: a positive amount is damage to the current value, a
//! negative amount is healing. Additive pools flip the sign before calling in.

use serde::{Deserialize, Serialize};

/// Health values read once per target at the start of an application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub current: f64,
    pub max: f64,
    /// Temporary pool, `None` when the subtype has none.
    pub temp: Option<f64>,
}

impl HealthSnapshot {
    pub fn new(current: f64, max: f64) -> Self {
        Self {
            current,
            max,
            temp: None,
        }
    }

    pub fn with_temp(mut self, temp: f64) -> Self {
        self.temp = Some(temp);
        self
    }

    /// The snapshot's values as an unchanged result.
    pub fn unchanged(&self) -> HealthResult {
        HealthResult {
            new_current: self.current,
            new_temp: self.temp,
        }
    }
}

/// New health values after an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthResult {
    pub new_current: f64,
    pub new_temp: Option<f64>,
}

impl HealthResult {
    /// How much of the temporary pool was used up relative to `snapshot`.
    pub fn temp_absorbed(&self, snapshot: &HealthSnapshot) -> f64 {
        match (snapshot.temp, self.new_temp) {
            (Some(before), Some(after)) => (before - after).max(0.0),
            _ => 0.0,
        }
    }
}

/// Apply a signed amount to a health pool.
///
/// The temporary pool absorbs damage first and is never touched by healing.
/// The current value is clamped to `max`, and to zero from below unless
/// `allow_negative` is set.
pub fn compute_new_health(
    snapshot: &HealthSnapshot,
    signed_amount: f64,
    allow_negative: bool,
) -> HealthResult {
    match snapshot.temp {
        None => HealthResult {
            new_current: clamp_current(snapshot.current - signed_amount, snapshot.max, allow_negative),
            new_temp: None,
        },
        Some(temp) => {
            let absorbed = if signed_amount > 0.0 {
                temp.max(0.0).min(signed_amount)
            } else {
                0.0
            };
            let remaining = signed_amount - absorbed;
            HealthResult {
                new_current: clamp_current(snapshot.current - remaining, snapshot.max, allow_negative),
                new_temp: Some((temp - absorbed).max(0.0)),
            }
        }
    }
}

fn clamp_current(raw: f64, max: f64, allow_negative: bool) -> f64 {
    let floored = if allow_negative { raw } else { raw.max(0.0) };
    floored.min(max)
}

/// KO and death thresholds for one application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub ko: f64,
    pub death: f64,
}

impl Thresholds {
    /// Round to the nearest integer and clamp to zero unless negative health
    /// is allowed.
    pub fn normalized(ko: f64, death: f64, allow_negative: bool) -> Self {
        let normalize = |value: f64| {
            let value = if value.is_finite() { value.round() } else { 0.0 };
            if allow_negative {
                value
            } else {
                value.max(0.0)
            }
        };
        Self {
            ko: normalize(ko),
            death: normalize(death),
        }
    }

    /// Additive pools are knocked out and killed by filling up to `max`.
    pub fn additive(max: f64) -> Self {
        Self { ko: max, death: max }
    }
}
