//! Serving-size resolution.
//!
//! Upstream sources report nutrition per arbitrary servings ("1 cup",
//! "30 g", "2 cookies"). Everything downstream works in per-100g macros, so
//! this module locates or computes the serving equivalent to 100 grams or
//! 100 milliliters. Pure functions, no I/O.

use serde::{Deserialize, Serialize};

/// A single serving as reported by an upstream source, pre-normalization.
///
/// Never exposed outside the normalizer boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawServing {
    pub amount: f64,
    pub unit: String,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: Option<f64>,
    pub sodium: Option<f64>,
}

fn is_metric_unit(unit: &str) -> bool {
    matches!(
        unit.trim().to_lowercase().as_str(),
        "g" | "gram" | "grams" | "ml" | "milliliter" | "milliliters" | "millilitre"
            | "millilitres"
    )
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn scale_serving(serving: &RawServing, unit: &str) -> RawServing {
    let scale = 100.0 / serving.amount;
    RawServing {
        amount: 100.0,
        unit: unit.to_string(),
        calories: round2(serving.calories * scale),
        protein: round2(serving.protein * scale),
        fat: round2(serving.fat * scale),
        carbs: round2(serving.carbs * scale),
        fiber: serving.fiber.map(|v| round2(v * scale)),
        sodium: serving.sodium.map(|v| round2(v * scale)),
    }
}

/// Find or compute the serving equivalent to 100 g / 100 ml.
///
/// Strategy, in strict priority order:
/// 1. a serving reported as exactly 100 in a metric unit is returned verbatim;
/// 2. the first metric serving with a positive amount is scaled by `100/amount`;
/// 3. failing that, the first serving of any unit is scaled the same way.
///
/// Returns `None` for an empty list or when the only candidate has a
/// non-positive amount; the caller must treat that food as unusable rather
/// than zeroing it.
pub fn resolve_to_100(servings: &[RawServing]) -> Option<RawServing> {
    // 1. exact 100 g / 100 ml match
    if let Some(exact) = servings
        .iter()
        .find(|s| is_metric_unit(&s.unit) && (s.amount - 100.0).abs() < f64::EPSILON)
    {
        return Some(exact.clone());
    }

    // 2. proportional scale from the first metric serving
    if let Some(metric) = servings
        .iter()
        .find(|s| is_metric_unit(&s.unit) && s.amount > 0.0)
    {
        return Some(scale_serving(metric, metric.unit.trim()));
    }

    // 3. no recognized metric unit: scale the first serving regardless of unit
    let first = servings.first()?;
    if first.amount > 0.0 {
        return Some(scale_serving(first, &first.unit));
    }

    None
}
