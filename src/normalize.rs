//! Conversion of source-native records into the canonical [`Product`] shape.
//!
//! Pure functions: same input, same output, no I/O. Missing optional fields
//! fall back to `0`/`None`; a record without both a name and a source-native
//! identifier is rejected because it can neither be displayed nor
//! deduplicated.

use crate::clients::{Food, FoodServing, OffProduct};
use crate::error::ResolveError;
use crate::model::{Product, Source};
use crate::serving::{self, RawServing};

fn parse_f64(value: &Option<String>) -> f64 {
    value
        .as_deref()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0.0)
}

fn parse_opt_f64(value: &Option<String>) -> Option<f64> {
    value.as_deref().and_then(|s| s.trim().parse().ok())
}

/// Convert one primary-API serving record into the unit-agnostic raw shape.
/// Prefers the metric amount; falls back to the household measure.
fn to_raw_serving(serving: &FoodServing) -> Option<RawServing> {
    let (amount, unit) = match (
        parse_opt_f64(&serving.metric_serving_amount),
        serving.metric_serving_unit.as_ref(),
    ) {
        (Some(amount), Some(unit)) => (amount, unit.clone()),
        _ => (
            parse_opt_f64(&serving.number_of_units)?,
            serving.measurement_description.clone()?,
        ),
    };

    Some(RawServing {
        amount,
        unit,
        calories: parse_f64(&serving.calories),
        protein: parse_f64(&serving.protein),
        fat: parse_f64(&serving.fat),
        carbs: parse_f64(&serving.carbohydrate),
        fiber: parse_opt_f64(&serving.fiber),
        sodium: parse_opt_f64(&serving.sodium),
    })
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Normalize a primary-API food record.
///
/// Fails with [`ResolveError::MissingIdentity`] when the record lacks a name
/// or an id, and with [`ResolveError::UnusableServings`] when no serving can
/// be resolved to a 100 g/ml equivalent.
pub fn primary_food_to_product(food: &Food) -> Result<Product, ResolveError> {
    let name = clean(&food.food_name).ok_or(ResolveError::MissingIdentity)?;
    let source_id = clean(&food.food_id).ok_or(ResolveError::MissingIdentity)?;

    let servings: Vec<RawServing> = food
        .servings
        .as_ref()
        .map(|s| s.serving.iter().filter_map(to_raw_serving).collect())
        .unwrap_or_default();
    let per_100 = serving::resolve_to_100(&servings).ok_or(ResolveError::UnusableServings)?;

    Ok(Product {
        id: None,
        name,
        brand: clean(&food.brand_name),
        barcode: None,
        calories_per_100g: per_100.calories.max(0.0),
        protein_per_100g: per_100.protein.max(0.0),
        fats_per_100g: per_100.fat.max(0.0),
        carbs_per_100g: per_100.carbs.max(0.0),
        source: Source::FatSecret,
        source_id: Some(source_id),
        image_url: clean(&food.food_image),
    })
}

/// Normalize an Open Food Facts record. Nutriments are already per 100 g;
/// missing values map to `0`, not to absence.
pub fn off_product_to_product(raw: &OffProduct) -> Result<Product, ResolveError> {
    let name = clean(&raw.product_name).ok_or(ResolveError::MissingIdentity)?;
    let code = clean(&raw.code).ok_or(ResolveError::MissingIdentity)?;

    Ok(Product {
        id: None,
        name,
        brand: clean(&raw.brands),
        barcode: Some(code.clone()),
        calories_per_100g: raw.nutriments.energy_kcal_100g.unwrap_or(0.0).max(0.0),
        protein_per_100g: raw.nutriments.proteins_100g.unwrap_or(0.0).max(0.0),
        fats_per_100g: raw.nutriments.fat_100g.unwrap_or(0.0).max(0.0),
        carbs_per_100g: raw.nutriments.carbohydrates_100g.unwrap_or(0.0).max(0.0),
        source: Source::OpenFoodFacts,
        source_id: Some(code),
        image_url: clean(&raw.image_url),
    })
}
