use serde::{Deserialize, Serialize};

/// Where a product record originally came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Source {
    /// Entered by hand; has no source-native identifier
    User,
    OpenFoodFacts,
    FatSecret,
    Usda,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::User => "user",
            Source::OpenFoodFacts => "openfoodfacts",
            Source::FatSecret => "fatsecret",
            Source::Usda => "usda",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical product shape shared by every source.
///
/// Macros are always per 100 g (or 100 ml for liquids) and always present;
/// a source that does not report a value contributes `0.0`, never a gap.
/// `(source, source_id)` is the natural key used to deduplicate non-user
/// products against the local store; `barcode` is a secondary natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    /// Present once the product has been persisted to the local store
    pub id: Option<i64>,
    pub name: String,
    pub brand: Option<String>,
    pub barcode: Option<String>,
    pub calories_per_100g: f64,
    pub protein_per_100g: f64,
    pub fats_per_100g: f64,
    pub carbs_per_100g: f64,
    pub source: Source,
    /// The upstream system's native identifier; `None` for user entries
    pub source_id: Option<String>,
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Source::OpenFoodFacts).unwrap(),
            "\"openfoodfacts\""
        );
        assert_eq!(serde_json::to_string(&Source::User).unwrap(), "\"user\"");
        assert_eq!(Source::FatSecret.as_str(), "fatsecret");
        assert_eq!(Source::Usda.to_string(), "usda");
    }
}
