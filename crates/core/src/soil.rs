use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NutrientLevel {
    Low,
    Medium,
    High,
}

impl NutrientLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            NutrientLevel::Low => "Low",
            NutrientLevel::Medium => "Medium",
            NutrientLevel::High => "High",
        }
    }
}

impl fmt::Display for NutrientLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A nitrogen, phosphorus or potassium reading: either a measured quantity or
/// a categorical level. Thresholds only ever apply to the numeric form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NutrientValue {
    Numeric(f64),
    Level(NutrientLevel),
}

impl NutrientValue {
    /// True when the reading is the `Low` level or a number below `threshold`.
    pub fn is_deficient(self, threshold: f64) -> bool {
        match self {
            NutrientValue::Level(level) => level == NutrientLevel::Low,
            NutrientValue::Numeric(value) => value < threshold,
        }
    }
}

impl fmt::Display for NutrientValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NutrientValue::Numeric(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{value:.1}")
            }
            NutrientValue::Numeric(value) => write!(f, "{value}"),
            NutrientValue::Level(level) => write!(f, "{level}"),
        }
    }
}

/// Validated soil and nutrient reading for one advisory request.
///
/// String fields hold the title-cased canonical form (`"Sandy"`, `"Low"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilInfo {
    pub soil_type: String,
    pub moisture: String,
    pub organic: String,
    pub n: NutrientValue,
    pub p: NutrientValue,
    pub k: NutrientValue,
    pub season: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_display_keeps_a_decimal() {
        assert_eq!(NutrientValue::Numeric(20.0).to_string(), "20.0");
        assert_eq!(NutrientValue::Numeric(12.5).to_string(), "12.5");
        assert_eq!(NutrientValue::Level(NutrientLevel::Medium).to_string(), "Medium");
    }

    #[test]
    fn deficiency_checks_each_form_independently() {
        assert!(NutrientValue::Level(NutrientLevel::Low).is_deficient(30.0));
        assert!(!NutrientValue::Level(NutrientLevel::Medium).is_deficient(30.0));
        assert!(!NutrientValue::Level(NutrientLevel::High).is_deficient(1e9));
        assert!(NutrientValue::Numeric(29.9).is_deficient(30.0));
        assert!(!NutrientValue::Numeric(30.0).is_deficient(30.0));
    }

    #[test]
    fn serializes_as_tagged_value() {
        let json = serde_json::to_string(&NutrientValue::Numeric(42.0)).unwrap();
        assert_eq!(json, r#"{"kind":"numeric","value":42.0}"#);
        let level: NutrientValue =
            serde_json::from_str(r#"{"kind":"level","value":"Low"}"#).unwrap();
        assert_eq!(level, NutrientValue::Level(NutrientLevel::Low));
    }
}
