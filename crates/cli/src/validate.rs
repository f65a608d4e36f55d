use agrosense_core::{NutrientLevel, NutrientValue, SoilInfo};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: Empty input")]
    Empty { field: &'static str },
    #[error("{field}: Enter a number or Low/Medium/High (got {value:?})")]
    InvalidNutrient { field: &'static str, value: String },
}

/// Raw form values as typed by the farmer.
#[derive(Debug, Clone, Default)]
pub struct SoilForm {
    pub soil_type: String,
    pub moisture: String,
    pub organic: String,
    pub n: String,
    pub p: String,
    pub k: String,
    pub season: String,
}

impl SoilForm {
    pub fn validate(&self) -> Result<SoilInfo, ValidationError> {
        Ok(SoilInfo {
            soil_type: normalize_str("soil type", &self.soil_type)?,
            moisture: normalize_str("moisture", &self.moisture)?,
            organic: normalize_str("organic", &self.organic)?,
            n: parse_nutrient("N", &self.n)?,
            p: parse_nutrient("P", &self.p)?,
            k: parse_nutrient("K", &self.k)?,
            season: normalize_str("season", &self.season)?,
        })
    }
}

/// Trims and title-cases: a letter is uppercased when the character before it
/// is not a letter, lowercased otherwise.
pub fn normalize_str(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    let mut out = String::with_capacity(trimmed.len());
    let mut after_letter = false;
    for ch in trimmed.chars() {
        if ch.is_alphabetic() {
            if after_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            after_letter = true;
        } else {
            out.push(ch);
            after_letter = false;
        }
    }
    Ok(out)
}

pub fn parse_nutrient(field: &'static str, raw: &str) -> Result<NutrientValue, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if let Ok(number) = trimmed.parse::<f64>() {
        if number.is_finite() {
            return Ok(NutrientValue::Numeric(number));
        }
    }
    let level = match trimmed.to_lowercase().as_str() {
        "low" => NutrientLevel::Low,
        "medium" => NutrientLevel::Medium,
        "high" => NutrientLevel::High,
        _ => {
            return Err(ValidationError::InvalidNutrient {
                field,
                value: trimmed.to_string(),
            })
        }
    };
    Ok(NutrientValue::Level(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_cases_words() {
        assert_eq!(normalize_str("soil", "  sandy LOAM ").unwrap(), "Sandy Loam");
        assert_eq!(normalize_str("soil", "kandi-belt").unwrap(), "Kandi-Belt");
        assert_eq!(normalize_str("season", "rabi2").unwrap(), "Rabi2");
        assert_eq!(
            normalize_str("soil", " \t").unwrap_err(),
            ValidationError::Empty { field: "soil" }
        );
    }

    #[test]
    fn nutrients_accept_numbers_and_levels() {
        assert_eq!(parse_nutrient("N", " 42 ").unwrap(), NutrientValue::Numeric(42.0));
        assert_eq!(parse_nutrient("N", "12.5").unwrap(), NutrientValue::Numeric(12.5));
        assert_eq!(
            parse_nutrient("P", "mEdIuM").unwrap(),
            NutrientValue::Level(NutrientLevel::Medium)
        );
        assert_eq!(
            parse_nutrient("K", "LOW").unwrap(),
            NutrientValue::Level(NutrientLevel::Low)
        );
    }

    #[test]
    fn nutrients_reject_everything_else() {
        assert_eq!(
            parse_nutrient("N", "").unwrap_err(),
            ValidationError::Empty { field: "N" }
        );
        for raw in ["lots", "NaN", "inf", "12kg"] {
            let err = parse_nutrient("K", raw).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidNutrient { field: "K", .. }));
            assert!(err.to_string().contains("Enter a number or Low/Medium/High"));
        }
    }

    #[test]
    fn form_validation_reports_first_bad_field() {
        let mut form = SoilForm {
            soil_type: "sandy".into(),
            moisture: "low".into(),
            organic: "poor".into(),
            n: "20".into(),
            p: "high".into(),
            k: "50".into(),
            season: "kharif".into(),
        };
        let soil = form.validate().unwrap();
        assert_eq!(soil.soil_type, "Sandy");
        assert_eq!(soil.organic, "Poor");
        assert_eq!(soil.p, NutrientValue::Level(NutrientLevel::High));

        form.p = "plenty".into();
        assert!(matches!(
            form.validate(),
            Err(ValidationError::InvalidNutrient { field: "P", .. })
        ));
    }
}
