// Household Classification - Scoring Rules
// Four household attributes are scored and summed into one of three tiers.
// Everything in this module is pure: no I/O, no state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

// ============================================================================
// CATEGORIES
// ============================================================================

/// Education level as offered by the entry form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Education {
    NoSchooling,
    Elementary,
    JuniorHigh,
    SeniorHigh,
    Diploma,
    BachelorOrAbove,
}

impl Education {
    pub const ALL: [Education; 6] = [
        Education::NoSchooling,
        Education::Elementary,
        Education::JuniorHigh,
        Education::SeniorHigh,
        Education::Diploma,
        Education::BachelorOrAbove,
    ];

    /// Label stored in the database and shown in the form
    pub fn label(&self) -> &'static str {
        match self {
            Education::NoSchooling => "Tidak Sekolah",
            Education::Elementary => "SD",
            Education::JuniorHigh => "SMP",
            Education::SeniorHigh => "SMA/SMK",
            Education::Diploma => "Diploma",
            Education::BachelorOrAbove => "S1 ke atas",
        }
    }

    pub fn score(&self) -> i64 {
        match self {
            Education::NoSchooling => 0,
            Education::Elementary => 10,
            Education::JuniorHigh => 20,
            Education::SeniorHigh => 30,
            Education::Diploma => 40,
            Education::BachelorOrAbove => 50,
        }
    }

    /// Exact label match
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.label() == label)
    }
}

/// Head-of-household occupation as offered by the entry form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupation {
    Unemployed,
    Laborer,
    SmallBusiness,
    PrivateEmployee,
    CivilServant,
}

impl Occupation {
    pub const ALL: [Occupation; 5] = [
        Occupation::Unemployed,
        Occupation::Laborer,
        Occupation::SmallBusiness,
        Occupation::PrivateEmployee,
        Occupation::CivilServant,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Occupation::Unemployed => "Pengangguran",
            Occupation::Laborer => "Buruh / Tani / Pekerja kasar",
            Occupation::SmallBusiness => "Wiraswasta kecil",
            Occupation::PrivateEmployee => "Pegawai swasta",
            Occupation::CivilServant => "PNS / Profesional",
        }
    }

    pub fn score(&self) -> i64 {
        match self {
            Occupation::Unemployed => 0,
            Occupation::Laborer => 10,
            Occupation::SmallBusiness => 20,
            Occupation::PrivateEmployee => 30,
            Occupation::CivilServant => 40,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|o| o.label() == label)
    }
}

/// Score for an education label that is not in the table (same as SMP)
pub const DEFAULT_EDUCATION_SCORE: i64 = 20;

/// Score for an occupation label that is not in the table
pub const DEFAULT_OCCUPATION_SCORE: i64 = 10;

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Wealth tier derived from the total score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    #[serde(rename = "Miskin")]
    Poor,
    #[serde(rename = "Menengah")]
    Middle,
    #[serde(rename = "Kaya")]
    Wealthy,
}

impl Classification {
    pub const ALL: [Classification; 3] = [
        Classification::Poor,
        Classification::Middle,
        Classification::Wealthy,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Poor => "Miskin",
            Classification::Middle => "Menengah",
            Classification::Wealthy => "Kaya",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.label() == label)
    }

    /// Tier for a total score: <50 poor, [50,110) middle, >=110 wealthy
    pub fn from_total(total: i64) -> Self {
        if total < 50 {
            Classification::Poor
        } else if total < 110 {
            Classification::Middle
        } else {
            Classification::Wealthy
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-attribute scores behind a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub income: i64,
    pub education: i64,
    pub children: i64,
    pub occupation: i64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> i64 {
        self.income + self.education + self.children + self.occupation
    }

    pub fn classification(&self) -> Classification {
        Classification::from_total(self.total())
    }
}

/// Income band score over half-open intervals `[low, high)`
pub fn income_score(income: f64) -> i64 {
    if income < 2_000_000.0 {
        0
    } else if income < 4_000_000.0 {
        30
    } else if income < 7_000_000.0 {
        60
    } else {
        100
    }
}

pub fn education_score(education: &str) -> i64 {
    Education::from_label(education)
        .map(|e| e.score())
        .unwrap_or(DEFAULT_EDUCATION_SCORE)
}

pub fn children_score(children: i64) -> i64 {
    if children < 2 {
        10
    } else if children < 4 {
        -10
    } else {
        -20
    }
}

pub fn occupation_score(occupation: &str) -> i64 {
    Occupation::from_label(occupation)
        .map(|o| o.score())
        .unwrap_or(DEFAULT_OCCUPATION_SCORE)
}

pub fn score(income: f64, education: &str, children: i64, occupation: &str) -> ScoreBreakdown {
    ScoreBreakdown {
        income: income_score(income),
        education: education_score(education),
        children: children_score(children),
        occupation: occupation_score(occupation),
    }
}

/// Classify a household from typed inputs
pub fn classify(income: f64, education: &str, children: i64, occupation: &str) -> Classification {
    score(income, education, children, occupation).classification()
}

// ============================================================================
// UNTYPED INPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("{field}: '{value}' is not a number")]
    NotANumber { field: &'static str, value: String },
}

/// Coerce a raw cell to a number. Missing values become 0.
pub fn coerce_number(field: &'static str, value: &Value) -> Result<f64, ClassifyError> {
    match value {
        Value::Null | Value::Bool(false) => Ok(0.0),
        Value::Bool(true) => Ok(1.0),
        Value::Number(n) => Ok(n.as_f64().filter(|v| !v.is_nan()).unwrap_or(0.0)),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(0.0);
            }
            match trimmed.parse::<f64>() {
                Ok(v) if v.is_nan() => Ok(0.0),
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(ClassifyError::NotANumber {
                    field,
                    value: s.clone(),
                }),
            }
        }
        other => Err(ClassifyError::NotANumber {
            field,
            value: other.to_string(),
        }),
    }
}

/// Coerce a raw cell to a whole count, truncating toward zero
pub fn coerce_count(field: &'static str, value: &Value) -> Result<i64, ClassifyError> {
    let number = coerce_number(field, value)?;
    if !number.is_finite() {
        return Err(ClassifyError::NotANumber {
            field,
            value: value.to_string(),
        });
    }
    Ok(number.trunc() as i64)
}

/// Render a raw cell as a category label; null is the empty string
pub fn coerce_label(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Classify a household from raw, possibly missing cell values
pub fn classify_raw(
    income: &Value,
    education: &Value,
    children: &Value,
    occupation: &Value,
) -> Result<Classification, ClassifyError> {
    let income = coerce_number("monthly_income", income)?;
    let children = coerce_count("num_children", children)?;
    Ok(classify(
        income,
        &coerce_label(education),
        children,
        &coerce_label(occupation),
    ))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_income_band_boundaries_fall_into_higher_band() {
        assert_eq!(income_score(1_999_999.99), 0);
        assert_eq!(income_score(2_000_000.0), 30);
        assert_eq!(income_score(3_999_999.0), 30);
        assert_eq!(income_score(4_000_000.0), 60);
        assert_eq!(income_score(6_999_999.0), 60);
        assert_eq!(income_score(7_000_000.0), 100);
    }

    #[test]
    fn test_children_adjustment() {
        assert_eq!(children_score(0), 10);
        assert_eq!(children_score(1), 10);
        assert_eq!(children_score(2), -10);
        assert_eq!(children_score(3), -10);
        assert_eq!(children_score(4), -20);
        assert_eq!(children_score(9), -20);
    }

    #[test]
    fn test_top_education_and_job_with_low_income_is_middle() {
        // 0 + 50 + 10 + 40 = 100
        let breakdown = score(1_500_000.0, "S1 ke atas", 0, "PNS / Profesional");
        assert_eq!(breakdown.total(), 100);
        assert_eq!(
            classify(1_500_000.0, "S1 ke atas", 0, "PNS / Profesional"),
            Classification::Middle
        );
    }

    #[test]
    fn test_unemployed_large_family_is_poor() {
        // 0 + 0 - 20 + 0 = -20
        let breakdown = score(500_000.0, "Tidak Sekolah", 5, "Pengangguran");
        assert_eq!(breakdown.total(), -20);
        assert_eq!(breakdown.classification(), Classification::Poor);
    }

    #[test]
    fn test_wealthy_threshold() {
        // 100 + 30 + 10 + 30 = 170
        assert_eq!(
            classify(7_000_000.0, "SMA/SMK", 1, "Pegawai swasta"),
            Classification::Wealthy
        );
        // 60 + 20 + 10 + 20 = 110, exactly on the boundary
        assert_eq!(
            classify(4_000_000.0, "SMP", 0, "Wiraswasta kecil"),
            Classification::Wealthy
        );
        // 60 + 20 - 10 + 20 = 90
        assert_eq!(
            classify(4_000_000.0, "SMP", 2, "Wiraswasta kecil"),
            Classification::Middle
        );
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Classification::from_total(49), Classification::Poor);
        assert_eq!(Classification::from_total(50), Classification::Middle);
        assert_eq!(Classification::from_total(109), Classification::Middle);
        assert_eq!(Classification::from_total(110), Classification::Wealthy);
    }

    #[test]
    fn test_unknown_categories_use_default_scores() {
        let breakdown = score(0.0, "Sekolah Sihir", 0, "Astronot");
        assert_eq!(breakdown.education, DEFAULT_EDUCATION_SCORE);
        assert_eq!(breakdown.occupation, DEFAULT_OCCUPATION_SCORE);

        // Garbage labels score exactly like SMP + laborer
        assert_eq!(
            score(2_500_000.0, "???", 3, "???"),
            score(2_500_000.0, "SMP", 3, "Buruh / Tani / Pekerja kasar")
        );
    }

    #[test]
    fn test_classify_is_deterministic() {
        let first = classify(3_100_000.0, "Diploma", 2, "Pegawai swasta");
        for _ in 0..10 {
            assert_eq!(classify(3_100_000.0, "Diploma", 2, "Pegawai swasta"), first);
        }
    }

    #[test]
    fn test_raw_missing_values_coerce_to_zero() {
        let with_nulls = classify_raw(&Value::Null, &json!("SD"), &Value::Null, &json!("Pengangguran"))
            .unwrap();
        assert_eq!(with_nulls, classify(0.0, "SD", 0, "Pengangguran"));

        let with_blanks = classify_raw(&json!(""), &json!("SD"), &json!("  "), &json!("Pengangguran"))
            .unwrap();
        assert_eq!(with_blanks, with_nulls);
    }

    #[test]
    fn test_raw_numeric_strings_are_parsed() {
        let result = classify_raw(
            &json!("7500000"),
            &json!("S1 ke atas"),
            &json!("1"),
            &json!("PNS / Profesional"),
        )
        .unwrap();
        assert_eq!(result, Classification::Wealthy);
    }

    #[test]
    fn test_raw_children_are_truncated() {
        assert_eq!(coerce_count("num_children", &json!(3.9)).unwrap(), 3);
        assert_eq!(coerce_count("num_children", &json!("2.0")).unwrap(), 2);
    }

    #[test]
    fn test_raw_non_numeric_income_is_an_error() {
        let err = classify_raw(&json!("banyak"), &json!("SD"), &json!(1), &json!("Pengangguran"))
            .unwrap_err();
        assert_eq!(
            err,
            ClassifyError::NotANumber {
                field: "monthly_income",
                value: "banyak".to_string()
            }
        );
    }

    #[test]
    fn test_raw_infinite_income_is_an_error() {
        for raw in ["inf", "-inf", "Infinity", "1e400"] {
            let err = coerce_number("monthly_income", &json!(raw)).unwrap_err();
            assert_eq!(
                err,
                ClassifyError::NotANumber {
                    field: "monthly_income",
                    value: raw.to_string()
                }
            );
        }
        assert!(coerce_count("num_children", &json!("inf")).is_err());
    }

    #[test]
    fn test_raw_non_string_category_hits_default() {
        let numeric_edu = classify_raw(&json!(0), &json!(42), &json!(0), &json!(7)).unwrap();
        // 0 + 20 + 10 + 10 = 40
        assert_eq!(numeric_edu, Classification::Poor);
    }

    #[test]
    fn test_labels_round_trip_through_lookup() {
        for edu in Education::ALL {
            assert_eq!(Education::from_label(edu.label()), Some(edu));
        }
        for job in Occupation::ALL {
            assert_eq!(Occupation::from_label(job.label()), Some(job));
        }
        assert_eq!(Classification::from_label("Kaya"), Some(Classification::Wealthy));
        assert_eq!(Education::from_label("sd"), None);
    }
}
