//! Questionnaire input

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MIN_AGE: u32 = 18;
const MAX_AGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkinType {
    Oily,
    Dry,
    Combination,
    Sensitive,
    Normal,
}

impl SkinType {
    pub fn label(&self) -> &'static str {
        match self {
            SkinType::Oily => "Oily",
            SkinType::Dry => "Dry",
            SkinType::Combination => "Combination",
            SkinType::Sensitive => "Sensitive",
            SkinType::Normal => "Normal",
        }
    }
}

/// Self-reported skin tone category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Melanation {
    None,
    Light,
    Medium,
    Dark,
    #[serde(rename = "Very Dark", alias = "VeryDark")]
    VeryDark,
    Mixed,
}

impl Melanation {
    pub fn label(&self) -> &'static str {
        match self {
            Melanation::None => "None",
            Melanation::Light => "Light",
            Melanation::Medium => "Medium",
            Melanation::Dark => "Dark",
            Melanation::VeryDark => "Very Dark",
            Melanation::Mixed => "Mixed",
        }
    }

    /// Deeper or mixed tones with elevated pigmentation risk
    pub fn is_pigmentation_prone(&self) -> bool {
        matches!(
            self,
            Melanation::Medium | Melanation::Dark | Melanation::VeryDark | Melanation::Mixed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SunExposure {
    Minimal,
    #[default]
    Moderate,
    Heavy,
}

/// Daily water intake. Recorded, not scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaterIntake {
    #[serde(rename = "<1L")]
    UnderOneLiter,
    #[serde(rename = "1-2L")]
    OneToTwoLiters,
    #[serde(rename = ">2L")]
    OverTwoLiters,
}

/// Structured questionnaire answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireInput {
    pub age: u32,
    pub gender: String,
    pub skin_type: SkinType,
    pub melanation: Melanation,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default, alias = "conditions")]
    pub underlying_conditions: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub smoking: bool,
    #[serde(default)]
    pub sun_exposure: SunExposure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_intake: Option<WaterIntake>,
    #[serde(default)]
    pub treatments_wanted: Vec<String>,
    #[serde(default, alias = "pregnancy")]
    pub pregnancy_or_breastfeeding: bool,
}

impl QuestionnaireInput {
    /// Minimal type and range checks; stops at the first problem
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_AGE..=MAX_AGE).contains(&self.age) {
            return Err(ValidationError::OutOfRange {
                field: "age",
                value: self.age,
                min: MIN_AGE,
                max: MAX_AGE,
            });
        }
        if self.gender.trim().is_empty() {
            return Err(ValidationError::MissingField("gender"));
        }

        let lists: [(&'static str, &[String]); 5] = [
            ("concerns", &self.concerns),
            ("allergies", &self.allergies),
            ("underlyingConditions", &self.underlying_conditions),
            ("medications", &self.medications),
            ("treatmentsWanted", &self.treatments_wanted),
        ];
        for (field, entries) in lists {
            if let Some(index) = entries.iter().position(|e| e.trim().is_empty()) {
                return Err(ValidationError::BlankEntry { field, index });
            }
        }
        Ok(())
    }
}
