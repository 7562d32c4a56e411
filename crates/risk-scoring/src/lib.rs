//! Beauty Risk Scoring
//!
//! Turns questionnaire answers (and optionally aggregated skin metrics) into
//! an itemized risk assessment:
//! - Rule table accumulating risk points and factors
//! - Normalized 0-100 score and Low/Moderate/High tier
//! - Tier and skin-tone specific recommendation text

mod engine;
mod error;
mod factor;
mod questionnaire;

pub use engine::{assess, score, Assessment, RiskTier, DISCLAIMER, MAX_POINTS};
pub use error::ValidationError;
pub use factor::{severity_index, FactorCategory, RiskFactor, Severity};
pub use questionnaire::{Melanation, QuestionnaireInput, SkinType, SunExposure, WaterIntake};
