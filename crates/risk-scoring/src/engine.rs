//! Risk scoring rules

use serde::{Deserialize, Serialize};
use skin_features::{AggregatedMetrics, MetricBand};
use tracing::debug;

use crate::{
    FactorCategory, Melanation, QuestionnaireInput, RiskFactor, Severity, SkinType, SunExposure,
    ValidationError,
};

/// Points that map to a score of 0
pub const MAX_POINTS: u32 = 50;

pub const DISCLAIMER: &str = "Disclaimer: This assessment is for informational purposes only. \
Always consult a certified skin specialist or dermatologist for personalized guidance before \
undergoing any aesthetic treatments.";

const PATCH_TEST_TONE: &str =
    "Consider patch testing for chemical treatments and careful monitoring for hyperpigmentation risk.";
const PATCH_TEST_ALLERGY: &str = "Careful patch testing required before any new treatment.";
const HIGH_RISK_MEDICATION: &str = "isotretinoin";
const HIGH_RISK_TREATMENTS: [&str; 2] = ["deep chemical peel", "ablative laser"];
const MEDIUM_RISK_TREATMENTS: [&str; 3] = ["microneedling", "medium-depth peel", "medium peel"];

/// Score bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    /// Low at 70 and above, Moderate at 40 and above, High below
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            RiskTier::Low
        } else if score >= 40.0 {
            RiskTier::Moderate
        } else {
            RiskTier::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Moderate => "Moderate",
            RiskTier::High => "High",
        }
    }

    fn preamble(&self) -> &'static str {
        match self {
            RiskTier::Low => "Overall low risk. Proceed with usual precautions and standard consultation.",
            RiskTier::Moderate => {
                "Moderate risk. Consult a certified skin specialist or dermatologist before \
                 proceeding with invasive treatments."
            }
            RiskTier::High => {
                "High risk. Strongly recommend clearance from a certified dermatologist before \
                 any procedure."
            }
        }
    }

    fn tone_refinement(&self) -> &'static str {
        match self {
            RiskTier::Low => {
                "Given your skin color type, still consider a patch test if doing chemical peels or lasers."
            }
            RiskTier::Moderate => {
                "For your skin color type, start with light chemical peels or low-intensity \
                 treatments, possibly at more frequent intervals instead of one aggressive session. \
                 This reduces the chance of hypo-/hyperpigmentation. Patch testing is strongly advised."
            }
            RiskTier::High => {
                "With deeper/mixed skin tones, you have an elevated risk of post-inflammatory \
                 hyperpigmentation or scarring. Seek personalized supervision and opt for mild \
                 approaches first."
            }
        }
    }
}

/// Scored questionnaire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub risk_points: u32,
    /// Unrounded score in [0, 100]; drives the tier
    pub score: f64,
    pub rounded_score: u32,
    pub tier: RiskTier,
    pub melanation: Melanation,
    pub factors: Vec<RiskFactor>,
    pub recommendation: String,
    pub social_summary: String,
    pub disclaimer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AggregatedMetrics>,
}

/// Validate, then score
pub fn assess(
    input: &QuestionnaireInput,
    metrics: Option<&AggregatedMetrics>,
) -> Result<Assessment, ValidationError> {
    input.validate()?;
    let assessment = score(input, metrics);
    debug!(
        "Scored questionnaire: {} points, score {}, tier {}",
        assessment.risk_points,
        assessment.rounded_score,
        assessment.tier.label()
    );
    Ok(assessment)
}

/// Score a questionnaire.
///
/// Pure: identical inputs always produce identical output. Metrics only add
/// informational factors and never move the score.
pub fn score(input: &QuestionnaireInput, metrics: Option<&AggregatedMetrics>) -> Assessment {
    let mut points = 0u32;
    let mut factors = Vec::new();

    // Age
    let age_points = match input.age {
        a if a < 25 => 1,
        a if a < 35 => 2,
        a if a < 45 => 3,
        _ => 4,
    };
    points += age_points;
    factors.push(RiskFactor::new(
        FactorCategory::Lifestyle,
        if age_points <= 2 { Severity::Low } else { Severity::Medium },
        format!("Age-related considerations for {} years old", input.age),
    ));

    // Skin type
    let skin_points = skin_type_points(input.skin_type);
    points += skin_points;
    factors.push(RiskFactor::new(
        FactorCategory::Skin,
        tiered_severity(skin_points),
        format!("{} skin type considerations", input.skin_type.label()),
    ));

    // Skin tone
    let tone_points = melanation_points(input.melanation);
    points += tone_points;
    let mut tone = RiskFactor::new(
        FactorCategory::Skin,
        tiered_severity(tone_points),
        format!("{} skin tone considerations", input.melanation.label()),
    );
    if tone_points >= 2 {
        tone = tone.with_recommendation(PATCH_TEST_TONE);
    }
    factors.push(tone);

    if !input.concerns.is_empty() {
        let count = input.concerns.len() as u32;
        points += count;
        let severity = match count {
            1 => Severity::Low,
            2 => Severity::Medium,
            _ => Severity::High,
        };
        factors.push(RiskFactor::new(
            FactorCategory::Skin,
            severity,
            format!("Multiple skin concerns: {}", input.concerns.join(", ")),
        ));
    }

    if !input.allergies.is_empty() {
        points += input.allergies.len() as u32 * 2;
        factors.push(
            RiskFactor::new(
                FactorCategory::Skin,
                Severity::High,
                format!("Known allergies: {}", input.allergies.join(", ")),
            )
            .with_recommendation(PATCH_TEST_ALLERGY),
        );
    }

    if !input.underlying_conditions.is_empty() {
        let high_risk = input.underlying_conditions.iter().any(|c| {
            let c = c.to_lowercase();
            c.contains("immune") || c.contains("diabetes")
        });
        points += if high_risk {
            3
        } else {
            input.underlying_conditions.len() as u32
        };
        factors.push(
            RiskFactor::new(
                FactorCategory::Lifestyle,
                if high_risk { Severity::Critical } else { Severity::High },
                format!("Medical conditions: {}", input.underlying_conditions.join(", ")),
            )
            .with_recommendation("Medical clearance required before treatments."),
        );
    }

    if input
        .medications
        .iter()
        .any(|m| m.trim().eq_ignore_ascii_case(HIGH_RISK_MEDICATION))
    {
        points += 3;
        factors.push(
            RiskFactor::new(FactorCategory::Product, Severity::Critical, "Current isotretinoin use")
                .with_recommendation("Many treatments contraindicated while on isotretinoin."),
        );
    }

    if input.smoking {
        points += 2;
        factors.push(
            RiskFactor::new(FactorCategory::Lifestyle, Severity::Medium, "Active smoker")
                .with_recommendation("Smoking can affect healing and treatment results."),
        );
    }

    if input.sun_exposure == SunExposure::Heavy {
        points += 2;
        factors.push(
            RiskFactor::new(FactorCategory::Environmental, Severity::High, "High sun exposure")
                .with_recommendation("Sun protection crucial before and after treatments."),
        );
    }

    let high = matching_treatments(&input.treatments_wanted, &HIGH_RISK_TREATMENTS);
    if !high.is_empty() {
        points += 4;
        factors.push(
            RiskFactor::new(
                FactorCategory::Product,
                Severity::Critical,
                format!("High-risk treatments desired: {}", high.join(", ")),
            )
            .with_recommendation("Professional consultation required."),
        );
    }

    let medium = matching_treatments(&input.treatments_wanted, &MEDIUM_RISK_TREATMENTS);
    if !medium.is_empty() {
        points += 3;
        factors.push(
            RiskFactor::new(
                FactorCategory::Product,
                Severity::High,
                format!("Medium-risk treatments desired: {}", medium.join(", ")),
            )
            .with_recommendation("Patch testing and gradual approach recommended."),
        );
    }

    if input.pregnancy_or_breastfeeding {
        points += 5;
        factors.push(
            RiskFactor::new(FactorCategory::Lifestyle, Severity::Critical, "Pregnancy or breastfeeding")
                .with_recommendation("Many treatments contraindicated during pregnancy/breastfeeding."),
        );
    }

    if let Some(metrics) = metrics {
        factors.extend(metrics.metrics.iter().filter_map(|(metric, value)| {
            (MetricBand::from_score(value) == MetricBand::Poor).then(|| {
                RiskFactor::new(
                    FactorCategory::Skin,
                    Severity::Low,
                    format!("Low {} score from skin analysis ({:.0})", metric.name(), value),
                )
            })
        }));
    }

    let score = normalize(points);
    let tier = RiskTier::from_score(score);
    let rounded_score = score.round() as u32;

    let mut recommendation = tier.preamble().to_string();
    if input.melanation.is_pigmentation_prone() {
        recommendation.push(' ');
        recommendation.push_str(tier.tone_refinement());
    }

    let social_summary = format!(
        "My #BeautyRisk score is {} ({}) with a {} skin tone! #PatchTest #HealthySkin \
         #SkinToneCare Always consult a professional before starting new skincare treatments.",
        rounded_score,
        tier.label(),
        input.melanation.label()
    );

    Assessment {
        risk_points: points,
        score,
        rounded_score,
        tier,
        melanation: input.melanation,
        factors,
        recommendation,
        social_summary,
        disclaimer: DISCLAIMER.to_string(),
        metrics: metrics.copied(),
    }
}

fn normalize(points: u32) -> f64 {
    (100.0 - points as f64 * 100.0 / MAX_POINTS as f64).clamp(0.0, 100.0)
}

fn skin_type_points(skin_type: SkinType) -> u32 {
    match skin_type {
        SkinType::Oily => 2,
        SkinType::Dry => 1,
        SkinType::Sensitive => 3,
        SkinType::Combination => 2,
        SkinType::Normal => 1,
    }
}

fn melanation_points(melanation: Melanation) -> u32 {
    match melanation {
        Melanation::None => 2,
        Melanation::Light => 1,
        Melanation::Medium => 2,
        Melanation::Dark => 3,
        Melanation::VeryDark => 4,
        Melanation::Mixed => 3,
    }
}

fn tiered_severity(points: u32) -> Severity {
    match points {
        p if p >= 3 => Severity::High,
        2 => Severity::Medium,
        _ => Severity::Low,
    }
}

/// Requested treatments whose normalized name contains any of `needles`
fn matching_treatments<'a>(wanted: &'a [String], needles: &[&str]) -> Vec<&'a str> {
    wanted
        .iter()
        .filter(|t| {
            let name = t.to_lowercase().replace('_', " ");
            needles.iter().any(|n| name.contains(n))
        })
        .map(String::as_str)
        .collect()
}
