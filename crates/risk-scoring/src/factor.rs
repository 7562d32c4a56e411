//! Risk factors

use serde::{Deserialize, Serialize};

/// Factor severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Points deducted from the legacy 100-point severity index
    pub fn deduction(&self) -> u32 {
        match self {
            Severity::Low => 5,
            Severity::Medium => 10,
            Severity::High => 15,
            Severity::Critical => 25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactorCategory {
    Skin,
    Product,
    Lifestyle,
    Environmental,
}

/// One itemized contributor to an assessment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub category: FactorCategory,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl RiskFactor {
    pub fn new(category: FactorCategory, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            description: description.into(),
            recommendation: None,
        }
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// Severity-weighted index: 100 minus each factor's deduction, floored at 0
pub fn severity_index(factors: &[RiskFactor]) -> u32 {
    let deducted: u32 = factors.iter().map(|f| f.severity.deduction()).sum();
    100u32.saturating_sub(deducted)
}
