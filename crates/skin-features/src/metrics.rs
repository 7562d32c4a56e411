//! Skin metric vector

use serde::{Deserialize, Serialize};

/// One of the eight skin metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinMetric {
    Hydration,
    Elasticity,
    Texture,
    Pores,
    Wrinkles,
    Spots,
    Uniformity,
    Brightness,
}

impl SkinMetric {
    pub const ALL: [SkinMetric; 8] = [
        SkinMetric::Hydration,
        SkinMetric::Elasticity,
        SkinMetric::Texture,
        SkinMetric::Pores,
        SkinMetric::Wrinkles,
        SkinMetric::Spots,
        SkinMetric::Uniformity,
        SkinMetric::Brightness,
    ];

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            SkinMetric::Hydration => "Hydration",
            SkinMetric::Elasticity => "Elasticity",
            SkinMetric::Texture => "Skin Texture",
            SkinMetric::Pores => "Pores",
            SkinMetric::Wrinkles => "Wrinkles",
            SkinMetric::Spots => "Spots & Pigmentation",
            SkinMetric::Uniformity => "Tone Uniformity",
            SkinMetric::Brightness => "Brightness",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SkinMetric::Hydration => "Estimated moisture from overall skin luminance",
            SkinMetric::Elasticity => "Firmness estimated from the density of strong edges",
            SkinMetric::Texture => "Analysis of skin surface texture and evenness",
            SkinMetric::Pores => "Visibility of fine high-frequency detail such as pores",
            SkinMetric::Wrinkles => "Presence of directional lines and creases",
            SkinMetric::Spots => "Dark spots and pigmentation from color variance",
            SkinMetric::Uniformity => "Analysis of skin tone and color distribution",
            SkinMetric::Brightness => "Overall radiance of the skin",
        }
    }
}

/// Display band of a metric score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricBand {
    Good,
    Fair,
    Poor,
}

impl MetricBand {
    pub fn from_score(score: f32) -> Self {
        if score > 70.0 {
            MetricBand::Good
        } else if score > 40.0 {
            MetricBand::Fair
        } else {
            MetricBand::Poor
        }
    }
}

/// Eight skin scores, each in [0, 100], higher is better
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SkinMetrics {
    pub hydration: f32,
    pub elasticity: f32,
    pub texture: f32,
    pub pores: f32,
    pub wrinkles: f32,
    pub spots: f32,
    pub uniformity: f32,
    pub brightness: f32,
}

impl SkinMetrics {
    /// Build a vector by evaluating `f` for every metric
    pub fn from_fn(mut f: impl FnMut(SkinMetric) -> f32) -> Self {
        Self {
            hydration: f(SkinMetric::Hydration),
            elasticity: f(SkinMetric::Elasticity),
            texture: f(SkinMetric::Texture),
            pores: f(SkinMetric::Pores),
            wrinkles: f(SkinMetric::Wrinkles),
            spots: f(SkinMetric::Spots),
            uniformity: f(SkinMetric::Uniformity),
            brightness: f(SkinMetric::Brightness),
        }
    }

    pub fn get(&self, metric: SkinMetric) -> f32 {
        match metric {
            SkinMetric::Hydration => self.hydration,
            SkinMetric::Elasticity => self.elasticity,
            SkinMetric::Texture => self.texture,
            SkinMetric::Pores => self.pores,
            SkinMetric::Wrinkles => self.wrinkles,
            SkinMetric::Spots => self.spots,
            SkinMetric::Uniformity => self.uniformity,
            SkinMetric::Brightness => self.brightness,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SkinMetric, f32)> + '_ {
        SkinMetric::ALL.into_iter().map(move |m| (m, self.get(m)))
    }

    /// Whether every score lies in [0, 100]
    pub fn in_bounds(&self) -> bool {
        self.iter().all(|(_, v)| (0.0..=100.0).contains(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_thresholds() {
        assert_eq!(MetricBand::from_score(70.1), MetricBand::Good);
        assert_eq!(MetricBand::from_score(70.0), MetricBand::Fair);
        assert_eq!(MetricBand::from_score(40.1), MetricBand::Fair);
        assert_eq!(MetricBand::from_score(40.0), MetricBand::Poor);
    }

    #[test]
    fn test_from_fn_and_get_agree() {
        let metrics = SkinMetrics::from_fn(|m| SkinMetric::ALL.iter().position(|x| *x == m).unwrap() as f32);
        for (i, metric) in SkinMetric::ALL.iter().enumerate() {
            assert_eq!(metrics.get(*metric), i as f32);
        }
        assert_eq!(metrics.iter().count(), 8);
    }

    #[test]
    fn test_bounds_check() {
        assert!(SkinMetrics::from_fn(|_| 100.0).in_bounds());
        let mut metrics = SkinMetrics::default();
        metrics.spots = 100.5;
        assert!(!metrics.in_bounds());
    }
}
