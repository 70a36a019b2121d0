use crate::pipeline::features::FeatureVector;

/// Class probabilities in fixed order: good, needs-ACDC, needs-resubmit.
pub type ClassProbs = [f64; 3];

/// Scoring seam for the prediction step. The production deployment loads a
/// gradient-boosted model behind this trait; the built-in scorer below keeps
/// the pipeline functional without a model artifact.
pub trait Classifier: Send + Sync {
    fn score(&self, features: &FeatureVector) -> ClassProbs;
}

/// Deterministic rule-based scorer over the feature row. High failure rate
/// with few sites leans toward resubmission, site-spread errors toward ACDC,
/// everything else toward good. Probabilities always sum to 1.
#[derive(Debug, Clone)]
pub struct ThresholdClassifier {
    failure_rate_cut: f64,
    site_spread_cut: f64,
}

impl Default for ThresholdClassifier {
    fn default() -> Self {
        ThresholdClassifier {
            failure_rate_cut: 0.5,
            site_spread_cut: 3.0,
        }
    }
}

impl Classifier for ThresholdClassifier {
    fn score(&self, features: &FeatureVector) -> ClassProbs {
        let failure_rate = features.values[0].clamp(0.0, 1.0);
        let site_counts = features.values[2].max(0.0);

        if failure_rate < self.failure_rate_cut {
            let bad = failure_rate / self.failure_rate_cut * 0.5;
            return normalize([1.0 - bad, bad * 0.5, bad * 0.5]);
        }

        // Failing hard. Spread across many sites suggests the payload, not
        // the sites, so ACDC recovery; concentrated failures suggest
        // resubmission elsewhere.
        let good = 1.0 - failure_rate;
        if site_counts >= self.site_spread_cut {
            normalize([good, failure_rate * 0.7, failure_rate * 0.3])
        } else {
            normalize([good, failure_rate * 0.3, failure_rate * 0.7])
        }
    }
}

fn normalize(raw: ClassProbs) -> ClassProbs {
    let sum: f64 = raw.iter().sum();
    if sum <= 0.0 {
        return [1.0, 0.0, 0.0];
    }
    [raw[0] / sum, raw[1] / sum, raw[2] / sum]
}
