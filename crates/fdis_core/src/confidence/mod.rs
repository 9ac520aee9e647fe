use serde::{Deserialize, Serialize};

use crate::domain::ChunkRecord;

pub const DEFAULT_MIN_MAX_SCORE: f32 = 0.55;
pub const DEFAULT_MIN_SPREAD: f32 = 0.05;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    Accepted,
    NoResults,
    LowTopScore,
    FlatDistribution,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceVerdict {
    pub confident: bool,
    pub reason: GateReason,
    pub max_score: Option<f32>,
    pub spread: Option<f32>,
}

impl ConfidenceVerdict {
    fn reject(reason: GateReason, max_score: Option<f32>, spread: Option<f32>) -> Self {
        Self {
            confident: false,
            reason,
            max_score,
            spread,
        }
    }
}

/// Score-distribution gate over a retrieved result set.
///
/// A high top score alone is not enough: when every result scores about the
/// same, nothing in the set is meaningfully more relevant than the rest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceGate {
    pub min_max_score: f32,
    pub min_spread: f32,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self {
            min_max_score: DEFAULT_MIN_MAX_SCORE,
            min_spread: DEFAULT_MIN_SPREAD,
        }
    }
}

impl ConfidenceGate {
    pub fn new(min_max_score: f32, min_spread: f32) -> Self {
        Self {
            min_max_score,
            min_spread,
        }
    }

    pub fn evaluate(&self, scores: &[f32]) -> ConfidenceVerdict {
        let mut it = scores.iter().copied().filter(|s| s.is_finite());
        let Some(first) = it.next() else {
            return ConfidenceVerdict::reject(GateReason::NoResults, None, None);
        };
        let (max, min) = it.fold((first, first), |(hi, lo), s| (hi.max(s), lo.min(s)));
        let spread = max - min;

        if max < self.min_max_score {
            return ConfidenceVerdict::reject(GateReason::LowTopScore, Some(max), Some(spread));
        }
        if spread < self.min_spread {
            return ConfidenceVerdict::reject(GateReason::FlatDistribution, Some(max), Some(spread));
        }
        ConfidenceVerdict {
            confident: true,
            reason: GateReason::Accepted,
            max_score: Some(max),
            spread: Some(spread),
        }
    }

    /// Unscored records are ignored.
    pub fn evaluate_records(&self, records: &[ChunkRecord]) -> ConfidenceVerdict {
        let scores: Vec<f32> = records.iter().filter_map(|r| r.score).collect();
        self.evaluate(&scores)
    }

    pub fn is_confident(&self, scores: &[f32]) -> bool {
        self.evaluate(scores).confident
    }
}
