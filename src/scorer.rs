//! Anomaly scoring: feature extraction, standardization, and a hand-rolled
//! Isolation Forest ensemble, mirroring scikit-learn's `IsolationForest` +
//! `StandardScaler` pairing.

use chrono::{Datelike, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::models::Event;

const N_ESTIMATORS: usize = 100;
const SUBSAMPLE_SIZE: usize = 256;
const RANDOM_SEED: u64 = 42;
const N_FEATURES: usize = 8;

fn extract_features(event: &Event) -> [f64; N_FEATURES] {
    let hour = event.timestamp.hour() as f64;
    let day_of_week = event.timestamp.weekday().num_days_from_monday() as f64;
    let is_weekend = if day_of_week >= 5.0 { 1.0 } else { 0.0 };
    let source_hash = hash_prefix(&event.source) as f64;
    let ip_hash = event.ip.as_deref().map(hash_prefix).unwrap_or(0) as f64;
    let message_length = event.message.len() as f64;
    let word_count = event.message.split_whitespace().count() as f64;
    let lower = event.message.to_lowercase();
    let has_error = if ["error", "fail", "exception", "denied"].iter().any(|k| lower.contains(k)) {
        1.0
    } else {
        0.0
    };

    [hour, day_of_week, is_weekend, source_hash, ip_hash, message_length, word_count, has_error]
}

fn hash_prefix(s: &str) -> u32 {
    let digest = Sha256::digest(s.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

struct TreeNode {
    split_feature: Option<usize>,
    split_value: f64,
    left: Option<Box<TreeNode>>,
    right: Option<Box<TreeNode>>,
    size: usize,
}

impl TreeNode {
    fn leaf(size: usize) -> Self {
        Self {
            split_feature: None,
            split_value: 0.0,
            left: None,
            right: None,
            size,
        }
    }
}

fn build_tree(points: &[&[f64; N_FEATURES]], depth: usize, max_depth: usize, rng: &mut StdRng) -> TreeNode {
    if points.len() <= 1 || depth >= max_depth {
        return TreeNode::leaf(points.len());
    }

    let feature = rng.gen_range(0..N_FEATURES);
    let (min, max) = points.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| {
        (lo.min(p[feature]), hi.max(p[feature]))
    });
    if (max - min).abs() < f64::EPSILON {
        return TreeNode::leaf(points.len());
    }

    let split_value = rng.gen_range(min..max);
    let (left_points, right_points): (Vec<&[f64; N_FEATURES]>, Vec<&[f64; N_FEATURES]>) =
        points.iter().copied().partition(|p| p[feature] < split_value);

    if left_points.is_empty() || right_points.is_empty() {
        return TreeNode::leaf(points.len());
    }

    TreeNode {
        split_feature: Some(feature),
        split_value,
        left: Some(Box::new(build_tree(&left_points, depth + 1, max_depth, rng))),
        right: Some(Box::new(build_tree(&right_points, depth + 1, max_depth, rng))),
        size: points.len(),
    }
}

fn path_length(node: &TreeNode, point: &[f64; N_FEATURES], depth: usize) -> f64 {
    match node.split_feature {
        None => depth as f64 + average_path_length(node.size),
        Some(feature) => {
            let next = if point[feature] < node.split_value {
                node.left.as_ref()
            } else {
                node.right.as_ref()
            };
            match next {
                Some(child) => path_length(child, point, depth + 1),
                None => depth as f64,
            }
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree
/// of `n` points, used to normalize raw path lengths into a scikit-learn
/// compatible score.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * (((n - 1.0).ln()) + 0.5772156649) - (2.0 * (n - 1.0) / n)
}

struct Scaler {
    mean: [f64; N_FEATURES],
    std_dev: [f64; N_FEATURES],
}

impl Scaler {
    fn fit(points: &[[f64; N_FEATURES]]) -> Self {
        let n = points.len() as f64;
        let mut mean = [0.0; N_FEATURES];
        for p in points {
            for i in 0..N_FEATURES {
                mean[i] += p[i];
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut variance = [0.0; N_FEATURES];
        for p in points {
            for i in 0..N_FEATURES {
                let diff = p[i] - mean[i];
                variance[i] += diff * diff;
            }
        }
        let mut std_dev = [0.0; N_FEATURES];
        for i in 0..N_FEATURES {
            let v = variance[i] / n;
            std_dev[i] = if v > f64::EPSILON { v.sqrt() } else { 1.0 };
        }

        Self { mean, std_dev }
    }

    fn transform(&self, point: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
        let mut out = [0.0; N_FEATURES];
        for i in 0..N_FEATURES {
            out[i] = (point[i] - self.mean[i]) / self.std_dev[i];
        }
        out
    }
}

/// Isolation Forest anomaly scorer. Unfit until `fit` succeeds on a
/// non-empty set of historical events; an unfit scorer scores every event
/// `0.0`, the non-alerting sentinel.
pub struct AnomalyScorer {
    trees: Vec<TreeNode>,
    scaler: Option<Scaler>,
    subsample_size: usize,
}

impl Default for AnomalyScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyScorer {
    pub fn new() -> Self {
        Self {
            trees: Vec::new(),
            scaler: None,
            subsample_size: SUBSAMPLE_SIZE,
        }
    }

    pub fn is_fit(&self) -> bool {
        self.scaler.is_some() && !self.trees.is_empty()
    }

    /// Trains on up to ~10,000 historical events. Leaves the scorer unfit
    /// (logged, not fatal) if given no events.
    pub fn fit(&mut self, events: &[Event]) -> anyhow::Result<()> {
        if events.is_empty() {
            anyhow::bail!("cannot fit anomaly scorer on an empty event set");
        }

        let raw_features: Vec<[f64; N_FEATURES]> = events.iter().map(extract_features).collect();
        let scaler = Scaler::fit(&raw_features);
        let scaled: Vec<[f64; N_FEATURES]> = raw_features.iter().map(|f| scaler.transform(f)).collect();

        let subsample_size = self.subsample_size.min(scaled.len());
        let max_depth = (subsample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(RANDOM_SEED);

        let mut trees = Vec::with_capacity(N_ESTIMATORS);
        for _ in 0..N_ESTIMATORS {
            let sample: Vec<&[f64; N_FEATURES]> = if scaled.len() <= subsample_size {
                scaled.iter().collect()
            } else {
                let mut indices: Vec<usize> = (0..scaled.len()).collect();
                for i in (1..indices.len()).rev() {
                    let j = rng.gen_range(0..=i);
                    indices.swap(i, j);
                }
                indices[..subsample_size].iter().map(|&i| &scaled[i]).collect()
            };
            trees.push(build_tree(&sample, 0, max_depth, &mut rng));
        }

        self.scaler = Some(scaler);
        self.trees = trees;
        Ok(())
    }

    /// Scores every event; output length always equals input length. An
    /// unfit scorer returns all zeros.
    pub fn score(&self, events: &[Event]) -> Vec<f64> {
        let Some(scaler) = &self.scaler else {
            return vec![0.0; events.len()];
        };
        if self.trees.is_empty() {
            return vec![0.0; events.len()];
        }

        let avg_path_norm = average_path_length(self.subsample_size.max(2));

        events
            .iter()
            .map(|event| {
                let features = extract_features(event);
                let scaled = scaler.transform(&features);
                let avg_path = self.trees.iter().map(|t| path_length(t, &scaled, 0)).sum::<f64>() / self.trees.len() as f64;
                let normalized = avg_path / avg_path_norm;
                // scikit-learn's decision_function convention: more negative = more anomalous.
                0.5 - 2f64.powf(-normalized)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_event(message: &str) -> Event {
        Event::new(Utc::now(), "app".to_string(), message.to_string(), message.to_string(), None)
    }

    #[test]
    fn unfit_scorer_returns_all_zeros() {
        let scorer = AnomalyScorer::new();
        let events = vec![sample_event("a"), sample_event("b")];
        let scores = scorer.score(&events);
        assert_eq!(scores, vec![0.0, 0.0]);
    }

    #[test]
    fn fit_fails_on_empty_events() {
        let mut scorer = AnomalyScorer::new();
        assert!(scorer.fit(&[]).is_err());
        assert!(!scorer.is_fit());
    }

    #[test]
    fn score_length_always_matches_input_length() {
        let mut scorer = AnomalyScorer::new();
        let training: Vec<Event> = (0..50).map(|i| sample_event(&format!("normal event {}", i))).collect();
        scorer.fit(&training).unwrap();

        let batch = vec![sample_event("x"), sample_event("y"), sample_event("z")];
        let scores = scorer.score(&batch);
        assert_eq!(scores.len(), batch.len());
    }

    #[test]
    fn fit_then_score_produces_finite_scores() {
        let mut scorer = AnomalyScorer::new();
        let training: Vec<Event> = (0..300).map(|i| sample_event(&format!("routine login {}", i))).collect();
        scorer.fit(&training).unwrap();
        assert!(scorer.is_fit());

        let scores = scorer.score(&training[..10]);
        assert!(scores.iter().all(|s| s.is_finite()));
    }

    proptest::proptest! {
        #[test]
        fn score_length_matches_input_length_for_arbitrary_batch_sizes(batch_size in 0usize..50) {
            let mut scorer = AnomalyScorer::new();
            let training: Vec<Event> = (0..120).map(|i| sample_event(&format!("event {}", i))).collect();
            scorer.fit(&training).unwrap();

            let batch: Vec<Event> = (0..batch_size).map(|i| sample_event(&format!("batch event {}", i))).collect();
            let scores = scorer.score(&batch);
            prop_assert_eq!(scores.len(), batch.len());
        }
    }
}
