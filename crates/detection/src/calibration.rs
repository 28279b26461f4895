//! Historical Score Calibrator — closes the feedback loop on suspicion scores
//!
//! Records scored wallets together with their eventual investigation outcome,
//! then measures how well scores predicted reality (Brier score, reliability
//! curve, ECE, AUC-ROC, precision/recall at the alerting threshold) and
//! derives a monotone adjustment curve that future raw scores are passed
//! through. Everything operates on a bounded ring of recent outcomes.

use crate::error::{ConfigError, ImportError};
use crate::stats::binomial_confidence_interval;
use crate::types::{clamp_score, normalize_key};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;
use tracing::{debug, info};

const RELIABILITY_BUCKETS: usize = 10;
const CURVE_POINTS: usize = 101;
const CI_Z: f64 = 1.96;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Ground-truth label for a scored wallet, assigned once the investigation
/// (or market resolution) settles. `Unknown` means still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    TruePositive,
    FalsePositive,
    TrueNegative,
    FalseNegative,
    Unknown,
}

impl OutcomeKind {
    /// Actual class: `Some(true)` for confirmed suspicious wallets,
    /// `Some(false)` for confirmed benign, `None` while pending.
    pub fn actual(&self) -> Option<bool> {
        match self {
            Self::TruePositive | Self::FalseNegative => Some(true),
            Self::FalsePositive | Self::TrueNegative => Some(false),
            Self::Unknown => None,
        }
    }
}

/// One scored wallet with its eventual outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredOutcome {
    pub wallet_address: String,
    /// Raw suspicion score 0..100 at scoring time
    pub score: f64,
    pub outcome: OutcomeKind,
    pub scored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationQuality {
    InsufficientData,
    Poor,
    Fair,
    Good,
    Excellent,
}

/// One bucket of the reliability curve
#[derive(Debug, Clone, Serialize)]
pub struct ReliabilityBucket {
    /// Score range covered, e.g. 70..80
    pub lower: f64,
    pub upper: f64,
    pub avg_predicted_probability: f64,
    pub actual_positive_rate: f64,
    /// Outcomes with ground truth landing in this bucket
    pub sample_count: usize,
    /// 95% binomial CI on the positive rate; `None` for empty buckets
    pub confidence_interval: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    IncreaseThreshold,
    DecreaseThreshold,
    RecalibrateBuckets,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub rationale: String,
}

/// Full calibration report from one outcome snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationResult {
    pub sample_count: usize,
    pub is_calibrated: bool,
    pub quality: CalibrationQuality,
    /// Mean squared error of predicted probabilities, 0..1 (lower is better)
    pub brier_score: f64,
    /// Expected calibration error across populated buckets
    pub ece: f64,
    pub auc_roc: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positive_rate: f64,
    pub false_positive_rate: f64,
    pub current_threshold: f64,
    /// Integer threshold maximizing F1 over the snapshot
    pub optimized_threshold: f64,
    pub reliability_curve: Vec<ReliabilityBucket>,
    pub recommendations: Vec<Recommendation>,
}

/// Serializable snapshot for persistence / transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratorExport {
    pub outcomes: Vec<ScoredOutcome>,
    /// 101-point monotone lookup, index = raw score
    pub adjustment_curve: Option<Vec<f64>>,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratorConfig {
    /// Ring-buffer capacity for scored outcomes
    pub max_outcomes: usize,
    /// Below this many outcomes calibration reports InsufficientData
    pub min_samples_for_calibration: usize,
    /// Alerting threshold the precision/recall metrics are computed at
    pub current_threshold: f64,
    /// Floors that trigger threshold recommendations
    pub min_precision: f64,
    pub min_recall: f64,
    /// |predicted − actual| per bucket beyond which recalibration is advised
    pub bucket_gap_threshold: f64,
    /// Buckets thinner than this do not feed the adjustment curve
    pub min_bucket_samples: usize,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            max_outcomes: 10_000,
            min_samples_for_calibration: 100,
            current_threshold: 70.0,
            min_precision: 0.5,
            min_recall: 0.5,
            bucket_gap_threshold: 0.15,
            min_bucket_samples: 10,
        }
    }
}

impl CalibratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_outcomes == 0 {
            return Err(ConfigError::NonPositive {
                field: "max_outcomes",
            });
        }
        if self.min_samples_for_calibration == 0 {
            return Err(ConfigError::NonPositive {
                field: "min_samples_for_calibration",
            });
        }
        for (field, value) in [
            ("min_precision", self.min_precision),
            ("min_recall", self.min_recall),
            ("bucket_gap_threshold", self.bucket_gap_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange { field, value });
            }
        }
        if !(0.0..=100.0).contains(&self.current_threshold) {
            return Err(ConfigError::OutOfUnitRange {
                field: "current_threshold",
                value: self.current_threshold,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CalibratorState {
    outcomes: VecDeque<ScoredOutcome>,
    adjustment_curve: Option<Vec<f64>>,
    threshold: f64,
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

pub struct HistoricalScoreCalibrator {
    config: CalibratorConfig,
    state: RwLock<CalibratorState>,
}

impl HistoricalScoreCalibrator {
    pub fn new(config: CalibratorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let threshold = config.current_threshold;
        Ok(Self {
            config,
            state: RwLock::new(CalibratorState {
                outcomes: VecDeque::new(),
                adjustment_curve: None,
                threshold,
            }),
        })
    }

    /// Append a scored wallet, evicting the oldest record at capacity.
    pub fn record_outcome(
        &self,
        wallet_address: &str,
        score: f64,
        outcome: OutcomeKind,
        scored_at: Option<DateTime<Utc>>,
    ) {
        let record = ScoredOutcome {
            wallet_address: normalize_key(wallet_address),
            score: clamp_score(score),
            outcome,
            scored_at: scored_at.unwrap_or_else(Utc::now),
        };
        let mut state = self.state.write().unwrap();
        if state.outcomes.len() == self.config.max_outcomes {
            state.outcomes.pop_front();
        }
        state.outcomes.push_back(record);
    }

    /// Settle the most recent pending record for a wallet. Returns false
    /// when the wallet has no Unknown record.
    pub fn update_outcome(&self, wallet_address: &str, outcome: OutcomeKind) -> bool {
        let key = normalize_key(wallet_address);
        let mut state = self.state.write().unwrap();
        for record in state.outcomes.iter_mut().rev() {
            if record.wallet_address == key && record.outcome == OutcomeKind::Unknown {
                record.outcome = outcome;
                debug!(wallet = %key, outcome = ?outcome, "pending outcome settled");
                return true;
            }
        }
        false
    }

    /// Evaluate calibration over the current outcome set and, when enough
    /// samples exist, refresh the score adjustment curve.
    pub fn calculate_calibration(&self) -> CalibrationResult {
        let (snapshot, threshold) = {
            let state = self.state.read().unwrap();
            (
                state.outcomes.iter().cloned().collect::<Vec<_>>(),
                state.threshold,
            )
        };

        if snapshot.len() < self.config.min_samples_for_calibration {
            return CalibrationResult {
                sample_count: snapshot.len(),
                is_calibrated: false,
                quality: CalibrationQuality::InsufficientData,
                brier_score: 0.0,
                ece: 0.0,
                auc_roc: 0.0,
                precision: 0.0,
                recall: 0.0,
                f1: 0.0,
                true_positive_rate: 0.0,
                false_positive_rate: 0.0,
                current_threshold: threshold,
                optimized_threshold: threshold,
                reliability_curve: Vec::new(),
                recommendations: Vec::new(),
            };
        }

        let brier_score = brier(&snapshot);
        let reliability_curve = reliability(&snapshot);
        let ece = expected_calibration_error(&reliability_curve);
        let auc_roc = auc(&snapshot);
        let (precision, recall, f1, tpr, fpr) = classification_metrics(&snapshot, threshold);
        let optimized_threshold = optimize_threshold(&snapshot, threshold);
        let quality = quality_tier(brier_score, ece);

        let mut recommendations = Vec::new();
        if precision < self.config.min_precision {
            recommendations.push(Recommendation {
                kind: RecommendationKind::IncreaseThreshold,
                rationale: format!(
                    "precision {:.2} below floor {:.2} at threshold {:.0}",
                    precision, self.config.min_precision, threshold
                ),
            });
        }
        if recall < self.config.min_recall {
            recommendations.push(Recommendation {
                kind: RecommendationKind::DecreaseThreshold,
                rationale: format!(
                    "recall {:.2} below floor {:.2} at threshold {:.0}",
                    recall, self.config.min_recall, threshold
                ),
            });
        }
        let worst_gap = reliability_curve
            .iter()
            .filter(|b| b.sample_count >= self.config.min_bucket_samples)
            .map(|b| (b.avg_predicted_probability - b.actual_positive_rate).abs())
            .fold(0.0_f64, f64::max);
        if worst_gap > self.config.bucket_gap_threshold {
            recommendations.push(Recommendation {
                kind: RecommendationKind::RecalibrateBuckets,
                rationale: format!(
                    "largest bucket gap {:.2} exceeds {:.2}",
                    worst_gap, self.config.bucket_gap_threshold
                ),
            });
        }

        let curve = adjustment_curve(&reliability_curve, self.config.min_bucket_samples);
        {
            let mut state = self.state.write().unwrap();
            state.adjustment_curve = Some(curve);
        }

        info!(
            samples = snapshot.len(),
            brier = brier_score,
            ece,
            auc = auc_roc,
            quality = ?quality,
            "calibration run complete"
        );

        CalibrationResult {
            sample_count: snapshot.len(),
            is_calibrated: true,
            quality,
            brier_score,
            ece,
            auc_roc,
            precision,
            recall,
            f1,
            true_positive_rate: tpr,
            false_positive_rate: fpr,
            current_threshold: threshold,
            optimized_threshold,
            reliability_curve,
            recommendations,
        }
    }

    /// Pass a raw score through the adjustment curve. Identity (clamped)
    /// before the first successful calibration.
    pub fn calibrate_score(&self, raw: f64) -> f64 {
        let raw = clamp_score(raw);
        let state = self.state.read().unwrap();
        let Some(curve) = &state.adjustment_curve else {
            return raw;
        };
        let lo = raw.floor() as usize;
        let hi = raw.ceil() as usize;
        let adjusted = if lo == hi {
            curve[lo]
        } else {
            let frac = raw - lo as f64;
            curve[lo] + (curve[hi] - curve[lo]) * frac
        };
        clamp_score(adjusted)
    }

    pub fn export_data(&self) -> CalibratorExport {
        let state = self.state.read().unwrap();
        CalibratorExport {
            outcomes: state.outcomes.iter().cloned().collect(),
            adjustment_curve: state.adjustment_curve.clone(),
            threshold: state.threshold,
        }
    }

    /// Replace the calibrator's state from an export. The outcome history is
    /// truncated to capacity, oldest records first.
    pub fn import_data(&self, export: CalibratorExport) -> Result<(), ImportError> {
        if let Some(curve) = &export.adjustment_curve {
            if curve.len() != CURVE_POINTS {
                return Err(ImportError::BadCurveLength {
                    expected: CURVE_POINTS,
                    actual: curve.len(),
                });
            }
        }
        let mut outcomes: VecDeque<ScoredOutcome> = export.outcomes.into();
        while outcomes.len() > self.config.max_outcomes {
            outcomes.pop_front();
        }
        for record in outcomes.iter_mut() {
            record.score = clamp_score(record.score);
            record.wallet_address = normalize_key(&record.wallet_address);
        }
        let mut state = self.state.write().unwrap();
        state.outcomes = outcomes;
        state.adjustment_curve = export.adjustment_curve;
        state.threshold = export.threshold;
        Ok(())
    }

    pub fn outcome_count(&self) -> usize {
        self.state.read().unwrap().outcomes.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap();
        state.outcomes.clear();
        state.adjustment_curve = None;
        state.threshold = self.config.current_threshold;
    }
}

// ---------------------------------------------------------------------------
// Metric computation
// ---------------------------------------------------------------------------

/// Mean squared error of predicted probabilities. Records still pending
/// ground truth count as the worst case so a backlog of unresolved alerts
/// cannot inflate the apparent quality.
fn brier(outcomes: &[ScoredOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let total: f64 = outcomes
        .iter()
        .map(|o| match o.outcome.actual() {
            Some(actual) => {
                let predicted = o.score / 100.0;
                let target = if actual { 1.0 } else { 0.0 };
                (predicted - target).powi(2)
            }
            None => 1.0,
        })
        .sum();
    total / outcomes.len() as f64
}

fn bucket_index(score: f64) -> usize {
    ((score / 10.0).floor() as usize).min(RELIABILITY_BUCKETS - 1)
}

fn reliability(outcomes: &[ScoredOutcome]) -> Vec<ReliabilityBucket> {
    let mut sums = [0.0_f64; RELIABILITY_BUCKETS];
    let mut counts = [0usize; RELIABILITY_BUCKETS];
    let mut positives = [0u64; RELIABILITY_BUCKETS];
    for o in outcomes {
        let Some(actual) = o.outcome.actual() else {
            continue;
        };
        let idx = bucket_index(o.score);
        sums[idx] += o.score / 100.0;
        counts[idx] += 1;
        if actual {
            positives[idx] += 1;
        }
    }
    (0..RELIABILITY_BUCKETS)
        .map(|i| {
            let n = counts[i];
            ReliabilityBucket {
                lower: i as f64 * 10.0,
                upper: (i + 1) as f64 * 10.0,
                avg_predicted_probability: if n > 0 { sums[i] / n as f64 } else { 0.0 },
                actual_positive_rate: if n > 0 {
                    positives[i] as f64 / n as f64
                } else {
                    0.0
                },
                sample_count: n,
                confidence_interval: binomial_confidence_interval(positives[i], n as u64, CI_Z),
            }
        })
        .collect()
}

fn expected_calibration_error(curve: &[ReliabilityBucket]) -> f64 {
    let total: usize = curve.iter().map(|b| b.sample_count).sum();
    if total == 0 {
        return 0.0;
    }
    curve
        .iter()
        .filter(|b| b.sample_count > 0)
        .map(|b| {
            let weight = b.sample_count as f64 / total as f64;
            weight * (b.avg_predicted_probability - b.actual_positive_rate).abs()
        })
        .sum()
}

/// Rank-based AUC-ROC (Mann-Whitney), averaging ranks across score ties.
/// 0.5 when either class is absent.
fn auc(outcomes: &[ScoredOutcome]) -> f64 {
    let mut labeled: Vec<(f64, bool)> = outcomes
        .iter()
        .filter_map(|o| o.outcome.actual().map(|a| (o.score, a)))
        .collect();
    let n_pos = labeled.iter().filter(|(_, a)| *a).count();
    let n_neg = labeled.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }
    labeled.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < labeled.len() {
        let mut j = i;
        while j < labeled.len() && labeled[j].0 == labeled[i].0 {
            j += 1;
        }
        // 1-based average rank of the tie group [i, j)
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for item in &labeled[i..j] {
            if item.1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j;
    }
    let np = n_pos as f64;
    (rank_sum_pos - np * (np + 1.0) / 2.0) / (np * n_neg as f64)
}

fn classification_metrics(
    outcomes: &[ScoredOutcome],
    threshold: f64,
) -> (f64, f64, f64, f64, f64) {
    let mut tp = 0u64;
    let mut fp = 0u64;
    let mut tn = 0u64;
    let mut fn_ = 0u64;
    for o in outcomes {
        let Some(actual) = o.outcome.actual() else {
            continue;
        };
        let predicted = o.score >= threshold;
        match (predicted, actual) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
    }
    let ratio = |num: u64, den: u64| {
        if den == 0 {
            0.0
        } else {
            num as f64 / den as f64
        }
    };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    let fpr = ratio(fp, fp + tn);
    (precision, recall, f1, recall, fpr)
}

/// Integer grid search for the threshold maximizing F1. Falls back to the
/// current threshold when nothing scores better.
fn optimize_threshold(outcomes: &[ScoredOutcome], current: f64) -> f64 {
    let (_, _, current_f1, _, _) = classification_metrics(outcomes, current);
    let mut best = (current, current_f1);
    for t in 0..=100 {
        let t = t as f64;
        let (_, _, f1, _, _) = classification_metrics(outcomes, t);
        if f1 > best.1 {
            best = (t, f1);
        }
    }
    best.0
}

fn quality_tier(brier: f64, ece: f64) -> CalibrationQuality {
    if brier < 0.1 && ece < 0.05 {
        CalibrationQuality::Excellent
    } else if brier < 0.2 && ece < 0.1 {
        CalibrationQuality::Good
    } else if brier < 0.3 && ece < 0.2 {
        CalibrationQuality::Fair
    } else {
        CalibrationQuality::Poor
    }
}

/// Build the 101-point adjustment lookup from the reliability curve.
///
/// Buckets with enough samples become control points mapping the bucket's
/// center score to its observed positive rate scaled to 0..100; a running
/// max keeps the targets non-decreasing, and the fixed (0,0)/(100,100)
/// endpoints anchor the interpolation.
fn adjustment_curve(curve: &[ReliabilityBucket], min_bucket_samples: usize) -> Vec<f64> {
    let mut points: Vec<(f64, f64)> = vec![(0.0, 0.0)];
    for bucket in curve {
        if bucket.sample_count >= min_bucket_samples {
            let mid = (bucket.lower + bucket.upper) / 2.0;
            points.push((mid, bucket.actual_positive_rate * 100.0));
        }
    }
    points.push((100.0, 100.0));

    let mut running_max = 0.0_f64;
    for point in points.iter_mut() {
        running_max = running_max.max(point.1);
        point.1 = running_max;
    }

    (0..CURVE_POINTS)
        .map(|i| {
            let x = i as f64;
            let after = points.iter().position(|(px, _)| *px >= x).unwrap_or(points.len() - 1);
            if points[after].0 == x || after == 0 {
                points[after].1
            } else {
                let (x0, y0) = points[after - 1];
                let (x1, y1) = points[after];
                y0 + (y1 - y0) * (x - x0) / (x1 - x0)
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn calibrator() -> HistoricalScoreCalibrator {
        HistoricalScoreCalibrator::new(CalibratorConfig::default()).unwrap()
    }

    fn small_calibrator(min_samples: usize) -> HistoricalScoreCalibrator {
        HistoricalScoreCalibrator::new(CalibratorConfig {
            min_samples_for_calibration: min_samples,
            ..CalibratorConfig::default()
        })
        .unwrap()
    }

    /// Scores spread over 0..100 where the positive rate tracks the score.
    fn seed_well_calibrated(c: &HistoricalScoreCalibrator, n: usize) {
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..n {
            let score = (i % 101) as f64;
            let positive = rng.gen_bool((score / 100.0).clamp(0.01, 0.99));
            let outcome = if positive {
                if score >= 70.0 {
                    OutcomeKind::TruePositive
                } else {
                    OutcomeKind::FalseNegative
                }
            } else if score >= 70.0 {
                OutcomeKind::FalsePositive
            } else {
                OutcomeKind::TrueNegative
            };
            c.record_outcome(&format!("0xw{i}"), score, outcome, None);
        }
    }

    #[test]
    fn test_identity_before_first_calibration() {
        let c = calibrator();
        assert_eq!(c.calibrate_score(42.5), 42.5);
        assert_eq!(c.calibrate_score(-10.0), 0.0);
        assert_eq!(c.calibrate_score(250.0), 100.0);
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let c = HistoricalScoreCalibrator::new(CalibratorConfig {
            max_outcomes: 3,
            ..CalibratorConfig::default()
        })
        .unwrap();
        for i in 0..5 {
            c.record_outcome(&format!("0xw{i}"), 50.0, OutcomeKind::Unknown, None);
        }
        assert_eq!(c.outcome_count(), 3);
        let export = c.export_data();
        assert_eq!(export.outcomes[0].wallet_address, "0xw2");
    }

    #[test]
    fn test_insufficient_data() {
        let c = calibrator();
        for i in 0..10 {
            c.record_outcome(&format!("0xw{i}"), 80.0, OutcomeKind::TruePositive, None);
        }
        let result = c.calculate_calibration();
        assert_eq!(result.quality, CalibrationQuality::InsufficientData);
        assert!(!result.is_calibrated);
        assert_eq!(result.brier_score, 0.0);
        // The curve was not derived, scores still pass through unchanged
        assert_eq!(c.calibrate_score(33.0), 33.0);
    }

    #[test]
    fn test_update_outcome_settles_most_recent_pending() {
        let c = calibrator();
        c.record_outcome("0xABC", 90.0, OutcomeKind::Unknown, None);
        c.record_outcome("0xabc", 60.0, OutcomeKind::Unknown, None);
        assert!(c.update_outcome("0xAbC", OutcomeKind::TruePositive));
        let export = c.export_data();
        assert_eq!(export.outcomes[1].outcome, OutcomeKind::TruePositive);
        assert_eq!(export.outcomes[0].outcome, OutcomeKind::Unknown);
        assert!(c.update_outcome("0xabc", OutcomeKind::FalsePositive));
        assert!(!c.update_outcome("0xabc", OutcomeKind::TrueNegative));
    }

    #[test]
    fn test_all_unknown_brier_is_worst_case() {
        let c = small_calibrator(10);
        for i in 0..20 {
            c.record_outcome(&format!("0xw{i}"), 50.0, OutcomeKind::Unknown, None);
        }
        let result = c.calculate_calibration();
        assert_eq!(result.brier_score, 1.0);
        assert_eq!(result.quality, CalibrationQuality::Poor);
        // No ground truth at all: AUC degrades to coin-flip
        assert_eq!(result.auc_roc, 0.5);
    }

    #[test]
    fn test_well_calibrated_scores_rate_well() {
        let c = calibrator();
        seed_well_calibrated(&c, 500);
        let result = c.calculate_calibration();
        assert!(result.is_calibrated);
        assert!(result.brier_score < 0.3);
        assert!(result.brier_score >= 0.0 && result.brier_score <= 1.0);
        assert!(result.auc_roc > 0.7);
        assert!(result.quality >= CalibrationQuality::Fair);
        assert_eq!(result.reliability_curve.len(), 10);
        assert!(result
            .reliability_curve
            .iter()
            .all(|b| b.actual_positive_rate >= 0.0 && b.actual_positive_rate <= 1.0));
    }

    #[test]
    fn test_calibrated_scores_are_monotone_and_bounded() {
        let c = calibrator();
        seed_well_calibrated(&c, 500);
        c.calculate_calibration();
        let mut last = f64::NEG_INFINITY;
        for raw in 0..=200 {
            let adjusted = c.calibrate_score(raw as f64 / 2.0);
            assert!((0.0..=100.0).contains(&adjusted));
            assert!(adjusted >= last, "curve must be non-decreasing");
            last = adjusted;
        }
        assert_eq!(c.calibrate_score(0.0), 0.0);
        assert_eq!(c.calibrate_score(100.0), 100.0);
    }

    #[test]
    fn test_optimized_threshold_never_worse() {
        let c = calibrator();
        seed_well_calibrated(&c, 500);
        let result = c.calculate_calibration();
        let f1_at = |t: f64| {
            let export = c.export_data();
            classification_metrics(&export.outcomes, t).2
        };
        assert!(f1_at(result.optimized_threshold) >= f1_at(result.current_threshold));
    }

    #[test]
    fn test_export_import_reproduces_brier() {
        let c = calibrator();
        seed_well_calibrated(&c, 300);
        let original = c.calculate_calibration();
        let export = c.export_data();

        let restored = calibrator();
        restored.import_data(export).unwrap();
        let replay = restored.calculate_calibration();
        assert_eq!(replay.sample_count, original.sample_count);
        assert_eq!(replay.brier_score, original.brier_score);
        assert_eq!(replay.auc_roc, original.auc_roc);
        assert_eq!(
            restored.calibrate_score(55.0),
            c.calibrate_score(55.0)
        );
    }

    #[test]
    fn test_import_rejects_malformed_curve() {
        let c = calibrator();
        let export = CalibratorExport {
            outcomes: Vec::new(),
            adjustment_curve: Some(vec![0.0; 50]),
            threshold: 70.0,
        };
        let err = c.import_data(export).unwrap_err();
        assert!(matches!(
            err,
            ImportError::BadCurveLength {
                expected: 101,
                actual: 50
            }
        ));
    }

    #[test]
    fn test_overconfident_scores_get_pulled_down() {
        let c = small_calibrator(50);
        // High scores that are nearly always wrong
        let mut rng = StdRng::seed_from_u64(11);
        for i in 0..200 {
            let score = rng.gen_range(80.0..100.0);
            let outcome = if rng.gen_bool(0.2) {
                OutcomeKind::TruePositive
            } else {
                OutcomeKind::FalsePositive
            };
            c.record_outcome(&format!("0xw{i}"), score, outcome, None);
        }
        let result = c.calculate_calibration();
        assert!(result.brier_score > 0.3);
        assert_eq!(result.quality, CalibrationQuality::Poor);
        // A raw 90 should be adjusted well below its face value
        assert!(c.calibrate_score(90.0) < 60.0);
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.kind == RecommendationKind::IncreaseThreshold
                || r.kind == RecommendationKind::RecalibrateBuckets));
    }

    #[test]
    fn test_feedback_loop_improves_brier() {
        // Round 1: raw overconfident scores. Round 2: the same signal passed
        // through the derived curve before recording. Brier should not get
        // worse with the adjustment applied.
        let first = small_calibrator(50);
        let mut rng = StdRng::seed_from_u64(23);
        let signal: Vec<(f64, bool)> = (0..300)
            .map(|_| {
                let score: f64 = rng.gen_range(60.0..100.0);
                (score, rng.gen_bool(0.3))
            })
            .collect();
        let record = |c: &HistoricalScoreCalibrator, score: f64, positive: bool, i: usize| {
            let outcome = match (positive, score >= 70.0) {
                (true, true) => OutcomeKind::TruePositive,
                (true, false) => OutcomeKind::FalseNegative,
                (false, true) => OutcomeKind::FalsePositive,
                (false, false) => OutcomeKind::TrueNegative,
            };
            c.record_outcome(&format!("0xw{i}"), score, outcome, None);
        };

        for (i, (score, positive)) in signal.iter().enumerate() {
            record(&first, *score, *positive, i);
        }
        let round1 = first.calculate_calibration();

        let second = small_calibrator(50);
        for (i, (score, positive)) in signal.iter().enumerate() {
            record(&second, first.calibrate_score(*score), *positive, i);
        }
        let round2 = second.calculate_calibration();
        assert!(round2.brier_score <= round1.brier_score + 1e-9);
    }

    #[test]
    fn test_clear_resets_state() {
        let c = small_calibrator(10);
        seed_well_calibrated(&c, 100);
        c.calculate_calibration();
        c.clear();
        assert_eq!(c.outcome_count(), 0);
        assert_eq!(c.calibrate_score(47.0), 47.0);
    }
}
