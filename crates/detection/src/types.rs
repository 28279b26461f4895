//! Shared data model for the detection core
//!
//! Input records (`Trade`, `VolumeSample`, `ResolvedPosition`) are produced
//! by the ingestion collaborators; output values are pure data consumed by
//! the scoring/alerting layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A single normalized trade pushed in by the ingestion worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub market_id: String,
    pub wallet_address: String,
    pub size_usd: f64,
    pub price: f64,
    pub side: TradeSide,
    pub timestamp: DateTime<Utc>,
    /// Market outcome the trade was placed on, when known (e.g. "Yes")
    pub outcome: Option<String>,
}

/// A per-market volume reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSample {
    pub market_id: String,
    pub volume: f64,
    pub trade_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Resolution of a closed position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionOutcome {
    Win,
    Loss,
}

/// A fully resolved position. Immutable once created; re-submitting the same
/// `position_id` replaces the prior record (last-write-wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedPosition {
    pub position_id: String,
    pub wallet_address: String,
    pub market_id: String,
    pub category: String,
    pub outcome: PositionOutcome,
    pub size_usd: f64,
    pub realized_pnl: f64,
    pub roi: f64,
    pub is_high_conviction: bool,
    pub entry_ts: DateTime<Utc>,
    pub exit_ts: DateTime<Utc>,
}

/// Severity of a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Common detection summary consumed by the scoring layer.
///
/// Each detector has a richer result type; this is the flattened view a
/// combined suspicion score is built from.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub flagged: bool,
    pub severity: Option<Severity>,
    pub z_score: Option<f64>,
    pub percentile: Option<f64>,
}

/// Lower-case + trim an identifier before use as a map key.
///
/// Wallet addresses arrive mixed-case from different upstream sources; the
/// core must never split one wallet's history across two keys.
pub fn normalize_key(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

/// Clamp a suspicion score into [0,100].
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}
