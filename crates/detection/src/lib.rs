//! Market Sentinel Detection — suspicious-activity detection core
//!
//! In-memory analytics over prediction-market activity feeds.
//! Provides:
//! - Rolling per-market volume tracking across 5m/1h/24h windows
//! - Volume spike detection (z-score + percent-deviation, sustained episodes)
//! - Trade size outlier classification (absolute tiers + market statistics)
//! - Per-wallet win-rate analysis with anomaly and insider signals
//! - Historical score calibration with a monotone adjustment curve
//!
//! All components are `Send + Sync` and safe to share behind an `Arc`; the
//! host process owns ingestion, persistence, and alert delivery.

pub mod calibration;
pub mod error;
pub mod spike_detector;
pub mod stats;
pub mod trade_size;
pub mod types;
pub mod volume_tracker;
pub mod win_rate;

// Re-exports for convenience
pub use calibration::{
    CalibrationQuality, CalibrationResult, CalibratorConfig, CalibratorExport,
    HistoricalScoreCalibrator, OutcomeKind, Recommendation, RecommendationKind, ReliabilityBucket,
    ScoredOutcome,
};
pub use error::{ConfigError, ImportError};
pub use spike_detector::{
    SpikeDetection, SpikeDetectorConfig, SpikeDirection, SpikeEvent, SpikeKind, VolumeSpikeDetector,
};
pub use trade_size::{
    AnalyzerSummary, LargeTradeEvent, StatStrategy, TradeSizeAnalysis, TradeSizeAnalyzer,
    TradeSizeCategory, TradeSizeConfig, WalletLargeTradeStats,
};
pub use types::*;
pub use volume_tracker::{
    RollingAverages, RollingVolumeTracker, VolumeTrackerConfig, Window, WindowStats,
};
pub use win_rate::{
    AnomalyKind, SuspicionLevel, TimeWindow, TrendDirection, WinRateCategory, WinRateConfig,
    WinRateResult, WinRateTracker,
};
