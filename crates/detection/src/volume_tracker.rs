//! Rolling Volume Tracker — per-market bounded volume time series
//!
//! Answers "what is normal volume for this market right now" at several
//! window sizes. Samples are FIFO-pruned by count and age; statistics are
//! computed lazily from retained samples. Windows with too few samples for
//! their expected tick count are reported but flagged unreliable so that
//! consumers never alarm on thin or brand-new markets.

use crate::error::ConfigError;
use crate::stats;
use crate::types::normalize_key;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::debug;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A rolling window size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    FiveMinutes,
    OneHour,
    OneDay,
}

impl Window {
    pub fn minutes(&self) -> i64 {
        match self {
            Self::FiveMinutes => 5,
            Self::OneHour => 60,
            Self::OneDay => 1440,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::FiveMinutes => "5m",
            Self::OneHour => "1h",
            Self::OneDay => "24h",
        }
    }

    pub fn all() -> Vec<Window> {
        vec![Self::FiveMinutes, Self::OneHour, Self::OneDay]
    }
}

/// One retained volume sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDataPoint {
    pub timestamp: DateTime<Utc>,
    pub volume: f64,
    pub trade_count: u32,
}

/// Statistics for one (market, window) pair, derived on demand
#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    pub window: Window,
    pub average_volume_per_minute: f64,
    pub mean_volume: f64,
    pub std_dev: f64,
    pub sample_count: usize,
    /// Fraction of expected ticks actually present in the window
    pub density: f64,
    /// Windows below the minimum density must not be used for alerting
    pub reliable: bool,
}

/// All configured windows for one market
#[derive(Debug, Clone, Serialize)]
pub struct RollingAverages {
    pub market_id: String,
    pub windows: HashMap<Window, WindowStats>,
}

/// Tracker configuration, validated at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeTrackerConfig {
    /// Hard cap on retained samples per market
    pub max_samples_per_market: usize,
    /// Samples older than this (relative to the newest sample) are evicted
    pub max_sample_age_minutes: i64,
    /// Window sizes reported by `rolling_averages`
    pub windows: Vec<Window>,
    /// Expected seconds between samples, used for density
    pub expected_interval_secs: i64,
    /// Minimum density for a window to be considered reliable
    pub min_data_density: f64,
}

impl Default for VolumeTrackerConfig {
    fn default() -> Self {
        Self {
            max_samples_per_market: 2880,
            max_sample_age_minutes: 1440,
            windows: Window::all(),
            expected_interval_secs: 60,
            min_data_density: 0.5,
        }
    }
}

impl VolumeTrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_samples_per_market == 0 {
            return Err(ConfigError::NonPositive {
                field: "max_samples_per_market",
            });
        }
        if self.max_sample_age_minutes <= 0 {
            return Err(ConfigError::NonPositive {
                field: "max_sample_age_minutes",
            });
        }
        if self.expected_interval_secs <= 0 {
            return Err(ConfigError::NonPositive {
                field: "expected_interval_secs",
            });
        }
        if self.windows.is_empty() {
            return Err(ConfigError::NoWindows);
        }
        if !(0.0..=1.0).contains(&self.min_data_density) {
            return Err(ConfigError::OutOfUnitRange {
                field: "min_data_density",
                value: self.min_data_density,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

type SeriesHandle = Arc<RwLock<VecDeque<VolumeDataPoint>>>;

/// Per-market rolling volume series.
///
/// Each market's series sits behind its own lock so unrelated markets never
/// serialize against each other; the outer map lock is only held long enough
/// to fetch or insert the handle.
pub struct RollingVolumeTracker {
    config: VolumeTrackerConfig,
    series: RwLock<HashMap<String, SeriesHandle>>,
}

impl RollingVolumeTracker {
    pub fn new(config: VolumeTrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            series: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &VolumeTrackerConfig {
        &self.config
    }

    /// Append a volume sample. Negative volume clamps to zero; malformed
    /// input never errors — a missing signal must not crash the pipeline.
    pub fn add_volume(
        &self,
        market_id: &str,
        volume: f64,
        timestamp: DateTime<Utc>,
        trade_count: u32,
    ) {
        let volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };
        let handle = self.series_handle(market_id);
        let mut series = handle.write().unwrap();

        series.push_back(VolumeDataPoint {
            timestamp,
            volume,
            trade_count,
        });

        // FIFO eviction: count cap, then age relative to the newest sample
        while series.len() > self.config.max_samples_per_market {
            series.pop_front();
        }
        if let Some(newest) = series.back().map(|p| p.timestamp) {
            let cutoff = newest - Duration::minutes(self.config.max_sample_age_minutes);
            while series.front().is_some_and(|p| p.timestamp < cutoff) {
                series.pop_front();
            }
        }
    }

    /// Rolling statistics for every configured window. `None` for markets
    /// with no samples.
    pub fn rolling_averages(&self, market_id: &str) -> Option<RollingAverages> {
        let key = normalize_key(market_id);
        let handle = {
            let map = self.series.read().unwrap();
            map.get(&key)?.clone()
        };
        let series = handle.read().unwrap();
        if series.is_empty() {
            return None;
        }

        let now = series.back().map(|p| p.timestamp)?;
        let windows = self
            .config
            .windows
            .iter()
            .map(|&w| (w, self.compute_window(&series, w, now)))
            .collect();

        Some(RollingAverages {
            market_id: key,
            windows,
        })
    }

    /// Statistics for a single window, used by the spike detector.
    pub fn window_stats(&self, market_id: &str, window: Window) -> Option<WindowStats> {
        let key = normalize_key(market_id);
        let handle = {
            let map = self.series.read().unwrap();
            map.get(&key)?.clone()
        };
        let series = handle.read().unwrap();
        let now = series.back().map(|p| p.timestamp)?;
        Some(self.compute_window(&series, window, now))
    }

    pub fn sample_count(&self, market_id: &str) -> usize {
        let key = normalize_key(market_id);
        let map = self.series.read().unwrap();
        map.get(&key)
            .map(|h| h.read().unwrap().len())
            .unwrap_or(0)
    }

    pub fn market_count(&self) -> usize {
        self.series.read().unwrap().len()
    }

    pub fn clear_market(&self, market_id: &str) {
        let key = normalize_key(market_id);
        if self.series.write().unwrap().remove(&key).is_some() {
            debug!(market_id = %key, "cleared volume series");
        }
    }

    pub fn clear_all(&self) {
        self.series.write().unwrap().clear();
    }

    fn series_handle(&self, market_id: &str) -> SeriesHandle {
        let key = normalize_key(market_id);
        {
            let map = self.series.read().unwrap();
            if let Some(handle) = map.get(&key) {
                return handle.clone();
            }
        }
        let mut map = self.series.write().unwrap();
        map.entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(VecDeque::new())))
            .clone()
    }

    fn compute_window(
        &self,
        series: &VecDeque<VolumeDataPoint>,
        window: Window,
        now: DateTime<Utc>,
    ) -> WindowStats {
        let cutoff = now - Duration::minutes(window.minutes());
        let volumes: Vec<f64> = series
            .iter()
            .filter(|p| p.timestamp > cutoff)
            .map(|p| p.volume)
            .collect();

        let sample_count = volumes.len();
        let expected = (window.minutes() * 60) as f64 / self.config.expected_interval_secs as f64;
        let density = if expected > 0.0 {
            (sample_count as f64 / expected).min(1.0)
        } else {
            0.0
        };
        let reliable = density >= self.config.min_data_density;

        let mean_volume = stats::mean(&volumes);
        let total: f64 = volumes.iter().sum();

        WindowStats {
            window,
            average_volume_per_minute: total / window.minutes() as f64,
            mean_volume,
            std_dev: stats::std_dev(&volumes),
            sample_count,
            density,
            reliable,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tracker() -> RollingVolumeTracker {
        RollingVolumeTracker::new(VolumeTrackerConfig::default()).unwrap()
    }

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn test_unknown_market_returns_none() {
        let t = tracker();
        assert!(t.rolling_averages("nope").is_none());
        assert_eq!(t.sample_count("nope"), 0);
    }

    #[test]
    fn test_negative_volume_clamped() {
        let t = tracker();
        t.add_volume("m1", -50.0, ts(0), 1);
        let stats = t.window_stats("m1", Window::FiveMinutes).unwrap();
        assert_eq!(stats.mean_volume, 0.0);
    }

    #[test]
    fn test_rolling_mean_and_density() {
        let t = tracker();
        // one sample per minute for an hour, volume 100
        for i in 0..60 {
            t.add_volume("m1", 100.0, ts(i), 5);
        }
        let averages = t.rolling_averages("m1").unwrap();
        let hour = &averages.windows[&Window::OneHour];
        assert_eq!(hour.sample_count, 60);
        assert!((hour.mean_volume - 100.0).abs() < 1e-9);
        assert!(hour.density > 0.9);
        assert!(hour.reliable);
    }

    #[test]
    fn test_thin_window_flagged_unreliable() {
        let t = tracker();
        t.add_volume("m1", 100.0, ts(0), 1);
        t.add_volume("m1", 100.0, ts(59), 1);
        let hour = t.window_stats("m1", Window::OneHour).unwrap();
        assert!(hour.density < 0.5);
        assert!(!hour.reliable);
    }

    #[test]
    fn test_count_cap_evicts_oldest() {
        let config = VolumeTrackerConfig {
            max_samples_per_market: 10,
            ..Default::default()
        };
        let t = RollingVolumeTracker::new(config).unwrap();
        for i in 0..25 {
            t.add_volume("m1", i as f64, ts(i), 1);
        }
        assert_eq!(t.sample_count("m1"), 10);
        let day = t.window_stats("m1", Window::OneDay).unwrap();
        // Samples 15..=24 remain
        assert!((day.mean_volume - 19.5).abs() < 1e-9);
    }

    #[test]
    fn test_age_cap_evicts_oldest() {
        let config = VolumeTrackerConfig {
            max_sample_age_minutes: 30,
            ..Default::default()
        };
        let t = RollingVolumeTracker::new(config).unwrap();
        t.add_volume("m1", 1.0, ts(0), 1);
        t.add_volume("m1", 2.0, ts(60), 1);
        assert_eq!(t.sample_count("m1"), 1);
    }

    #[test]
    fn test_market_key_normalized() {
        let t = tracker();
        t.add_volume("Market-A", 10.0, ts(0), 1);
        t.add_volume("market-a", 20.0, ts(1), 1);
        assert_eq!(t.sample_count("MARKET-A"), 2);
        assert_eq!(t.market_count(), 1);
    }

    #[test]
    fn test_clear() {
        let t = tracker();
        t.add_volume("m1", 10.0, ts(0), 1);
        t.add_volume("m2", 10.0, ts(0), 1);
        t.clear_market("m1");
        assert_eq!(t.market_count(), 1);
        t.clear_all();
        assert_eq!(t.market_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = VolumeTrackerConfig {
            min_data_density: 1.5,
            ..Default::default()
        };
        assert!(RollingVolumeTracker::new(config).is_err());
        let config = VolumeTrackerConfig {
            windows: vec![],
            ..Default::default()
        };
        assert!(RollingVolumeTracker::new(config).is_err());
    }
}
