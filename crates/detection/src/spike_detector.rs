//! Volume Spike Detector — classify instantaneous volume readings against
//! the tracker's baseline and follow spike persistence per market
//!
//! Two independent strategies (z-score and percent deviation from baseline),
//! each individually switchable. A reading is a spike when either enabled
//! strategy crosses its lowest threshold; severity is the highest reached by
//! either. Per-market cooldown suppresses alert storms; consecutive
//! detections within a bounded gap upgrade an episode to Sustained.

use crate::error::ConfigError;
use crate::types::{normalize_key, DetectionResult, Severity};
use crate::volume_tracker::{RollingVolumeTracker, Window};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

const MAX_QUEUED_EVENTS: usize = 256;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Direction of a spike relative to baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpikeDirection {
    Up,
    Down,
}

/// How a spike episode is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpikeKind {
    /// Single crossing, moderate severity
    Momentary,
    /// Single crossing that blew far past baseline in one reading
    Sudden,
    /// Enough consecutive detections to indicate a regime change
    Sustained,
}

/// A reported spike, queued for the host to drain
#[derive(Debug, Clone, Serialize)]
pub struct SpikeEvent {
    pub market_id: String,
    pub timestamp: DateTime<Utc>,
    pub volume: f64,
    pub baseline_mean: f64,
    pub z_score: Option<f64>,
    pub pct_deviation: Option<f64>,
    pub severity: Severity,
    pub direction: SpikeDirection,
    pub kind: SpikeKind,
    pub consecutive_points: u32,
    /// True on exactly the detection that first upgraded the episode to
    /// Sustained
    pub sustained_transition: bool,
}

/// Outcome of a single `detect_spike` call
#[derive(Debug, Clone, Serialize)]
pub struct SpikeDetection {
    pub is_spike: bool,
    pub event: Option<SpikeEvent>,
    /// False when the baseline window was missing, too thin, or flat
    pub baseline_reliable: bool,
    pub suppressed_by_cooldown: bool,
}

impl From<&SpikeDetection> for DetectionResult {
    fn from(d: &SpikeDetection) -> Self {
        DetectionResult {
            flagged: d.is_spike,
            severity: d.event.as_ref().map(|e| e.severity),
            z_score: d.event.as_ref().and_then(|e| e.z_score),
            percentile: None,
        }
    }
}

/// Persistence state for one market's current spike episode
#[derive(Debug, Clone, Serialize)]
pub struct SpikeState {
    pub in_spike: bool,
    pub consecutive_points: u32,
    pub first_spike_at: DateTime<Utc>,
    pub last_spike_at: DateTime<Utc>,
    pub direction: SpikeDirection,
    sustained_notified: bool,
}

#[derive(Default)]
struct MarketState {
    spike: Option<SpikeState>,
    last_reported_at: Option<DateTime<Utc>>,
}

/// Detector configuration, validated at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeDetectorConfig {
    pub z_score_enabled: bool,
    /// |z| thresholds for Low/Medium/High/Critical, strictly increasing
    pub z_thresholds: [f64; 4],
    pub pct_enabled: bool,
    /// |percent deviation| thresholds for Low/Medium/High/Critical
    pub pct_thresholds: [f64; 4],
    /// Tracker window the baseline is read from
    pub baseline_window: Window,
    /// Minimum baseline samples before any classification
    pub min_baseline_samples: usize,
    /// Consecutive detections that upgrade an episode to Sustained
    pub min_consecutive_points: u32,
    /// Detections further apart than this break an episode
    pub max_gap_minutes: i64,
    /// Reported spikes within this window are suppressed
    pub cooldown_ms: i64,
}

impl Default for SpikeDetectorConfig {
    fn default() -> Self {
        Self {
            z_score_enabled: true,
            z_thresholds: [2.5, 3.5, 5.0, 8.0],
            pct_enabled: true,
            pct_thresholds: [200.0, 400.0, 800.0, 1500.0],
            baseline_window: Window::OneHour,
            min_baseline_samples: 10,
            min_consecutive_points: 3,
            max_gap_minutes: 10,
            cooldown_ms: 300_000,
        }
    }
}

impl SpikeDetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.z_score_enabled && !self.pct_enabled {
            return Err(ConfigError::NoStrategyEnabled);
        }
        for (field, t) in [
            ("z_thresholds", &self.z_thresholds),
            ("pct_thresholds", &self.pct_thresholds),
        ] {
            if t.windows(2).any(|pair| pair[0] >= pair[1]) || t[0] <= 0.0 {
                return Err(ConfigError::NotIncreasing { field });
            }
        }
        if self.min_consecutive_points == 0 {
            return Err(ConfigError::NonPositive {
                field: "min_consecutive_points",
            });
        }
        if self.max_gap_minutes <= 0 {
            return Err(ConfigError::NonPositive {
                field: "max_gap_minutes",
            });
        }
        if self.cooldown_ms < 0 {
            return Err(ConfigError::NonPositive {
                field: "cooldown_ms",
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Spike detector over a shared volume tracker.
pub struct VolumeSpikeDetector {
    config: SpikeDetectorConfig,
    tracker: Arc<RollingVolumeTracker>,
    states: RwLock<HashMap<String, Arc<RwLock<MarketState>>>>,
    events: Mutex<VecDeque<SpikeEvent>>,
}

impl VolumeSpikeDetector {
    pub fn new(
        config: SpikeDetectorConfig,
        tracker: Arc<RollingVolumeTracker>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            tracker,
            states: RwLock::new(HashMap::new()),
            events: Mutex::new(VecDeque::new()),
        })
    }

    /// Classify one volume reading. Missing or unreliable baselines never
    /// flag; cooldown suppression returns `is_spike = false` while still
    /// advancing the episode state.
    pub fn detect_spike(
        &self,
        market_id: &str,
        volume: f64,
        timestamp: DateTime<Utc>,
        bypass_cooldown: bool,
    ) -> SpikeDetection {
        let key = normalize_key(market_id);
        let volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };

        let baseline = self.tracker.window_stats(&key, self.config.baseline_window);
        let baseline = match baseline {
            Some(b) if b.reliable && b.sample_count >= self.config.min_baseline_samples => b,
            _ => {
                debug!(market_id = %key, "spike check skipped: baseline missing or unreliable");
                return SpikeDetection {
                    is_spike: false,
                    event: None,
                    baseline_reliable: false,
                    suppressed_by_cooldown: false,
                };
            }
        };

        let z = if self.config.z_score_enabled && baseline.std_dev > 0.0 {
            Some((volume - baseline.mean_volume) / baseline.std_dev)
        } else {
            None
        };
        let pct = if self.config.pct_enabled && baseline.mean_volume > 0.0 {
            Some((volume - baseline.mean_volume) / baseline.mean_volume * 100.0)
        } else {
            None
        };

        let z_severity = z.and_then(|z| severity_for(z.abs(), &self.config.z_thresholds));
        let pct_severity = pct.and_then(|p| severity_for(p.abs(), &self.config.pct_thresholds));
        let severity = match (z_severity, pct_severity) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        let handle = self.state_handle(&key);
        let mut state = handle.write().unwrap();

        let Some(severity) = severity else {
            // Not a spike: clear a stale episode once the gap has passed
            if let Some(spike) = &state.spike {
                if timestamp - spike.last_spike_at
                    > Duration::minutes(self.config.max_gap_minutes)
                {
                    state.spike = None;
                    debug!(market_id = %key, "spike episode cleared");
                }
            }
            return SpikeDetection {
                is_spike: false,
                event: None,
                baseline_reliable: true,
                suppressed_by_cooldown: false,
            };
        };

        let direction = if volume >= baseline.mean_volume {
            SpikeDirection::Up
        } else {
            SpikeDirection::Down
        };

        // Advance the episode (cooldown never stalls sustained tracking)
        let consecutive = match &state.spike {
            Some(spike)
                if timestamp - spike.last_spike_at
                    <= Duration::minutes(self.config.max_gap_minutes) =>
            {
                spike.consecutive_points + 1
            }
            _ => 1,
        };
        let first_spike_at = state
            .spike
            .as_ref()
            .filter(|_| consecutive > 1)
            .map(|s| s.first_spike_at)
            .unwrap_or(timestamp);
        let already_notified = state
            .spike
            .as_ref()
            .filter(|_| consecutive > 1)
            .map(|s| s.sustained_notified)
            .unwrap_or(false);

        let sustained = consecutive >= self.config.min_consecutive_points;
        let sustained_transition = sustained && !already_notified;
        let kind = if sustained {
            SpikeKind::Sustained
        } else if severity >= Severity::High {
            SpikeKind::Sudden
        } else {
            SpikeKind::Momentary
        };

        state.spike = Some(SpikeState {
            in_spike: true,
            consecutive_points: consecutive,
            first_spike_at,
            last_spike_at: timestamp,
            direction,
            sustained_notified: already_notified || sustained_transition,
        });

        let in_cooldown = state.last_reported_at.is_some_and(|last| {
            (timestamp - last).num_milliseconds() < self.config.cooldown_ms
        });
        if in_cooldown && !bypass_cooldown && !sustained_transition {
            debug!(market_id = %key, "spike suppressed by cooldown");
            return SpikeDetection {
                is_spike: false,
                event: None,
                baseline_reliable: true,
                suppressed_by_cooldown: true,
            };
        }
        state.last_reported_at = Some(timestamp);
        drop(state);

        let event = SpikeEvent {
            market_id: key.clone(),
            timestamp,
            volume,
            baseline_mean: baseline.mean_volume,
            z_score: z,
            pct_deviation: pct,
            severity,
            direction,
            kind,
            consecutive_points: consecutive,
            sustained_transition,
        };

        if sustained_transition {
            info!(
                market_id = %key,
                consecutive,
                severity = severity.label(),
                "sustained volume spike"
            );
        } else {
            info!(
                market_id = %key,
                volume,
                baseline = baseline.mean_volume,
                severity = severity.label(),
                direction = ?direction,
                "volume spike detected"
            );
        }
        self.push_event(event.clone());

        SpikeDetection {
            is_spike: true,
            event: Some(event),
            baseline_reliable: true,
            suppressed_by_cooldown: false,
        }
    }

    pub fn is_in_spike_state(&self, market_id: &str) -> bool {
        self.spike_state(market_id)
            .map(|s| s.in_spike)
            .unwrap_or(false)
    }

    pub fn spike_state(&self, market_id: &str) -> Option<SpikeState> {
        let key = normalize_key(market_id);
        let handle = {
            let map = self.states.read().unwrap();
            map.get(&key)?.clone()
        };
        let state = handle.read().unwrap();
        state.spike.clone()
    }

    /// Drain queued spike events in trigger order.
    pub fn drain_events(&self) -> Vec<SpikeEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }

    pub fn clear_market(&self, market_id: &str) {
        let key = normalize_key(market_id);
        self.states.write().unwrap().remove(&key);
    }

    pub fn clear_all(&self) {
        self.states.write().unwrap().clear();
        self.events.lock().unwrap().clear();
    }

    fn state_handle(&self, key: &str) -> Arc<RwLock<MarketState>> {
        {
            let map = self.states.read().unwrap();
            if let Some(handle) = map.get(key) {
                return handle.clone();
            }
        }
        let mut map = self.states.write().unwrap();
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(MarketState::default())))
            .clone()
    }

    fn push_event(&self, event: SpikeEvent) {
        let mut events = self.events.lock().unwrap();
        if events.len() == MAX_QUEUED_EVENTS {
            events.pop_front();
        }
        events.push_back(event);
    }
}

fn severity_for(magnitude: f64, thresholds: &[f64; 4]) -> Option<Severity> {
    if magnitude >= thresholds[3] {
        Some(Severity::Critical)
    } else if magnitude >= thresholds[2] {
        Some(Severity::High)
    } else if magnitude >= thresholds[1] {
        Some(Severity::Medium)
    } else if magnitude >= thresholds[0] {
        Some(Severity::Low)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
