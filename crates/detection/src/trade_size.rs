//! Trade Size Analyzer — whale and large-trade classification
//!
//! Classifies each trade against absolute USD tiers (so whales are caught on
//! markets with no history) and against market-relative statistics once
//! enough history exists. Market stats update incrementally via Welford's
//! algorithm plus a bounded ring of recent sizes for percentile estimation;
//! nothing re-scans full history on the hot path.

use crate::error::ConfigError;
use crate::stats::{RecentReservoir, Welford};
use crate::types::{normalize_key, DetectionResult, Severity, Trade};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

const MAX_QUEUED_EVENTS: usize = 256;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Size classification for a single trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSizeCategory {
    Normal,
    Large,
    VeryLarge,
    Whale,
}

impl TradeSizeCategory {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Normal => Severity::Low,
            Self::Large => Severity::Medium,
            Self::VeryLarge => Severity::High,
            Self::Whale => Severity::Critical,
        }
    }
}

/// Statistical classification strategy applied once a market has history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StatStrategy {
    /// Z-score tiers against the market's running mean/std-dev
    ZScore {
        large: f64,
        very_large: f64,
        whale: f64,
    },
    /// Percentile tiers against the recent-size reservoir
    Percentile {
        large: f64,
        very_large: f64,
        whale: f64,
    },
}

impl Default for StatStrategy {
    fn default() -> Self {
        Self::ZScore {
            large: 2.0,
            very_large: 3.0,
            whale: 4.0,
        }
    }
}

/// Analyzer configuration, validated at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSizeConfig {
    /// Absolute USD tiers — whale detection works with zero market history
    pub large_usd: f64,
    pub very_large_usd: f64,
    pub whale_usd: f64,
    pub stat_strategy: StatStrategy,
    /// Market history required before statistical classification applies
    pub min_samples_for_stats: u64,
    /// Recent sizes retained per market for percentile estimation
    pub reservoir_capacity: usize,
    /// Per-(market, wallet) window within which repeat large-trade events
    /// are suppressed
    pub cooldown_ms: i64,
    /// Whale wallets returned by `summary`
    pub top_wallets_limit: usize,
}

impl Default for TradeSizeConfig {
    fn default() -> Self {
        Self {
            large_usd: 10_000.0,
            very_large_usd: 50_000.0,
            whale_usd: 100_000.0,
            stat_strategy: StatStrategy::default(),
            min_samples_for_stats: 30,
            reservoir_capacity: 512,
            cooldown_ms: 300_000,
            top_wallets_limit: 10,
        }
    }
}

impl TradeSizeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.large_usd <= 0.0
            || self.very_large_usd <= self.large_usd
            || self.whale_usd <= self.very_large_usd
        {
            return Err(ConfigError::NotIncreasing {
                field: "absolute usd tiers",
            });
        }
        match &self.stat_strategy {
            StatStrategy::ZScore {
                large,
                very_large,
                whale,
            } => {
                if *large <= 0.0 || very_large <= large || whale <= very_large {
                    return Err(ConfigError::NotIncreasing {
                        field: "z-score tiers",
                    });
                }
            }
            StatStrategy::Percentile {
                large,
                very_large,
                whale,
            } => {
                for (field, v) in [
                    ("percentile large", large),
                    ("percentile very_large", very_large),
                    ("percentile whale", whale),
                ] {
                    if !(0.0..=1.0).contains(v) {
                        return Err(ConfigError::OutOfUnitRange { field, value: *v });
                    }
                }
                if very_large <= large || whale <= very_large {
                    return Err(ConfigError::NotIncreasing {
                        field: "percentile tiers",
                    });
                }
            }
        }
        if self.reservoir_capacity == 0 {
            return Err(ConfigError::NonPositive {
                field: "reservoir_capacity",
            });
        }
        if self.cooldown_ms < 0 {
            return Err(ConfigError::NonPositive { field: "cooldown_ms" });
        }
        Ok(())
    }
}

/// Running size statistics for one market (never reset except by clear)
#[derive(Debug, Clone, Serialize)]
pub struct MarketSizeStats {
    pub trade_count: u64,
    pub mean_usd: f64,
    pub std_dev_usd: f64,
    pub min_usd: f64,
    pub max_usd: f64,
}

/// Large-trade aggregate for one wallet
#[derive(Debug, Clone, Serialize)]
pub struct WalletLargeTradeStats {
    pub large_trade_count: u64,
    pub total_usd: f64,
}

impl WalletLargeTradeStats {
    pub fn avg_usd(&self) -> f64 {
        if self.large_trade_count == 0 {
            0.0
        } else {
            self.total_usd / self.large_trade_count as f64
        }
    }
}

/// Result of `analyze_trade`
#[derive(Debug, Clone, Serialize)]
pub struct TradeSizeAnalysis {
    pub category: TradeSizeCategory,
    pub severity: Severity,
    pub z_score: Option<f64>,
    pub percentile_rank: Option<f64>,
    pub is_flagged: bool,
    pub market_sample_count: u64,
    pub cooldown_suppressed: bool,
}

impl From<&TradeSizeAnalysis> for DetectionResult {
    fn from(a: &TradeSizeAnalysis) -> Self {
        DetectionResult {
            flagged: a.is_flagged,
            severity: a.is_flagged.then_some(a.severity),
            z_score: a.z_score,
            percentile: a.percentile_rank,
        }
    }
}

/// A flagged large trade, queued for the host to drain
#[derive(Debug, Clone, Serialize)]
pub struct LargeTradeEvent {
    pub trade_id: String,
    pub market_id: String,
    pub wallet_address: String,
    pub size_usd: f64,
    pub category: TradeSizeCategory,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Top-level aggregate view over all tracked markets and wallets
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerSummary {
    pub markets_tracked: usize,
    pub wallets_tracked: usize,
    pub total_trades: u64,
    pub flagged_trades: u64,
    /// Repeat whales, ordered by large-trade count descending
    pub top_whale_wallets: Vec<(String, WalletLargeTradeStats)>,
}

struct MarketState {
    welford: Welford,
    reservoir: RecentReservoir,
}

#[derive(Default)]
struct WalletState {
    large_trade_count: u64,
    total_large_usd: f64,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

pub struct TradeSizeAnalyzer {
    config: TradeSizeConfig,
    markets: RwLock<HashMap<String, Arc<RwLock<MarketState>>>>,
    wallets: RwLock<HashMap<String, Arc<RwLock<WalletState>>>>,
    cooldowns: Mutex<HashMap<(String, String), DateTime<Utc>>>,
    events: Mutex<VecDeque<LargeTradeEvent>>,
    total_trades: Mutex<u64>,
    flagged_trades: Mutex<u64>,
}

impl TradeSizeAnalyzer {
    pub fn new(config: TradeSizeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            markets: RwLock::new(HashMap::new()),
            wallets: RwLock::new(HashMap::new()),
            cooldowns: Mutex::new(HashMap::new()),
            events: Mutex::new(VecDeque::new()),
            total_trades: Mutex::new(0),
            flagged_trades: Mutex::new(0),
        })
    }

    /// Classify a trade and fold it into the running aggregates.
    ///
    /// The trade is classified against statistics as they stood *before*
    /// this trade, then added to them.
    pub fn analyze_trade(&self, trade: &Trade) -> TradeSizeAnalysis {
        let market_key = normalize_key(&trade.market_id);
        let wallet_key = normalize_key(&trade.wallet_address);
        let size = if trade.size_usd.is_finite() {
            trade.size_usd.max(0.0)
        } else {
            0.0
        };

        let handle = self.market_handle(&market_key);
        let mut market = handle.write().unwrap();

        let sample_count = market.welford.count;
        let has_history = sample_count >= self.config.min_samples_for_stats;

        let z = if has_history && market.welford.std_dev() > 0.0 {
            Some((size - market.welford.mean) / market.welford.std_dev())
        } else {
            None
        };
        let rank = if has_history && !market.reservoir.is_empty() {
            Some(market.reservoir.rank_of(size))
        } else {
            None
        };

        let absolute = self.absolute_category(size);
        let statistical = self.statistical_category(z, rank);
        let category = absolute.max(statistical);

        market.welford.push(size);
        market.reservoir.push(size);
        drop(market);

        *self.total_trades.lock().unwrap() += 1;

        let is_flagged = category >= TradeSizeCategory::Large;
        let mut cooldown_suppressed = false;

        if is_flagged {
            *self.flagged_trades.lock().unwrap() += 1;
            self.bump_wallet(&wallet_key, size);

            cooldown_suppressed = !self.cooldown_elapsed(&market_key, &wallet_key, trade.timestamp);
            if cooldown_suppressed {
                debug!(
                    market_id = %market_key,
                    wallet = %wallet_key,
                    "large-trade event suppressed by cooldown"
                );
            } else {
                info!(
                    market_id = %market_key,
                    wallet = %wallet_key,
                    size_usd = size,
                    category = ?category,
                    "large trade detected"
                );
                self.push_event(LargeTradeEvent {
                    trade_id: trade.trade_id.clone(),
                    market_id: market_key,
                    wallet_address: wallet_key,
                    size_usd: size,
                    category,
                    severity: category.severity(),
                    timestamp: trade.timestamp,
                });
            }
        }

        TradeSizeAnalysis {
            category,
            severity: category.severity(),
            z_score: z,
            percentile_rank: rank,
            is_flagged,
            market_sample_count: sample_count,
            cooldown_suppressed,
        }
    }

    // -- read-only query surfaces ------------------------------------------

    pub fn wallet_large_trade_stats(&self, wallet_address: &str) -> Option<WalletLargeTradeStats> {
        let key = normalize_key(wallet_address);
        let handle = {
            let map = self.wallets.read().unwrap();
            map.get(&key)?.clone()
        };
        let state = handle.read().unwrap();
        Some(WalletLargeTradeStats {
            large_trade_count: state.large_trade_count,
            total_usd: state.total_large_usd,
        })
    }

    pub fn market_stats(&self, market_id: &str) -> Option<MarketSizeStats> {
        let key = normalize_key(market_id);
        let handle = {
            let map = self.markets.read().unwrap();
            map.get(&key)?.clone()
        };
        let state = handle.read().unwrap();
        if state.welford.count == 0 {
            return None;
        }
        Some(MarketSizeStats {
            trade_count: state.welford.count,
            mean_usd: state.welford.mean,
            std_dev_usd: state.welford.std_dev(),
            min_usd: state.welford.min,
            max_usd: state.welford.max,
        })
    }

    /// Fraction of recent trades on the market strictly smaller than `size_usd`;
    /// 0.0 for unknown markets.
    pub fn percentile_rank(&self, market_id: &str, size_usd: f64) -> f64 {
        let key = normalize_key(market_id);
        let handle = {
            let map = self.markets.read().unwrap();
            match map.get(&key) {
                Some(h) => h.clone(),
                None => return 0.0,
            }
        };
        let state = handle.read().unwrap();
        state.reservoir.rank_of(size_usd)
    }

    /// Whether a hypothetical trade of `size_usd` would be a statistical
    /// outlier on this market (lowest z tier, or absolute Large tier).
    pub fn is_outlier_trade(&self, market_id: &str, size_usd: f64) -> bool {
        if size_usd >= self.config.large_usd {
            return true;
        }
        let Some(stats) = self.market_stats(market_id) else {
            return false;
        };
        if stats.trade_count < self.config.min_samples_for_stats || stats.std_dev_usd <= 0.0 {
            return false;
        }
        let z = (size_usd - stats.mean_usd) / stats.std_dev_usd;
        let tier = match &self.config.stat_strategy {
            StatStrategy::ZScore { large, .. } => *large,
            StatStrategy::Percentile { .. } => 2.0,
        };
        z >= tier
    }

    pub fn summary(&self) -> AnalyzerSummary {
        let wallets = self.wallets.read().unwrap();
        let mut top: Vec<(String, WalletLargeTradeStats)> = wallets
            .iter()
            .map(|(wallet, handle)| {
                let state = handle.read().unwrap();
                (
                    wallet.clone(),
                    WalletLargeTradeStats {
                        large_trade_count: state.large_trade_count,
                        total_usd: state.total_large_usd,
                    },
                )
            })
            .filter(|(_, s)| s.large_trade_count > 0)
            .collect();
        top.sort_by(|a, b| {
            b.1.large_trade_count
                .cmp(&a.1.large_trade_count)
                .then(b.1.total_usd.total_cmp(&a.1.total_usd))
        });
        top.truncate(self.config.top_wallets_limit);

        AnalyzerSummary {
            markets_tracked: self.markets.read().unwrap().len(),
            wallets_tracked: wallets.len(),
            total_trades: *self.total_trades.lock().unwrap(),
            flagged_trades: *self.flagged_trades.lock().unwrap(),
            top_whale_wallets: top,
        }
    }

    /// Drain queued large-trade events in trigger order.
    pub fn drain_events(&self) -> Vec<LargeTradeEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }

    pub fn clear_market(&self, market_id: &str) {
        let key = normalize_key(market_id);
        self.markets.write().unwrap().remove(&key);
        self.cooldowns
            .lock()
            .unwrap()
            .retain(|(market, _), _| market != &key);
    }

    pub fn clear_all(&self) {
        self.markets.write().unwrap().clear();
        self.wallets.write().unwrap().clear();
        self.cooldowns.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
        *self.total_trades.lock().unwrap() = 0;
        *self.flagged_trades.lock().unwrap() = 0;
    }

    // -- internals ----------------------------------------------------------

    fn absolute_category(&self, size: f64) -> TradeSizeCategory {
        if size >= self.config.whale_usd {
            TradeSizeCategory::Whale
        } else if size >= self.config.very_large_usd {
            TradeSizeCategory::VeryLarge
        } else if size >= self.config.large_usd {
            TradeSizeCategory::Large
        } else {
            TradeSizeCategory::Normal
        }
    }

    fn statistical_category(&self, z: Option<f64>, rank: Option<f64>) -> TradeSizeCategory {
        match &self.config.stat_strategy {
            StatStrategy::ZScore {
                large,
                very_large,
                whale,
            } => match z {
                Some(z) if z >= *whale => TradeSizeCategory::Whale,
                Some(z) if z >= *very_large => TradeSizeCategory::VeryLarge,
                Some(z) if z >= *large => TradeSizeCategory::Large,
                _ => TradeSizeCategory::Normal,
            },
            StatStrategy::Percentile {
                large,
                very_large,
                whale,
            } => match rank {
                Some(r) if r >= *whale => TradeSizeCategory::Whale,
                Some(r) if r >= *very_large => TradeSizeCategory::VeryLarge,
                Some(r) if r >= *large => TradeSizeCategory::Large,
                _ => TradeSizeCategory::Normal,
            },
        }
    }

    fn market_handle(&self, key: &str) -> Arc<RwLock<MarketState>> {
        {
            let map = self.markets.read().unwrap();
            if let Some(handle) = map.get(key) {
                return handle.clone();
            }
        }
        let mut map = self.markets.write().unwrap();
        map.entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(RwLock::new(MarketState {
                    welford: Welford::new(),
                    reservoir: RecentReservoir::new(self.config.reservoir_capacity),
                }))
            })
            .clone()
    }

    fn bump_wallet(&self, key: &str, size: f64) {
        let handle = {
            let map = self.wallets.read().unwrap();
            map.get(key).cloned()
        };
        let handle = match handle {
            Some(h) => h,
            None => {
                let mut map = self.wallets.write().unwrap();
                map.entry(key.to_string())
                    .or_insert_with(|| Arc::new(RwLock::new(WalletState::default())))
                    .clone()
            }
        };
        let mut state = handle.write().unwrap();
        state.large_trade_count += 1;
        state.total_large_usd += size;
    }

    fn cooldown_elapsed(&self, market: &str, wallet: &str, now: DateTime<Utc>) -> bool {
        let mut cooldowns = self.cooldowns.lock().unwrap();
        let key = (market.to_string(), wallet.to_string());
        if let Some(last) = cooldowns.get(&key) {
            if (now - *last).num_milliseconds() < self.config.cooldown_ms {
                return false;
            }
        }
        cooldowns.insert(key, now);
        true
    }

    fn push_event(&self, event: LargeTradeEvent) {
        let mut events = self.events.lock().unwrap();
        if events.len() == MAX_QUEUED_EVENTS {
            events.pop_front();
        }
        events.push_back(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
