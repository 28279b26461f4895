//! Win Rate Tracker — per-wallet win-rate analysis over resolved positions
//!
//! Computes win rate across rolling time windows, breaks it down by market
//! category, detects behavioral anomalies (category specialization, perfect
//! timing streaks, high-conviction accuracy gaps) and classifies wallets by
//! suspicion level. Everything is recomputed from the full position set on
//! each `analyze` call so corrections never leave drifted aggregates behind.

use crate::error::ConfigError;
use crate::types::{normalize_key, PositionOutcome, ResolvedPosition};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Rolling analysis windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Week,
    Month,
    Quarter,
    AllTime,
}

impl TimeWindow {
    pub fn days(&self) -> Option<i64> {
        match self {
            Self::Week => Some(7),
            Self::Month => Some(30),
            Self::Quarter => Some(90),
            Self::AllTime => None,
        }
    }

    pub fn all() -> [TimeWindow; 4] {
        [Self::Week, Self::Month, Self::Quarter, Self::AllTime]
    }
}

/// Win-rate tier from all-time win rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WinRateCategory {
    Average,
    AboveAverage,
    High,
    Exceptional,
}

/// How suspicious a wallet's record looks overall
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SuspicionLevel {
    None,
    Low,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

/// Behavioral anomaly detected during analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    CategorySpecialization,
    PerfectTiming,
    HighConvictionGap,
}

#[derive(Debug, Clone, Serialize)]
pub struct WinRateAnomaly {
    pub kind: AnomalyKind,
    pub description: String,
}

/// Performance within one time window
#[derive(Debug, Clone, Serialize)]
pub struct WindowPerformance {
    pub wins: u32,
    pub losses: u32,
    /// 0..100
    pub win_rate: f64,
    pub total_win_profit: f64,
    /// Magnitude of losing PnL (positive number)
    pub total_loss: f64,
    pub net_pnl: f64,
    /// `f64::INFINITY` with wins and no losses; `0.0` with no wins
    pub profit_factor: f64,
}

/// Performance within one market category
#[derive(Debug, Clone, Serialize)]
pub struct CategoryPerformance {
    pub category: String,
    pub trades: u32,
    pub wins: u32,
    pub win_rate: f64,
    /// Fraction of the wallet's positions in this category
    pub share: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreakSummary {
    pub longest_win_streak: u32,
    pub longest_loss_streak: u32,
    pub current_streak_type: Option<PositionOutcome>,
    pub current_streak_length: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HighConvictionStats {
    pub positions: u32,
    pub wins: u32,
    pub win_rate: f64,
    pub baseline_win_rate: f64,
    pub gap: f64,
}

/// Full analysis for one wallet
#[derive(Debug, Clone, Serialize)]
pub struct WinRateResult {
    pub wallet_address: String,
    pub total_positions: usize,
    pub windows: HashMap<TimeWindow, WindowPerformance>,
    pub categories: Vec<CategoryPerformance>,
    /// Category names ordered by position count descending
    pub top_categories: Vec<String>,
    pub streaks: StreakSummary,
    pub high_conviction: Option<HighConvictionStats>,
    pub trend: TrendDirection,
    pub anomalies: Vec<WinRateAnomaly>,
    pub category: WinRateCategory,
    pub suspicion: SuspicionLevel,
}

/// Tracker configuration, validated at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinRateConfig {
    /// All-time win-rate tier boundaries (percent)
    pub above_average_pct: f64,
    pub high_pct: f64,
    pub exceptional_pct: f64,
    /// Below this many positions, suspicion caps at Low
    pub min_positions_low: usize,
    /// Below this many positions, suspicion caps at High
    pub min_positions_full: usize,
    /// Win streaks of this length raise a perfect-timing anomaly
    pub streak_threshold: u32,
    /// High-conviction positions required before the gap check applies
    pub high_conviction_min: u32,
    /// Gap (percentage points) over baseline that raises an anomaly
    pub high_conviction_gap_pct: f64,
    /// Top-category share of trades considered disproportionate
    pub specialization_share: f64,
    /// Dead band (percentage points) for the trend direction
    pub trend_margin_pct: f64,
    /// Positions with exits within this many days count as "recent"
    pub recent_days: i64,
}

impl Default for WinRateConfig {
    fn default() -> Self {
        Self {
            above_average_pct: 55.0,
            high_pct: 65.0,
            exceptional_pct: 75.0,
            min_positions_low: 10,
            min_positions_full: 30,
            streak_threshold: 7,
            high_conviction_min: 5,
            high_conviction_gap_pct: 15.0,
            specialization_share: 0.5,
            trend_margin_pct: 5.0,
            recent_days: 30,
        }
    }
}

impl WinRateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.above_average_pct >= self.high_pct || self.high_pct >= self.exceptional_pct {
            return Err(ConfigError::NotIncreasing {
                field: "win-rate tier boundaries",
            });
        }
        if !(0.0..=1.0).contains(&self.specialization_share) {
            return Err(ConfigError::OutOfUnitRange {
                field: "specialization_share",
                value: self.specialization_share,
            });
        }
        if self.streak_threshold == 0 {
            return Err(ConfigError::NonPositive {
                field: "streak_threshold",
            });
        }
        if self.recent_days <= 0 {
            return Err(ConfigError::NonPositive {
                field: "recent_days",
            });
        }
        Ok(())
    }
}

type PositionSet = Arc<RwLock<HashMap<String, ResolvedPosition>>>;

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct WinRateTracker {
    config: WinRateConfig,
    wallets: RwLock<HashMap<String, PositionSet>>,
}

impl WinRateTracker {
    pub fn new(config: WinRateConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            wallets: RwLock::new(HashMap::new()),
        })
    }

    /// Idempotent upsert keyed by `position_id`: a resubmission fully
    /// replaces the prior record, never double-counts.
    pub fn add_position(&self, position: ResolvedPosition) {
        let wallet_key = normalize_key(&position.wallet_address);
        let handle = self.wallet_handle(&wallet_key);
        let mut positions = handle.write().unwrap();
        let replaced = positions
            .insert(position.position_id.clone(), position)
            .is_some();
        if replaced {
            debug!(wallet = %wallet_key, "position replaced (last-write-wins)");
        }
    }

    /// Recompute the full analysis for one wallet from its position set.
    /// `None` for wallets with no recorded positions.
    pub fn analyze(&self, wallet_address: &str) -> Option<WinRateResult> {
        let key = normalize_key(wallet_address);
        let handle = {
            let map = self.wallets.read().unwrap();
            map.get(&key)?.clone()
        };
        // Snapshot under the read lock; analysis runs on the copy
        let mut positions: Vec<ResolvedPosition> =
            handle.read().unwrap().values().cloned().collect();
        if positions.is_empty() {
            return None;
        }
        positions.sort_by_key(|p| p.exit_ts);
        Some(self.analyze_positions(&key, &positions))
    }

    /// Analyze every tracked wallet.
    pub fn batch_analyze(&self) -> Vec<WinRateResult> {
        let wallets: Vec<String> = self.wallets.read().unwrap().keys().cloned().collect();
        wallets
            .iter()
            .filter_map(|wallet| self.analyze(wallet))
            .collect()
    }

    /// Wallets whose all-time win rate is at least `min_rate` percent,
    /// ordered by rate descending.
    pub fn high_win_rate_wallets(&self, min_rate: f64) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .batch_analyze()
            .into_iter()
            .filter_map(|r| {
                let rate = r.windows.get(&TimeWindow::AllTime)?.win_rate;
                (rate >= min_rate).then_some((r.wallet_address, rate))
            })
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }

    /// Wallets whose win-rate tier, suspicion level, and anomaly set jointly
    /// indicate trading consistent with non-public information.
    pub fn potential_insiders(&self) -> Vec<WinRateResult> {
        self.batch_analyze()
            .into_iter()
            .filter(|r| {
                r.suspicion >= SuspicionLevel::High
                    && r.category >= WinRateCategory::High
                    && !r.anomalies.is_empty()
            })
            .collect()
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.read().unwrap().len()
    }

    pub fn clear_wallet(&self, wallet_address: &str) {
        let key = normalize_key(wallet_address);
        self.wallets.write().unwrap().remove(&key);
    }

    pub fn clear_all(&self) {
        self.wallets.write().unwrap().clear();
    }

    fn wallet_handle(&self, key: &str) -> PositionSet {
        {
            let map = self.wallets.read().unwrap();
            if let Some(handle) = map.get(key) {
                return handle.clone();
            }
        }
        let mut map = self.wallets.write().unwrap();
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(HashMap::new())))
            .clone()
    }

    // -- analysis ----------------------------------------------------------

    fn analyze_positions(&self, wallet: &str, positions: &[ResolvedPosition]) -> WinRateResult {
        // Rolling windows anchor on the newest exit so analysis is
        // deterministic for a given position set
        let reference = positions.last().map(|p| p.exit_ts).unwrap_or_else(Utc::now);

        let windows: HashMap<TimeWindow, WindowPerformance> = TimeWindow::all()
            .into_iter()
            .map(|w| (w, window_performance(positions, w, reference)))
            .collect();
        let all_time = &windows[&TimeWindow::AllTime];
        let overall_rate = all_time.win_rate;

        let categories = category_breakdown(positions);
        let top_categories: Vec<String> =
            categories.iter().map(|c| c.category.clone()).collect();

        let streaks = streak_summary(positions);
        let high_conviction = high_conviction_stats(positions, overall_rate);
        let trend = self.trend(positions, reference);

        let mut anomalies = Vec::new();
        if let Some(top) = categories.first() {
            if top.share > self.config.specialization_share
                && top.win_rate >= overall_rate
                && top.win_rate >= self.config.above_average_pct
            {
                anomalies.push(WinRateAnomaly {
                    kind: AnomalyKind::CategorySpecialization,
                    description: format!(
                        "{:.0}% win rate in '{}' across {:.0}% of positions",
                        top.win_rate,
                        top.category,
                        top.share * 100.0
                    ),
                });
            }
        }
        if streaks.longest_win_streak >= self.config.streak_threshold {
            anomalies.push(WinRateAnomaly {
                kind: AnomalyKind::PerfectTiming,
                description: format!(
                    "{} consecutive winning positions",
                    streaks.longest_win_streak
                ),
            });
        }
        if let Some(hc) = &high_conviction {
            if hc.positions >= self.config.high_conviction_min
                && hc.gap >= self.config.high_conviction_gap_pct
            {
                anomalies.push(WinRateAnomaly {
                    kind: AnomalyKind::HighConvictionGap,
                    description: format!(
                        "high-conviction win rate {:.0}% vs baseline {:.0}%",
                        hc.win_rate, hc.baseline_win_rate
                    ),
                });
            }
        }

        let category = self.win_rate_category(overall_rate);
        let suspicion = self.suspicion_level(category, anomalies.len(), positions.len());

        if suspicion >= SuspicionLevel::High {
            info!(
                wallet = %wallet,
                win_rate = overall_rate,
                positions = positions.len(),
                anomalies = anomalies.len(),
                suspicion = ?suspicion,
                "suspicious win-rate profile"
            );
        }

        WinRateResult {
            wallet_address: wallet.to_string(),
            total_positions: positions.len(),
            windows,
            categories,
            top_categories,
            streaks,
            high_conviction,
            trend,
            anomalies,
            category,
            suspicion,
        }
    }

    fn trend(&self, positions: &[ResolvedPosition], reference: DateTime<Utc>) -> TrendDirection {
        let cutoff = reference - Duration::days(self.config.recent_days);
        let (recent, historical): (Vec<_>, Vec<_>) =
            positions.iter().partition(|p| p.exit_ts > cutoff);
        if recent.len() < 3 || historical.len() < 3 {
            return TrendDirection::Stable;
        }
        let rate = |set: &[&ResolvedPosition]| {
            let wins = set
                .iter()
                .filter(|p| p.outcome == PositionOutcome::Win)
                .count();
            wins as f64 / set.len() as f64 * 100.0
        };
        let delta = rate(&recent) - rate(&historical);
        if delta > self.config.trend_margin_pct {
            TrendDirection::Improving
        } else if delta < -self.config.trend_margin_pct {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        }
    }

    fn win_rate_category(&self, rate: f64) -> WinRateCategory {
        if rate >= self.config.exceptional_pct {
            WinRateCategory::Exceptional
        } else if rate >= self.config.high_pct {
            WinRateCategory::High
        } else if rate >= self.config.above_average_pct {
            WinRateCategory::AboveAverage
        } else {
            WinRateCategory::Average
        }
    }

    /// Combine tier, anomaly count, and sample size. Thin histories cap the
    /// level regardless of win rate — three lucky wins are not an insider.
    fn suspicion_level(
        &self,
        category: WinRateCategory,
        anomaly_count: usize,
        total_positions: usize,
    ) -> SuspicionLevel {
        let mut level = match category {
            WinRateCategory::Average => SuspicionLevel::None,
            WinRateCategory::AboveAverage => SuspicionLevel::Low,
            WinRateCategory::High => SuspicionLevel::High,
            WinRateCategory::Exceptional => SuspicionLevel::Critical,
        };
        if anomaly_count >= 2 {
            level = match level {
                SuspicionLevel::None => SuspicionLevel::Low,
                SuspicionLevel::Low => SuspicionLevel::High,
                _ => SuspicionLevel::Critical,
            };
        }
        if total_positions < self.config.min_positions_low {
            level = level.min(SuspicionLevel::Low);
        } else if total_positions < self.config.min_positions_full {
            level = level.min(SuspicionLevel::High);
        }
        level
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

fn window_performance(
    positions: &[ResolvedPosition],
    window: TimeWindow,
    reference: DateTime<Utc>,
) -> WindowPerformance {
    let in_window: Vec<&ResolvedPosition> = match window.days() {
        Some(days) => {
            let cutoff = reference - Duration::days(days);
            positions.iter().filter(|p| p.exit_ts > cutoff).collect()
        }
        None => positions.iter().collect(),
    };

    let mut wins = 0u32;
    let mut losses = 0u32;
    let mut total_win_profit = 0.0;
    let mut total_loss = 0.0;
    let mut net_pnl = 0.0;
    for p in &in_window {
        net_pnl += p.realized_pnl;
        match p.outcome {
            PositionOutcome::Win => {
                wins += 1;
                total_win_profit += p.realized_pnl.max(0.0);
            }
            PositionOutcome::Loss => {
                losses += 1;
                total_loss += p.realized_pnl.min(0.0).abs();
            }
        }
    }

    let total = wins + losses;
    let win_rate = if total > 0 {
        wins as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let profit_factor = if wins == 0 {
        0.0
    } else if losses == 0 || total_loss <= 0.0 {
        f64::INFINITY
    } else {
        total_win_profit / total_loss
    };

    WindowPerformance {
        wins,
        losses,
        win_rate,
        total_win_profit,
        total_loss,
        net_pnl,
        profit_factor,
    }
}

fn category_breakdown(positions: &[ResolvedPosition]) -> Vec<CategoryPerformance> {
    let mut by_category: HashMap<String, (u32, u32)> = HashMap::new();
    for p in positions {
        let entry = by_category
            .entry(normalize_key(&p.category))
            .or_insert((0, 0));
        entry.0 += 1;
        if p.outcome == PositionOutcome::Win {
            entry.1 += 1;
        }
    }
    let total = positions.len() as f64;
    let mut out: Vec<CategoryPerformance> = by_category
        .into_iter()
        .map(|(category, (trades, wins))| CategoryPerformance {
            category,
            trades,
            wins,
            win_rate: wins as f64 / trades as f64 * 100.0,
            share: trades as f64 / total,
        })
        .collect();
    out.sort_by(|a, b| b.trades.cmp(&a.trades).then(a.category.cmp(&b.category)));
    out
}

/// Single linear scan over positions ordered oldest → newest.
fn streak_summary(positions: &[ResolvedPosition]) -> StreakSummary {
    let mut longest_win = 0u32;
    let mut longest_loss = 0u32;
    let mut current_type: Option<PositionOutcome> = None;
    let mut current_len = 0u32;

    for p in positions {
        if current_type == Some(p.outcome) {
            current_len += 1;
        } else {
            current_type = Some(p.outcome);
            current_len = 1;
        }
        match p.outcome {
            PositionOutcome::Win => longest_win = longest_win.max(current_len),
            PositionOutcome::Loss => longest_loss = longest_loss.max(current_len),
        }
    }

    StreakSummary {
        longest_win_streak: longest_win,
        longest_loss_streak: longest_loss,
        current_streak_type: current_type,
        current_streak_length: current_len,
    }
}

fn high_conviction_stats(
    positions: &[ResolvedPosition],
    baseline_win_rate: f64,
) -> Option<HighConvictionStats> {
    let hc: Vec<&ResolvedPosition> = positions.iter().filter(|p| p.is_high_conviction).collect();
    if hc.is_empty() {
        return None;
    }
    let wins = hc
        .iter()
        .filter(|p| p.outcome == PositionOutcome::Win)
        .count() as u32;
    let win_rate = wins as f64 / hc.len() as f64 * 100.0;
    Some(HighConvictionStats {
        positions: hc.len() as u32,
        wins,
        win_rate,
        baseline_win_rate,
        gap: win_rate - baseline_win_rate,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn position(
        id: &str,
        wallet: &str,
        category: &str,
        outcome: PositionOutcome,
        pnl: f64,
        exit_day: i64,
    ) -> ResolvedPosition {
        ResolvedPosition {
            position_id: id.into(),
            wallet_address: wallet.into(),
            market_id: format!("mkt-{id}"),
            category: category.into(),
            outcome,
            size_usd: 1_000.0,
            realized_pnl: pnl,
            roi: pnl / 1_000.0,
            is_high_conviction: false,
            entry_ts: ts(exit_day) - Duration::days(1),
            exit_ts: ts(exit_day),
        }
    }

    fn tracker() -> WinRateTracker {
        WinRateTracker::new(WinRateConfig::default()).unwrap()
    }

    #[test]
    fn test_unknown_wallet_returns_none() {
        assert!(tracker().analyze("0xnobody").is_none());
    }

    #[test]
    fn test_all_wins_profit_factor_infinite() {
        let t = tracker();
        for i in 0..5 {
            t.add_position(position(
                &format!("p{i}"),
                "w1",
                "sports",
                PositionOutcome::Win,
                100.0,
                i,
            ));
        }
        let result = t.analyze("w1").unwrap();
        let all = &result.windows[&TimeWindow::AllTime];
        assert_eq!(all.win_rate, 100.0);
        assert_eq!(all.profit_factor, f64::INFINITY);
        assert_eq!(all.total_loss, 0.0);
    }

    #[test]
    fn test_all_losses_profit_factor_zero() {
        let t = tracker();
        for i in 0..5 {
            t.add_position(position(
                &format!("p{i}"),
                "w1",
                "sports",
                PositionOutcome::Loss,
                -100.0,
                i,
            ));
        }
        let result = t.analyze("w1").unwrap();
        let all = &result.windows[&TimeWindow::AllTime];
        assert_eq!(all.win_rate, 0.0);
        assert_eq!(all.profit_factor, 0.0);
        assert_eq!(all.total_loss, 500.0);
    }

    #[test]
    fn test_add_position_idempotent() {
        let t = tracker();
        let p = position("p1", "w1", "sports", PositionOutcome::Win, 100.0, 0);
        t.add_position(p.clone());
        let before = t.analyze("w1").unwrap();
        t.add_position(p);
        let after = t.analyze("w1").unwrap();
        assert_eq!(before.total_positions, after.total_positions);
        assert_eq!(
            before.windows[&TimeWindow::AllTime].wins,
            after.windows[&TimeWindow::AllTime].wins
        );
    }

    #[test]
    fn test_resubmission_replaces_outcome() {
        let t = tracker();
        t.add_position(position("p1", "w1", "sports", PositionOutcome::Win, 100.0, 0));
        // Correction arrives: same id, now a loss
        t.add_position(position("p1", "w1", "sports", PositionOutcome::Loss, -40.0, 0));
        let result = t.analyze("w1").unwrap();
        let all = &result.windows[&TimeWindow::AllTime];
        assert_eq!(result.total_positions, 1);
        assert_eq!(all.wins, 0);
        assert_eq!(all.losses, 1);
        assert_eq!(all.net_pnl, -40.0);
    }

    #[test]
    fn test_politics_specialist_scenario() {
        let t = tracker();
        for i in 0..9 {
            t.add_position(position(
                &format!("w{i}"),
                "w1",
                "politics",
                PositionOutcome::Win,
                200.0,
                i,
            ));
        }
        t.add_position(position("l0", "w1", "politics", PositionOutcome::Loss, -50.0, 9));

        let result = t.analyze("w1").unwrap();
        assert!(result.category >= WinRateCategory::High);
        assert_eq!(result.top_categories[0], "politics");
        assert!(result
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::CategorySpecialization));
    }

    #[test]
    fn test_perfect_timing_streak_anomaly() {
        let t = tracker();
        for i in 0..8 {
            t.add_position(position(
                &format!("p{i}"),
                "w1",
                "crypto",
                PositionOutcome::Win,
                50.0,
                i,
            ));
        }
        let result = t.analyze("w1").unwrap();
        assert_eq!(result.streaks.longest_win_streak, 8);
        assert_eq!(result.streaks.current_streak_length, 8);
        assert!(result
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::PerfectTiming));
    }

    #[test]
    fn test_thin_history_caps_suspicion() {
        let t = tracker();
        for i in 0..3 {
            t.add_position(position(
                &format!("p{i}"),
                "w1",
                "crypto",
                PositionOutcome::Win,
                50.0,
                i,
            ));
        }
        let result = t.analyze("w1").unwrap();
        assert_eq!(result.category, WinRateCategory::Exceptional);
        assert_eq!(result.suspicion, SuspicionLevel::Low);
    }

    #[test]
    fn test_high_conviction_gap_anomaly() {
        let t = tracker();
        // Baseline: 10 ordinary positions at 50% win rate
        for i in 0..10 {
            let outcome = if i % 2 == 0 {
                PositionOutcome::Win
            } else {
                PositionOutcome::Loss
            };
            let pnl = if outcome == PositionOutcome::Win { 100.0 } else { -100.0 };
            t.add_position(position(&format!("b{i}"), "w1", "sports", outcome, pnl, i));
        }
        // Six high-conviction positions, all wins
        for i in 0..6 {
            let mut p = position(&format!("h{i}"), "w1", "sports", PositionOutcome::Win, 300.0, 10 + i);
            p.is_high_conviction = true;
            t.add_position(p);
        }
        let result = t.analyze("w1").unwrap();
        let hc = result.high_conviction.unwrap();
        assert_eq!(hc.positions, 6);
        assert_eq!(hc.win_rate, 100.0);
        assert!(hc.gap > 15.0);
        assert!(result
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::HighConvictionGap));
    }

    #[test]
    fn test_trend_improving() {
        let t = tracker();
        // Historical: mostly losses, 60+ days before the newest exit
        for i in 0..6 {
            let outcome = if i == 0 {
                PositionOutcome::Win
            } else {
                PositionOutcome::Loss
            };
            t.add_position(position(&format!("old{i}"), "w1", "sports", outcome, -10.0, i));
        }
        // Recent: mostly wins
        for i in 0..6 {
            let outcome = if i == 0 {
                PositionOutcome::Loss
            } else {
                PositionOutcome::Win
            };
            t.add_position(position(&format!("new{i}"), "w1", "sports", outcome, 10.0, 70 + i));
        }
        let result = t.analyze("w1").unwrap();
        assert_eq!(result.trend, TrendDirection::Improving);
    }

    #[test]
    fn test_rolling_windows_partition_by_exit_time() {
        let t = tracker();
        // Old win beyond every rolling window
        t.add_position(position("old", "w1", "sports", PositionOutcome::Win, 100.0, 0));
        // Recent loss
        t.add_position(position("new", "w1", "sports", PositionOutcome::Loss, -50.0, 200));
        let result = t.analyze("w1").unwrap();
        assert_eq!(result.windows[&TimeWindow::AllTime].wins, 1);
        assert_eq!(result.windows[&TimeWindow::Week].wins, 0);
        assert_eq!(result.windows[&TimeWindow::Week].losses, 1);
    }

    #[test]
    fn test_bulk_queries() {
        let t = tracker();
        // Insider-looking wallet: 12 wins in one category
        for i in 0..12 {
            t.add_position(position(
                &format!("a{i}"),
                "0xInsider",
                "politics",
                PositionOutcome::Win,
                500.0,
                i,
            ));
        }
        // Ordinary wallet
        for i in 0..12 {
            let outcome = if i % 2 == 0 {
                PositionOutcome::Win
            } else {
                PositionOutcome::Loss
            };
            t.add_position(position(&format!("b{i}"), "0xNormal", "sports", outcome, 10.0, i));
        }

        assert_eq!(t.batch_analyze().len(), 2);

        let high = t.high_win_rate_wallets(90.0);
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].0, "0xinsider");

        let insiders = t.potential_insiders();
        assert_eq!(insiders.len(), 1);
        assert_eq!(insiders[0].wallet_address, "0xinsider");
    }
}
