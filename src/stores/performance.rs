use super::{
    clear_tables, create_tables, encode, next_seq, read_seq_values, store_err, SeqTable, StoreDb,
};
use crate::error::Result;
use crate::models::{
    DailyTrend, ErrorClass, OverallPerformance, PerformanceInsights, PerformanceSample,
    PerformanceTrend, StrategyPerformance, StrategyRanking,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

const HISTORY: SeqTable = SeqTable::new("performance_history");

const DEFAULT_WINDOW: usize = 10;

/// Rolling performance series per strategy; the single source of dynamic
/// confidence.
pub struct PerformanceTracker {
    db: StoreDb,
}

impl PerformanceTracker {
    pub fn open(path: &Path) -> Result<Self> {
        let db = StoreDb::open(path)?;
        let tracker = Self { db };
        tracker.init()?;
        Ok(tracker)
    }

    fn init(&self) -> Result<()> {
        self.db.run_sync(|db| create_tables(db, &[HISTORY], &[]))
    }

    /// Append a sample and return the post-sample dynamic confidence. The
    /// append and the confidence it carries commit atomically, so for a given
    /// strategy the series never races.
    pub async fn record(
        &self,
        strategy_id: &str,
        success: bool,
        resolution_time: Option<f64>,
        confidence_before: f64,
        context: HashMap<String, String>,
    ) -> Result<f64> {
        let id = strategy_id.to_string();
        let new_confidence = self
            .db
            .run(move |db| {
                let txn = db.begin_write().map_err(|e| store_err("begin write", e))?;
                let confidence = {
                    let mut history = txn
                        .open_table(HISTORY)
                        .map_err(|e| store_err("open history", e))?;

                    let now = Utc::now();
                    let mut recent = recent_samples_for(&history, &id, DEFAULT_WINDOW - 1)?;
                    recent.insert(0, (success, resolution_time, now));
                    let confidence = dynamic_confidence_over(&recent, now);

                    let sample = PerformanceSample {
                        strategy_id: id.clone(),
                        success,
                        resolution_time,
                        confidence_before,
                        confidence_after: confidence,
                        context,
                        timestamp: now,
                    };
                    let key = next_seq(&history)?;
                    history
                        .insert(key, encode(&sample)?.as_slice())
                        .map_err(|e| store_err("insert sample", e))?;

                    confidence
                };
                txn.commit().map_err(|e| store_err("commit", e))?;
                Ok(confidence)
            })
            .await?;

        debug!(
            "Recorded performance for {}: success={}, confidence={:.3}",
            strategy_id, success, new_confidence
        );
        Ok(new_confidence)
    }

    /// Dynamic confidence over the most recent `window` samples; 0.5 for an
    /// unseen strategy.
    pub async fn dynamic_confidence(&self, strategy_id: &str, window: usize) -> Result<f64> {
        let id = strategy_id.to_string();
        self.db
            .run(move |db| {
                let txn = db.begin_read().map_err(|e| store_err("begin read", e))?;
                let history = txn
                    .open_table(HISTORY)
                    .map_err(|e| store_err("open history", e))?;
                let recent = recent_samples_for(&history, &id, window)?;
                Ok(dynamic_confidence_over(&recent, Utc::now()))
            })
            .await
    }

    pub async fn samples_for(&self, strategy_id: &str) -> Result<Vec<PerformanceSample>> {
        let id = strategy_id.to_string();
        let samples: Vec<PerformanceSample> =
            self.db.run(|db| read_seq_values(db, HISTORY)).await?;
        Ok(samples
            .into_iter()
            .filter(|s| s.strategy_id == id)
            .collect())
    }

    pub async fn insights(&self, days: u32) -> Result<PerformanceInsights> {
        let samples: Vec<PerformanceSample> =
            self.db.run(|db| read_seq_values(db, HISTORY)).await?;
        let cutoff = Utc::now() - Duration::days(days as i64);
        let window: Vec<&PerformanceSample> =
            samples.iter().filter(|s| s.timestamp > cutoff).collect();

        let overall = if window.is_empty() {
            OverallPerformance::default()
        } else {
            let successes = window.iter().filter(|s| s.success).count();
            let times: Vec<f64> = window.iter().filter_map(|s| s.resolution_time).collect();
            let mut strategies: Vec<&str> =
                window.iter().map(|s| s.strategy_id.as_str()).collect();
            strategies.sort_unstable();
            strategies.dedup();

            OverallPerformance {
                success_rate: successes as f64 / window.len() as f64,
                avg_resolution_time: if times.is_empty() {
                    0.0
                } else {
                    times.iter().sum::<f64>() / times.len() as f64
                },
                total_processed: window.len() as u64,
                strategies_used: strategies.len() as u64,
            }
        };

        let mut by_strategy: HashMap<&str, Vec<&PerformanceSample>> = HashMap::new();
        for sample in &window {
            by_strategy
                .entry(sample.strategy_id.as_str())
                .or_default()
                .push(sample);
        }
        let mut top_strategies: Vec<StrategyPerformance> = by_strategy
            .iter()
            .filter(|(_, group)| group.len() >= 3)
            .map(|(id, group)| {
                let successes = group.iter().filter(|s| s.success).count();
                let times: Vec<f64> = group.iter().filter_map(|s| s.resolution_time).collect();
                StrategyPerformance {
                    strategy_id: id.to_string(),
                    success_rate: successes as f64 / group.len() as f64,
                    usage_count: group.len() as u64,
                    avg_resolution_time: if times.is_empty() {
                        0.0
                    } else {
                        times.iter().sum::<f64>() / times.len() as f64
                    },
                }
            })
            .collect();
        top_strategies.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.usage_count.cmp(&a.usage_count))
        });
        top_strategies.truncate(5);

        let mut by_day: HashMap<String, Vec<&PerformanceSample>> = HashMap::new();
        for sample in &window {
            by_day
                .entry(sample.timestamp.format("%Y-%m-%d").to_string())
                .or_default()
                .push(sample);
        }
        let mut daily_trends: Vec<DailyTrend> = by_day
            .into_iter()
            .map(|(date, group)| {
                let successes = group.iter().filter(|s| s.success).count();
                DailyTrend {
                    date,
                    success_rate: successes as f64 / group.len() as f64,
                    count: group.len() as u64,
                }
            })
            .collect();
        daily_trends.sort_by(|a, b| a.date.cmp(&b.date));

        Ok(PerformanceInsights {
            period_days: days,
            overall,
            top_strategies,
            daily_trends,
            generated_at: Utc::now(),
        })
    }

    /// Strategies ranked by dynamic confidence, then success rate, with the
    /// recent trend label.
    pub async fn ranking(&self, error_class: Option<ErrorClass>) -> Result<Vec<StrategyRanking>> {
        let samples: Vec<PerformanceSample> =
            self.db.run(|db| read_seq_values(db, HISTORY)).await?;

        let mut by_strategy: HashMap<String, Vec<&PerformanceSample>> = HashMap::new();
        for sample in &samples {
            by_strategy
                .entry(sample.strategy_id.clone())
                .or_default()
                .push(sample);
        }

        let now = Utc::now();
        let mut rankings: Vec<StrategyRanking> = by_strategy
            .into_iter()
            .filter_map(|(id, group)| {
                let class = group
                    .iter()
                    .rev()
                    .find_map(|s| s.context.get("error_type"))
                    .map(|raw| ErrorClass::parse(raw));
                if let Some(wanted) = error_class {
                    if class != Some(wanted) {
                        return None;
                    }
                }

                let successes = group.iter().filter(|s| s.success).count();
                let times: Vec<f64> = group.iter().filter_map(|s| s.resolution_time).collect();

                // Newest first for confidence and trend windows.
                let mut newest_first: Vec<&PerformanceSample> = group.clone();
                newest_first.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                let recent: Vec<(bool, Option<f64>, DateTime<Utc>)> = newest_first
                    .iter()
                    .take(DEFAULT_WINDOW)
                    .map(|s| (s.success, s.resolution_time, s.timestamp))
                    .collect();
                let recent_successes: Vec<bool> =
                    newest_first.iter().take(6).map(|s| s.success).collect();

                Some(StrategyRanking {
                    rank: 0,
                    strategy_id: id,
                    error_class: class,
                    success_rate: successes as f64 / group.len() as f64,
                    avg_resolution_time: if times.is_empty() {
                        0.0
                    } else {
                        times.iter().sum::<f64>() / times.len() as f64
                    },
                    confidence_score: dynamic_confidence_over(&recent, now),
                    usage_count: group.len() as u64,
                    last_used: newest_first.first().map(|s| s.timestamp),
                    trend: PerformanceTrend::from_recent(&recent_successes),
                })
            })
            .collect();

        rankings.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.success_rate
                        .partial_cmp(&a.success_rate)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        for (i, ranking) in rankings.iter_mut().enumerate() {
            ranking.rank = i + 1;
        }
        Ok(rankings)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.db.run(|db| clear_tables(db, &[HISTORY], &[])).await?;
        warn!("Cleared performance history");
        Ok(())
    }

    pub async fn nuclear_reset(&self) -> Result<()> {
        self.db.nuke()?;
        self.init()
    }
}

fn recent_samples_for(
    history: &impl redb::ReadableTable<u64, &'static [u8]>,
    strategy_id: &str,
    window: usize,
) -> Result<Vec<(bool, Option<f64>, DateTime<Utc>)>> {
    let mut recent = Vec::new();
    for entry in history.iter().map_err(|e| store_err("iterate", e))?.rev() {
        if recent.len() >= window {
            break;
        }
        let (_, bytes) = entry.map_err(|e| store_err("read entry", e))?;
        let sample: PerformanceSample = super::decode(bytes.value())?;
        if sample.strategy_id == strategy_id {
            recent.push((sample.success, sample.resolution_time, sample.timestamp));
        }
    }
    Ok(recent)
}

/// The authoritative confidence formula. `samples` is newest-first.
///
/// 1. No samples: neutral 0.5.
/// 2. Weighted success mean with one-week recency decay
///    (`w = max(0.1, 1 - age_hours/168)`).
/// 3. Trend factor from recent half vs older half when there are at least
///    five samples, clamped to ±0.2.
/// 4. Time factor `(60 - mean_resolution)/600`, clamped to ±0.1.
/// 5. Sum clamped into [0.05, 0.95].
fn dynamic_confidence_over(
    samples: &[(bool, Option<f64>, DateTime<Utc>)],
    now: DateTime<Utc>,
) -> f64 {
    if samples.is_empty() {
        return 0.5;
    }

    let mut weighted_success = 0.0;
    let mut total_weight = 0.0;
    for (success, _, timestamp) in samples {
        let age_hours = (now - *timestamp).num_seconds() as f64 / 3600.0;
        let weight = (1.0 - age_hours / 168.0).max(0.1);
        if *success {
            weighted_success += weight;
        }
        total_weight += weight;
    }
    let weighted_success_rate = weighted_success / total_weight;

    let trend_factor = if samples.len() >= 5 {
        let half = samples.len() / 2;
        let rate = |slice: &[(bool, Option<f64>, DateTime<Utc>)]| {
            slice.iter().filter(|(s, _, _)| *s).count() as f64 / slice.len() as f64
        };
        (rate(&samples[..half]) - rate(&samples[half..])).clamp(-0.2, 0.2)
    } else {
        0.0
    };

    let times: Vec<f64> = samples.iter().filter_map(|(_, t, _)| *t).collect();
    let time_factor = if times.is_empty() {
        0.0
    } else {
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        ((60.0 - avg) / 600.0).clamp(-0.1, 0.1)
    };

    (weighted_success_rate + trend_factor + time_factor).clamp(0.05, 0.95)
}
