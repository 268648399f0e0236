use super::{
    clear_tables, create_tables, decode, encode, next_seq, read_seq_values, store_err, KeyTable,
    SeqTable, StoreDb,
};
use crate::error::{KubemendError, Result};
use crate::models::{
    ChangeType, ErrorClass, EvolutionEntry, Strategy, StrategyModifications, UsageRecord,
};
use chrono::{Duration, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

const STRATEGIES: KeyTable = KeyTable::new("strategies");
const USAGE: SeqTable = SeqTable::new("strategy_usage");
const EVOLUTION: SeqTable = SeqTable::new("strategy_evolution");

/// Persistent mapping from error class and context to ranked strategies,
/// with usage statistics and a complete evolution audit trail.
pub struct StrategyStore {
    db: StoreDb,
}

/// Outcome of one strategy application, with the tracker-derived confidence
/// threaded through so both stores agree within the episode boundary.
#[derive(Clone, Debug)]
pub struct OutcomeUpdate {
    pub strategy_id: String,
    pub success: bool,
    pub execution_time: f64,
    pub pod_name: String,
    pub namespace: String,
    pub feedback: Option<String>,
    pub new_confidence: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StrategyStatistics {
    pub total_strategies: u64,
    pub success_by_class: HashMap<String, f64>,
    pub top_by_usage: Vec<TopStrategy>,
    pub usage_last_24h: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopStrategy {
    pub id: String,
    pub error_class: ErrorClass,
    pub usage_count: u64,
    pub success_rate: f64,
}

impl StrategyStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = StoreDb::open(path)?;
        let store = Self { db };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.db
            .run_sync(|db| create_tables(db, &[USAGE, EVOLUTION], &[STRATEGIES]))
    }

    pub async fn add(&self, strategy: Strategy) -> Result<()> {
        let id = strategy.id.clone();
        self.db
            .run(move |db| {
                let txn = db.begin_write().map_err(|e| store_err("begin write", e))?;
                {
                    let mut strategies = txn
                        .open_table(STRATEGIES)
                        .map_err(|e| store_err("open strategies", e))?;

                    let exists = strategies
                        .get(strategy.id.as_str())
                        .map_err(|e| store_err("read strategy", e))?
                        .is_some();
                    if exists {
                        return Err(KubemendError::Conflict(strategy.id.clone()));
                    }

                    strategies
                        .insert(strategy.id.as_str(), encode(&strategy)?.as_slice())
                        .map_err(|e| store_err("insert strategy", e))?;

                    let mut evolution = txn
                        .open_table(EVOLUTION)
                        .map_err(|e| store_err("open evolution", e))?;
                    let entry = EvolutionEntry {
                        strategy_id: strategy.id.clone(),
                        version: strategy.version,
                        change_type: ChangeType::Created,
                        change_description: "Initial strategy creation".to_string(),
                        old_confidence: None,
                        new_confidence: strategy.confidence,
                        trigger_event: format!("{:?}", strategy.source).to_lowercase(),
                        timestamp: Utc::now(),
                    };
                    let key = next_seq(&evolution)?;
                    evolution
                        .insert(key, encode(&entry)?.as_slice())
                        .map_err(|e| store_err("insert evolution", e))?;
                }
                txn.commit().map_err(|e| store_err("commit", e))?;
                Ok(())
            })
            .await?;

        info!("Added strategy {}", id);
        Ok(())
    }

    pub async fn get(&self, strategy_id: &str) -> Result<Option<Strategy>> {
        let id = strategy_id.to_string();
        self.db
            .run(move |db| {
                let txn = db.begin_read().map_err(|e| store_err("begin read", e))?;
                let strategies = txn
                    .open_table(STRATEGIES)
                    .map_err(|e| store_err("open strategies", e))?;
                match strategies
                    .get(id.as_str())
                    .map_err(|e| store_err("read strategy", e))?
                {
                    Some(bytes) => Ok(Some(decode(bytes.value())?)),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Strategies applicable to an error class under the given context,
    /// sorted by confidence, then success rate, then usage, then age.
    pub async fn find_for(
        &self,
        error_class: ErrorClass,
        context: &HashMap<String, String>,
    ) -> Result<Vec<Strategy>> {
        let context = context.clone();
        let mut matches = self
            .db
            .run(move |db| {
                let txn = db.begin_read().map_err(|e| store_err("begin read", e))?;
                let strategies = txn
                    .open_table(STRATEGIES)
                    .map_err(|e| store_err("open strategies", e))?;

                let mut found = Vec::new();
                for entry in strategies.iter().map_err(|e| store_err("iterate", e))? {
                    let (_, bytes) = entry.map_err(|e| store_err("read entry", e))?;
                    let strategy: Strategy = decode(bytes.value())?;
                    if strategy.error_class == error_class && strategy.matches_context(&context) {
                        found.push(strategy);
                    }
                }
                Ok(found)
            })
            .await?;

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.success_rate
                        .partial_cmp(&a.success_rate)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(b.usage_count.cmp(&a.usage_count))
                .then(a.created_at.cmp(&b.created_at))
        });

        debug!(
            "Found {} strategies for {}",
            matches.len(),
            error_class
        );
        Ok(matches)
    }

    pub async fn all(&self) -> Result<Vec<Strategy>> {
        self.db
            .run(|db| {
                let txn = db.begin_read().map_err(|e| store_err("begin read", e))?;
                let strategies = txn
                    .open_table(STRATEGIES)
                    .map_err(|e| store_err("open strategies", e))?;
                let mut found = Vec::new();
                for entry in strategies.iter().map_err(|e| store_err("iterate", e))? {
                    let (_, bytes) = entry.map_err(|e| store_err("read entry", e))?;
                    found.push(decode(bytes.value())?);
                }
                Ok(found)
            })
            .await
    }

    /// Record one application outcome: appends the usage record, bumps the
    /// usage count, recomputes the success rate as the mean over every usage
    /// record for this id, installs the tracker confidence and logs a
    /// `performance_update` evolution entry. Serialised per store by redb's
    /// single writer.
    pub async fn record_outcome(&self, update: OutcomeUpdate) -> Result<Strategy> {
        let updated = self
            .db
            .run(move |db| {
                let txn = db.begin_write().map_err(|e| store_err("begin write", e))?;
                let updated = {
                    let mut strategies = txn
                        .open_table(STRATEGIES)
                        .map_err(|e| store_err("open strategies", e))?;

                    let mut strategy: Strategy = match strategies
                        .get(update.strategy_id.as_str())
                        .map_err(|e| store_err("read strategy", e))?
                    {
                        Some(bytes) => decode(bytes.value())?,
                        None => return Err(KubemendError::NotFound(update.strategy_id.clone())),
                    };

                    let mut usage = txn
                        .open_table(USAGE)
                        .map_err(|e| store_err("open usage", e))?;
                    let record = UsageRecord {
                        strategy_id: update.strategy_id.clone(),
                        pod_name: update.pod_name.clone(),
                        namespace: update.namespace.clone(),
                        success: update.success,
                        execution_time: update.execution_time,
                        feedback: update.feedback.clone(),
                        timestamp: Utc::now(),
                    };
                    let key = next_seq(&usage)?;
                    usage
                        .insert(key, encode(&record)?.as_slice())
                        .map_err(|e| store_err("insert usage", e))?;

                    let mut successes = 0u64;
                    let mut total = 0u64;
                    for entry in usage.iter().map_err(|e| store_err("iterate usage", e))? {
                        let (_, bytes) = entry.map_err(|e| store_err("read usage", e))?;
                        let row: UsageRecord = decode(bytes.value())?;
                        if row.strategy_id == update.strategy_id {
                            total += 1;
                            if row.success {
                                successes += 1;
                            }
                        }
                    }

                    let old_confidence = strategy.confidence;
                    let now = Utc::now();
                    strategy.usage_count += 1;
                    strategy.success_rate = if total > 0 {
                        successes as f64 / total as f64
                    } else {
                        0.0
                    };
                    strategy.confidence = update.new_confidence.clamp(0.05, 0.95);
                    strategy.updated_at = now;
                    strategy.last_used = Some(now);

                    strategies
                        .insert(update.strategy_id.as_str(), encode(&strategy)?.as_slice())
                        .map_err(|e| store_err("update strategy", e))?;

                    let mut evolution = txn
                        .open_table(EVOLUTION)
                        .map_err(|e| store_err("open evolution", e))?;
                    let entry = EvolutionEntry {
                        strategy_id: update.strategy_id.clone(),
                        version: strategy.version,
                        change_type: ChangeType::PerformanceUpdate,
                        change_description: "Updated based on usage outcome".to_string(),
                        old_confidence: Some(old_confidence),
                        new_confidence: strategy.confidence,
                        trigger_event: format!(
                            "outcome:{}/{}",
                            update.namespace, update.pod_name
                        ),
                        timestamp: now,
                    };
                    let key = next_seq(&evolution)?;
                    evolution
                        .insert(key, encode(&entry)?.as_slice())
                        .map_err(|e| store_err("insert evolution", e))?;

                    strategy
                };
                txn.commit().map_err(|e| store_err("commit", e))?;
                Ok(updated)
            })
            .await?;

        info!(
            "Recorded outcome for strategy {}: success_rate={:.2}, confidence={:.2}",
            updated.id, updated.success_rate, updated.confidence
        );
        Ok(updated)
    }

    /// Merge learner modifications into an existing strategy: numeric
    /// parameters replace, conditions extend, the parameter map merges.
    pub async fn apply_modifications(
        &self,
        strategy_id: &str,
        mods: StrategyModifications,
        trigger_event: &str,
    ) -> Result<Strategy> {
        let id = strategy_id.to_string();
        let trigger = trigger_event.to_string();
        self.db
            .run(move |db| {
                let txn = db.begin_write().map_err(|e| store_err("begin write", e))?;
                let updated = {
                    let mut strategies = txn
                        .open_table(STRATEGIES)
                        .map_err(|e| store_err("open strategies", e))?;

                    let mut strategy: Strategy = match strategies
                        .get(id.as_str())
                        .map_err(|e| store_err("read strategy", e))?
                    {
                        Some(bytes) => decode(bytes.value())?,
                        None => return Err(KubemendError::NotFound(id.clone())),
                    };

                    let old_confidence = strategy.confidence;
                    apply_mods(&mut strategy, &mods);
                    strategy.version += 1;
                    strategy.updated_at = Utc::now();

                    strategies
                        .insert(id.as_str(), encode(&strategy)?.as_slice())
                        .map_err(|e| store_err("update strategy", e))?;

                    let mut evolution = txn
                        .open_table(EVOLUTION)
                        .map_err(|e| store_err("open evolution", e))?;
                    let entry = EvolutionEntry {
                        strategy_id: id.clone(),
                        version: strategy.version,
                        change_type: ChangeType::Modified,
                        change_description: mods.summary(),
                        old_confidence: Some(old_confidence),
                        new_confidence: strategy.confidence,
                        trigger_event: trigger.clone(),
                        timestamp: Utc::now(),
                    };
                    let key = next_seq(&evolution)?;
                    evolution
                        .insert(key, encode(&entry)?.as_slice())
                        .map_err(|e| store_err("insert evolution", e))?;

                    strategy
                };
                txn.commit().map_err(|e| store_err("commit", e))?;
                Ok(updated)
            })
            .await
    }

    /// Learner-driven confidence refresh from recent attempts; logged as a
    /// modification so the audit trail stays complete.
    pub async fn update_confidence(
        &self,
        strategy_id: &str,
        new_confidence: f64,
        trigger_event: &str,
    ) -> Result<()> {
        let id = strategy_id.to_string();
        let trigger = trigger_event.to_string();
        self.db
            .run(move |db| {
                let txn = db.begin_write().map_err(|e| store_err("begin write", e))?;
                {
                    let mut strategies = txn
                        .open_table(STRATEGIES)
                        .map_err(|e| store_err("open strategies", e))?;

                    let mut strategy: Strategy = match strategies
                        .get(id.as_str())
                        .map_err(|e| store_err("read strategy", e))?
                    {
                        Some(bytes) => decode(bytes.value())?,
                        None => return Err(KubemendError::NotFound(id.clone())),
                    };

                    let old_confidence = strategy.confidence;
                    strategy.confidence = new_confidence.clamp(0.05, 0.95);
                    strategy.updated_at = Utc::now();

                    strategies
                        .insert(id.as_str(), encode(&strategy)?.as_slice())
                        .map_err(|e| store_err("update strategy", e))?;

                    let mut evolution = txn
                        .open_table(EVOLUTION)
                        .map_err(|e| store_err("open evolution", e))?;
                    let entry = EvolutionEntry {
                        strategy_id: id.clone(),
                        version: strategy.version,
                        change_type: ChangeType::Modified,
                        change_description: "Confidence recomputed from recent attempts"
                            .to_string(),
                        old_confidence: Some(old_confidence),
                        new_confidence: strategy.confidence,
                        trigger_event: trigger.clone(),
                        timestamp: Utc::now(),
                    };
                    let key = next_seq(&evolution)?;
                    evolution
                        .insert(key, encode(&entry)?.as_slice())
                        .map_err(|e| store_err("insert evolution", e))?;
                }
                txn.commit().map_err(|e| store_err("commit", e))?;
                Ok(())
            })
            .await
    }

    pub async fn evolution_for(&self, strategy_id: &str) -> Result<Vec<EvolutionEntry>> {
        let id = strategy_id.to_string();
        let entries: Vec<EvolutionEntry> =
            self.db.run(move |db| read_seq_values(db, EVOLUTION)).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.strategy_id == id)
            .collect())
    }

    pub async fn usage_for(&self, strategy_id: &str) -> Result<Vec<UsageRecord>> {
        let id = strategy_id.to_string();
        let records: Vec<UsageRecord> =
            self.db.run(move |db| read_seq_values(db, USAGE)).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.strategy_id == id)
            .collect())
    }

    pub async fn statistics(&self) -> Result<StrategyStatistics> {
        let strategies = self.all().await?;
        let usage: Vec<UsageRecord> = self.db.run(move |db| read_seq_values(db, USAGE)).await?;

        let mut by_class: HashMap<String, Vec<f64>> = HashMap::new();
        for strategy in &strategies {
            by_class
                .entry(strategy.error_class.to_string())
                .or_default()
                .push(strategy.success_rate);
        }
        let success_by_class = by_class
            .into_iter()
            .map(|(class, rates)| {
                let avg = rates.iter().sum::<f64>() / rates.len() as f64;
                (class, avg)
            })
            .collect();

        let mut top: Vec<&Strategy> = strategies.iter().collect();
        top.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        let top_by_usage = top
            .into_iter()
            .take(5)
            .map(|s| TopStrategy {
                id: s.id.clone(),
                error_class: s.error_class,
                usage_count: s.usage_count,
                success_rate: s.success_rate,
            })
            .collect();

        let cutoff = Utc::now() - Duration::hours(24);
        let usage_last_24h = usage.iter().filter(|r| r.timestamp > cutoff).count() as u64;

        Ok(StrategyStatistics {
            total_strategies: strategies.len() as u64,
            success_by_class,
            top_by_usage,
            usage_last_24h,
        })
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.db
            .run(|db| clear_tables(db, &[USAGE, EVOLUTION], &[STRATEGIES]))
            .await?;
        warn!("Cleared all strategies");
        Ok(())
    }

    pub async fn nuclear_reset(&self) -> Result<()> {
        self.db.nuke()?;
        self.init()
    }
}

fn apply_mods(strategy: &mut Strategy, mods: &StrategyModifications) {
    let mut params = strategy.actions.as_object().cloned().unwrap_or_default();

    if let Some(timeout) = mods.timeout {
        params.insert("timeout".to_string(), serde_json::json!(timeout));
    }
    if let Some(retries) = mods.retry_count {
        params.insert("retry_count".to_string(), serde_json::json!(retries));
    }
    if let Some(threshold) = mods.confidence_threshold {
        params.insert(
            "confidence_threshold".to_string(),
            serde_json::json!(threshold),
        );
    }
    for (key, value) in &mods.parameters {
        params.insert(key.clone(), value.clone());
    }
    strategy.actions = serde_json::Value::Object(params);

    for condition in &mods.conditions {
        if !strategy.conditions.contains(condition) {
            strategy.conditions.push(condition.clone());
        }
    }

    if let Some(description) = &mods.description {
        strategy
            .context
            .insert("description".to_string(), description.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StrategySource;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> StrategyStore {
        StrategyStore::open(&dir.path().join("strategies.redb")).unwrap()
    }

    fn strategy(id: &str, class: ErrorClass) -> Strategy {
        Strategy::new(id, class, StrategySource::Learned)
    }

    fn outcome(id: &str, success: bool, confidence: f64) -> OutcomeUpdate {
        OutcomeUpdate {
            strategy_id: id.to_string(),
            success,
            execution_time: 12.0,
            pod_name: "nginx-test".to_string(),
            namespace: "default".to_string(),
            feedback: None,
            new_confidence: confidence,
        }
    }

    #[tokio::test]
    async fn test_add_then_duplicate_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .add(strategy("s1", ErrorClass::ImagePullBackOff))
            .await
            .unwrap();
        let err = store
            .add(strategy("s1", ErrorClass::ImagePullBackOff))
            .await
            .unwrap_err();
        assert!(matches!(err, KubemendError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_find_for_filters_class_and_conditions() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .add(
                strategy("prod-only", ErrorClass::OomKilled)
                    .with_conditions(vec!["namespace == 'prod'".to_string()]),
            )
            .await
            .unwrap();
        store
            .add(strategy("unconditional", ErrorClass::OomKilled))
            .await
            .unwrap();
        store
            .add(strategy("other-class", ErrorClass::CrashLoopBackOff))
            .await
            .unwrap();

        let mut ctx = HashMap::new();
        ctx.insert("namespace".to_string(), "default".to_string());

        let found = store.find_for(ErrorClass::OomKilled, &ctx).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "unconditional");

        ctx.insert("namespace".to_string(), "prod".to_string());
        let found = store.find_for(ErrorClass::OomKilled, &ctx).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_find_for_orders_by_confidence_then_success() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .add(strategy("low", ErrorClass::OomKilled).with_confidence(0.3))
            .await
            .unwrap();
        store
            .add(strategy("high", ErrorClass::OomKilled).with_confidence(0.9))
            .await
            .unwrap();

        let found = store
            .find_for(ErrorClass::OomKilled, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(found[0].id, "high");
        assert_eq!(found[1].id, "low");
    }

    #[tokio::test]
    async fn test_record_outcome_updates_stats_and_audit_trail() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .add(strategy("s1", ErrorClass::ImagePullBackOff))
            .await
            .unwrap();

        let updated = store.record_outcome(outcome("s1", true, 0.62)).await.unwrap();
        assert_eq!(updated.usage_count, 1);
        assert!((updated.success_rate - 1.0).abs() < f64::EPSILON);
        assert!((updated.confidence - 0.62).abs() < f64::EPSILON);
        assert!(updated.last_used.is_some());

        let updated = store.record_outcome(outcome("s1", false, 0.5)).await.unwrap();
        assert_eq!(updated.usage_count, 2);
        assert!((updated.success_rate - 0.5).abs() < f64::EPSILON);

        let evolution = store.evolution_for("s1").await.unwrap();
        assert_eq!(evolution.len(), 3);
        assert_eq!(evolution[0].change_type, ChangeType::Created);
        assert_eq!(evolution[1].change_type, ChangeType::PerformanceUpdate);
        assert_eq!(evolution[2].change_type, ChangeType::PerformanceUpdate);
    }

    #[tokio::test]
    async fn test_usage_count_monotone_under_failures() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .add(strategy("s1", ErrorClass::CrashLoopBackOff))
            .await
            .unwrap();

        let mut previous = 0;
        for i in 0..5 {
            let updated = store
                .record_outcome(outcome("s1", i % 2 == 0, 0.5))
                .await
                .unwrap();
            assert!(updated.usage_count > previous);
            previous = updated.usage_count;
        }
    }

    #[tokio::test]
    async fn test_apply_modifications_extends_conditions_and_bumps_version() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .add(strategy("s1", ErrorClass::OomKilled))
            .await
            .unwrap();

        let mods = StrategyModifications {
            timeout: Some(45.0),
            conditions: vec!["namespace == 'prod'".to_string()],
            ..Default::default()
        };
        let updated = store
            .apply_modifications("s1", mods, "reflection_insight")
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.conditions.len(), 1);
        assert_eq!(
            updated.actions.get("timeout").and_then(|v| v.as_f64()),
            Some(45.0)
        );
    }

    #[tokio::test]
    async fn test_clear_all_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .add(strategy("s1", ErrorClass::OomKilled))
            .await
            .unwrap();

        store.clear_all().await.unwrap();
        let first = store.statistics().await.unwrap();
        store.clear_all().await.unwrap();
        let second = store.statistics().await.unwrap();

        assert_eq!(first.total_strategies, 0);
        assert_eq!(second.total_strategies, 0);
        assert_eq!(first.usage_last_24h, second.usage_last_24h);
    }

    #[tokio::test]
    async fn test_nuclear_reset_reinitialises() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .add(strategy("s1", ErrorClass::OomKilled))
            .await
            .unwrap();

        store.nuclear_reset().await.unwrap();
        assert_eq!(store.statistics().await.unwrap().total_strategies, 0);

        // Store is usable again after the reset.
        store
            .add(strategy("s2", ErrorClass::OomKilled))
            .await
            .unwrap();
        assert_eq!(store.statistics().await.unwrap().total_strategies, 1);
    }
}
