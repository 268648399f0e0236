use super::{
    clear_tables, create_tables, decode, encode, next_seq, read_seq_values, store_err, KeyTable,
    SeqTable, StoreDb,
};
use crate::error::Result;
use crate::models::{
    AssociationType, DailyProgression, Episode, ErrorClass, ErrorClassStats, LearningProgression,
    MemoryAssociation, MemoryPattern, MemoryStatistics, PatternType,
};
use chrono::{Duration, Timelike, Utc};
use redb::ReadableTable;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

const EPISODES: SeqTable = SeqTable::new("episodes");
const PATTERNS: KeyTable = KeyTable::new("memory_patterns");
const ASSOCIATIONS: SeqTable = SeqTable::new("memory_associations");

/// How many similar prior episodes a new episode is linked against.
const ASSOCIATION_CANDIDATES: usize = 5;
/// Minimum context similarity for an association.
const ASSOCIATION_THRESHOLD: f64 = 0.5;

/// Append-only log of remediation episodes with similarity retrieval and
/// derived patterns.
pub struct EpisodicMemory {
    db: StoreDb,
}

impl EpisodicMemory {
    pub fn open(path: &Path) -> Result<Self> {
        let db = StoreDb::open(path)?;
        let memory = Self { db };
        memory.init()?;
        Ok(memory)
    }

    fn init(&self) -> Result<()> {
        self.db
            .run_sync(|db| create_tables(db, &[EPISODES, ASSOCIATIONS], &[PATTERNS]))
    }

    /// Append an episode, upsert its temporal pattern and link it to the
    /// most similar prior episodes of the same class.
    pub async fn store(&self, episode: Episode) -> Result<()> {
        let id = episode.id.clone();
        self.db
            .run(move |db| {
                let txn = db.begin_write().map_err(|e| store_err("begin write", e))?;
                {
                    let mut episodes = txn
                        .open_table(EPISODES)
                        .map_err(|e| store_err("open episodes", e))?;

                    // Prior same-class episodes, for association building.
                    let mut prior: Vec<Episode> = Vec::new();
                    for entry in episodes.iter().map_err(|e| store_err("iterate", e))? {
                        let (_, bytes) = entry.map_err(|e| store_err("read entry", e))?;
                        let existing: Episode = decode(bytes.value())?;
                        if existing.error_class == episode.error_class {
                            prior.push(existing);
                        }
                    }

                    let key = next_seq(&episodes)?;
                    episodes
                        .insert(key, encode(&episode)?.as_slice())
                        .map_err(|e| store_err("insert episode", e))?;

                    upsert_temporal_pattern(&txn, &episode)?;

                    prior.sort_by(|a, b| {
                        let sim_a = Episode::context_similarity(&episode.context, &a.context);
                        let sim_b = Episode::context_similarity(&episode.context, &b.context);
                        sim_b
                            .partial_cmp(&sim_a)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then(b.timestamp.cmp(&a.timestamp))
                    });

                    let mut associations = txn
                        .open_table(ASSOCIATIONS)
                        .map_err(|e| store_err("open associations", e))?;
                    for similar in prior.iter().take(ASSOCIATION_CANDIDATES) {
                        let strength =
                            Episode::context_similarity(&episode.context, &similar.context);
                        if strength > ASSOCIATION_THRESHOLD && similar.id != episode.id {
                            let association = MemoryAssociation {
                                episode_a: episode.id.clone(),
                                episode_b: similar.id.clone(),
                                association_type: AssociationType::SimilarContext,
                                strength,
                                created_at: Utc::now(),
                            };
                            let key = next_seq(&associations)?;
                            associations
                                .insert(key, encode(&association)?.as_slice())
                                .map_err(|e| store_err("insert association", e))?;
                        }
                    }
                }
                txn.commit().map_err(|e| store_err("commit", e))?;
                Ok(())
            })
            .await?;

        info!("Stored episode {}", id);
        Ok(())
    }

    /// Episodes of the same error class ranked by context similarity, most
    /// similar first, recency as the tie-break. Retrieval is class-inclusive
    /// so learning always has material for a seen class.
    pub async fn similar(
        &self,
        error_class: ErrorClass,
        context: &HashMap<String, String>,
        limit: usize,
    ) -> Result<Vec<Episode>> {
        let context = context.clone();
        let mut matches: Vec<(Episode, f64)> = self
            .db
            .run(move |db| {
                let episodes: Vec<Episode> = read_seq_values(db, EPISODES)?;
                Ok(episodes
                    .into_iter()
                    .filter(|e| e.error_class == error_class)
                    .map(|e| {
                        let similarity = Episode::context_similarity(&context, &e.context);
                        (e, similarity)
                    })
                    .collect())
            })
            .await?;

        matches.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.0.timestamp.cmp(&a.0.timestamp))
        });

        debug!(
            "Found {} candidate episodes for {}",
            matches.len(),
            error_class
        );
        Ok(matches.into_iter().take(limit).map(|(e, _)| e).collect())
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<Episode>> {
        self.db
            .run(move |db| {
                let txn = db.begin_read().map_err(|e| store_err("begin read", e))?;
                let table = txn
                    .open_table(EPISODES)
                    .map_err(|e| store_err("open episodes", e))?;

                let mut episodes = Vec::new();
                for entry in table
                    .iter()
                    .map_err(|e| store_err("iterate", e))?
                    .rev()
                    .take(limit)
                {
                    let (_, bytes) = entry.map_err(|e| store_err("read entry", e))?;
                    episodes.push(decode(bytes.value())?);
                }
                Ok(episodes)
            })
            .await
    }

    pub async fn all(&self) -> Result<Vec<Episode>> {
        self.db.run(|db| read_seq_values(db, EPISODES)).await
    }

    pub async fn patterns(&self) -> Result<Vec<MemoryPattern>> {
        self.db
            .run(|db| {
                let txn = db.begin_read().map_err(|e| store_err("begin read", e))?;
                let table = txn
                    .open_table(PATTERNS)
                    .map_err(|e| store_err("open patterns", e))?;
                let mut patterns = Vec::new();
                for entry in table.iter().map_err(|e| store_err("iterate", e))? {
                    let (_, bytes) = entry.map_err(|e| store_err("read entry", e))?;
                    patterns.push(decode(bytes.value())?);
                }
                Ok(patterns)
            })
            .await
    }

    /// Record a learner-detected pattern, merging with an existing pattern of
    /// the same key when present.
    pub async fn record_pattern(
        &self,
        pattern_type: PatternType,
        key: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let key = format!("{:?}:{}", pattern_type, key).to_lowercase();
        self.db
            .run(move |db| {
                let txn = db.begin_write().map_err(|e| store_err("begin write", e))?;
                {
                    let mut patterns = txn
                        .open_table(PATTERNS)
                        .map_err(|e| store_err("open patterns", e))?;
                    let updated = match patterns
                        .get(key.as_str())
                        .map_err(|e| store_err("read pattern", e))?
                    {
                        Some(bytes) => {
                            let mut existing: MemoryPattern = decode(bytes.value())?;
                            existing.strength += 1.0;
                            existing.frequency += 1;
                            existing.last_seen = Utc::now();
                            existing.pattern_data = data;
                            existing
                        }
                        None => MemoryPattern {
                            pattern_type,
                            pattern_data: data,
                            strength: 1.0,
                            frequency: 1,
                            first_seen: Utc::now(),
                            last_seen: Utc::now(),
                        },
                    };
                    patterns
                        .insert(key.as_str(), encode(&updated)?.as_slice())
                        .map_err(|e| store_err("upsert pattern", e))?;
                }
                txn.commit().map_err(|e| store_err("commit", e))?;
                Ok(())
            })
            .await
    }

    pub async fn progression(&self, days: u32) -> Result<LearningProgression> {
        let episodes = self.all().await?;
        let cutoff = Utc::now() - Duration::days(days as i64);

        let mut by_day: HashMap<String, Vec<&Episode>> = HashMap::new();
        let mut by_class: HashMap<ErrorClass, Vec<&Episode>> = HashMap::new();
        for episode in episodes.iter().filter(|e| e.timestamp > cutoff) {
            by_day
                .entry(episode.timestamp.format("%Y-%m-%d").to_string())
                .or_default()
                .push(episode);
            by_class.entry(episode.error_class).or_default().push(episode);
        }

        let mut daily_progression: Vec<DailyProgression> = by_day
            .into_iter()
            .map(|(date, day_episodes)| {
                let count = day_episodes.len() as f64;
                DailyProgression {
                    date,
                    confidence_gain: day_episodes
                        .iter()
                        .map(|e| e.confidence_after - e.confidence_before)
                        .sum::<f64>()
                        / count,
                    reflection_quality: day_episodes
                        .iter()
                        .map(|e| e.reflection_quality)
                        .sum::<f64>()
                        / count,
                    avg_insights: day_episodes
                        .iter()
                        .map(|e| e.insights_generated as f64)
                        .sum::<f64>()
                        / count,
                    episode_count: day_episodes.len() as u64,
                }
            })
            .collect();
        daily_progression.sort_by(|a, b| a.date.cmp(&b.date));

        let per_class_stats = by_class
            .into_iter()
            .map(|(error_class, class_episodes)| {
                let count = class_episodes.len() as f64;
                ErrorClassStats {
                    error_class,
                    count: class_episodes.len() as u64,
                    avg_improvement: class_episodes
                        .iter()
                        .map(|e| e.confidence_after - e.confidence_before)
                        .sum::<f64>()
                        / count,
                    avg_resolution_time: class_episodes
                        .iter()
                        .map(|e| e.resolution_time)
                        .sum::<f64>()
                        / count,
                }
            })
            .collect();

        Ok(LearningProgression {
            daily_progression,
            per_class_stats,
            analysis_period_days: days,
        })
    }

    pub async fn statistics(&self) -> Result<MemoryStatistics> {
        let episodes = self.all().await?;
        let patterns = self.patterns().await?;
        let associations: Vec<MemoryAssociation> =
            self.db.run(|db| read_seq_values(db, ASSOCIATIONS)).await?;

        if episodes.is_empty() {
            return Ok(MemoryStatistics {
                patterns_discovered: patterns.len() as u64,
                associations_formed: associations.len() as u64,
                ..Default::default()
            });
        }

        let count = episodes.len() as f64;
        Ok(MemoryStatistics {
            total_episodes: episodes.len() as u64,
            avg_reflection_quality: episodes.iter().map(|e| e.reflection_quality).sum::<f64>()
                / count,
            avg_insights_generated: episodes
                .iter()
                .map(|e| e.insights_generated as f64)
                .sum::<f64>()
                / count,
            avg_confidence_gain: episodes
                .iter()
                .map(|e| e.confidence_after - e.confidence_before)
                .sum::<f64>()
                / count,
            avg_resolution_time: episodes.iter().map(|e| e.resolution_time).sum::<f64>() / count,
            patterns_discovered: patterns.len() as u64,
            associations_formed: associations.len() as u64,
        })
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.db
            .run(|db| clear_tables(db, &[EPISODES, ASSOCIATIONS], &[PATTERNS]))
            .await?;
        warn!("Cleared all episodes");
        Ok(())
    }

    pub async fn nuclear_reset(&self) -> Result<()> {
        self.db.nuke()?;
        self.init()
    }
}

fn upsert_temporal_pattern(txn: &redb::WriteTransaction, episode: &Episode) -> Result<()> {
    let mut patterns = txn
        .open_table(PATTERNS)
        .map_err(|e| store_err("open patterns", e))?;

    let hour = episode.timestamp.hour();
    let key = format!("temporal:{}:{}", hour, episode.error_class);
    let data = serde_json::json!({
        "hour": hour,
        "error_type": episode.error_class.to_string(),
    });

    let updated = match patterns
        .get(key.as_str())
        .map_err(|e| store_err("read pattern", e))?
    {
        Some(bytes) => {
            let mut existing: MemoryPattern = decode(bytes.value())?;
            existing.strength += 1.0;
            existing.frequency += 1;
            existing.last_seen = Utc::now();
            existing
        }
        None => MemoryPattern {
            pattern_type: PatternType::Temporal,
            pattern_data: data,
            strength: 1.0,
            frequency: 1,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
        },
    };

    patterns
        .insert(key.as_str(), encode(&updated)?.as_slice())
        .map_err(|e| store_err("upsert pattern", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_memory(dir: &TempDir) -> EpisodicMemory {
        EpisodicMemory::open(&dir.path().join("episodes.redb")).unwrap()
    }

    fn context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn episode(pod: &str, namespace: &str, class: ErrorClass) -> Episode {
        let ctx = context(&[
            ("pod_name", pod),
            ("namespace", namespace),
            ("error_type", class.as_str()),
        ]);
        let mut ep = Episode::new(pod, namespace, class, ctx);
        ep.lessons_learned = vec![format!("lesson from {}", pod)];
        ep
    }

    #[tokio::test]
    async fn test_similar_only_returns_same_class() {
        let dir = TempDir::new().unwrap();
        let memory = open_memory(&dir);

        memory
            .store(episode("a", "default", ErrorClass::ImagePullBackOff))
            .await
            .unwrap();
        memory
            .store(episode("b", "default", ErrorClass::OomKilled))
            .await
            .unwrap();

        let found = memory
            .similar(ErrorClass::ImagePullBackOff, &HashMap::new(), 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pod_name, "a");
    }

    #[tokio::test]
    async fn test_similar_is_class_inclusive_even_with_zero_similarity() {
        let dir = TempDir::new().unwrap();
        let memory = open_memory(&dir);

        memory
            .store(episode("a", "default", ErrorClass::OomKilled))
            .await
            .unwrap();

        let found = memory
            .similar(
                ErrorClass::OomKilled,
                &context(&[("unrelated", "key")]),
                10,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_similar_ranks_closer_context_first() {
        let dir = TempDir::new().unwrap();
        let memory = open_memory(&dir);

        memory
            .store(episode("far", "staging", ErrorClass::OomKilled))
            .await
            .unwrap();
        memory
            .store(episode("near", "default", ErrorClass::OomKilled))
            .await
            .unwrap();

        let query = context(&[
            ("pod_name", "near"),
            ("namespace", "default"),
            ("error_type", "OOMKilled"),
        ]);
        let found = memory
            .similar(ErrorClass::OomKilled, &query, 10)
            .await
            .unwrap();
        assert_eq!(found[0].pod_name, "near");
    }

    #[tokio::test]
    async fn test_store_creates_associations_above_threshold() {
        let dir = TempDir::new().unwrap();
        let memory = open_memory(&dir);

        // Same namespace and class: similarity 2/3 > 0.5.
        memory
            .store(episode("web-1", "default", ErrorClass::CrashLoopBackOff))
            .await
            .unwrap();
        memory
            .store(episode("web-2", "default", ErrorClass::CrashLoopBackOff))
            .await
            .unwrap();

        let stats = memory.statistics().await.unwrap();
        assert_eq!(stats.total_episodes, 2);
        assert_eq!(stats.associations_formed, 1);
    }

    #[tokio::test]
    async fn test_temporal_pattern_upserted_per_store() {
        let dir = TempDir::new().unwrap();
        let memory = open_memory(&dir);

        memory
            .store(episode("a", "default", ErrorClass::OomKilled))
            .await
            .unwrap();
        memory
            .store(episode("b", "default", ErrorClass::OomKilled))
            .await
            .unwrap();

        let patterns = memory.patterns().await.unwrap();
        // Both episodes land in the same hour bucket.
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, 2);
        assert!((patterns[0].strength - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_recent_returns_newest_first() {
        let dir = TempDir::new().unwrap();
        let memory = open_memory(&dir);

        memory
            .store(episode("first", "default", ErrorClass::OomKilled))
            .await
            .unwrap();
        memory
            .store(episode("second", "default", ErrorClass::OomKilled))
            .await
            .unwrap();

        let recent = memory.recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].pod_name, "second");
    }

    #[tokio::test]
    async fn test_clear_all_idempotent() {
        let dir = TempDir::new().unwrap();
        let memory = open_memory(&dir);
        memory
            .store(episode("a", "default", ErrorClass::OomKilled))
            .await
            .unwrap();

        memory.clear_all().await.unwrap();
        let first = memory.statistics().await.unwrap();
        memory.clear_all().await.unwrap();
        let second = memory.statistics().await.unwrap();

        assert_eq!(first.total_episodes, 0);
        assert_eq!(second.total_episodes, 0);
        assert_eq!(first.patterns_discovered, second.patterns_discovered);
    }

    #[tokio::test]
    async fn test_progression_groups_by_day_and_class() {
        let dir = TempDir::new().unwrap();
        let memory = open_memory(&dir);

        let mut ep = episode("a", "default", ErrorClass::OomKilled);
        ep.confidence_before = 0.5;
        ep.confidence_after = 0.7;
        ep.resolution_time = 10.0;
        memory.store(ep).await.unwrap();

        let progression = memory.progression(7).await.unwrap();
        assert_eq!(progression.daily_progression.len(), 1);
        assert_eq!(progression.per_class_stats.len(), 1);
        let stats = &progression.per_class_stats[0];
        assert!((stats.avg_improvement - 0.2).abs() < 1e-9);
    }
}
