use anyhow::{Result, anyhow};
use log::{debug, warn};
use openai::Credentials;
use openai::embeddings::Embedding;
use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

use crate::config::EmbeddingProvider;
use crate::db::Store;
use crate::db::models::Exercise;
use crate::db::operations;

pub const LOCAL_DIMENSIONS: usize = 256;

static NON_ALPHANUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-z0-9]+").unwrap_or_else(|e| panic!("invalid embedding regex: {e}"))
});

/// Turns exercise names into vectors.
#[derive(Debug, Clone)]
pub enum Embedder {
    OpenAi { model: String, api_key: String },
    /// Character trigrams hashed into a fixed number of buckets. Good enough to
    /// match "bench" to "Bench Press" without any network access.
    Local { dims: usize },
}

impl Embedder {
    pub fn from_provider(provider: &EmbeddingProvider) -> Self {
        match provider {
            EmbeddingProvider::OpenAi { api_key, model } => Embedder::OpenAi {
                model: model.clone(),
                api_key: api_key.clone(),
            },
            EmbeddingProvider::Local => Embedder::local(),
        }
    }

    pub fn local() -> Self {
        Embedder::Local {
            dims: LOCAL_DIMENSIONS,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self {
            Embedder::OpenAi { model, api_key } => {
                debug!("Embedder::embed openai model={} len={}", model, text.len());
                let creds = Credentials::new(api_key, "");
                let embedding = Embedding::create(model, text, "", creds)
                    .await
                    .map_err(|e| anyhow!("Embedding request failed: {}", e))?;
                Ok(embedding.vec.into_iter().map(|v| v as f32).collect())
            }
            Embedder::Local { dims } => Ok(local_embedding(text, *dims)),
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn local_embedding(text: &str, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dims.max(1)];
    let lowered = text.to_lowercase();
    let cleaned = NON_ALPHANUMERIC.replace_all(&lowered, " ");
    for word in cleaned.split_whitespace() {
        let padded: Vec<char> = format!(" {} ", word).chars().collect();
        for gram in padded.windows(3) {
            let gram: String = gram.iter().collect();
            let bucket = (fnv1a(gram.as_bytes()) % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }
    }
    vector
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// `1 - cosine similarity`, the ordering pgvector's `<=>` uses.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - f64::from(cosine_similarity(a, b))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseMatch {
    pub id: i32,
    pub name: String,
    pub distance: f64,
}

/// Nearest-neighbour lookup over a profile's exercise names.
#[derive(Clone)]
pub struct ExerciseSearch {
    store: Store,
    embedder: Embedder,
    max_distance: Option<f64>,
}

impl ExerciseSearch {
    pub fn new(store: Store, embedder: Embedder, max_distance: Option<f64>) -> Self {
        Self {
            store,
            embedder,
            max_distance,
        }
    }

    /// Stored embedding of the exercise, computing and saving it when missing
    /// or when it came from an embedder with a different dimension.
    async fn exercise_embedding(&self, exercise: &Exercise, dims: usize) -> Result<Vec<f32>> {
        if let Some(raw) = &exercise.name_embedding {
            match serde_json::from_str::<Vec<f32>>(raw) {
                Ok(v) if v.len() == dims => return Ok(v),
                Ok(_) => debug!("Re-embedding exercise {} after dimension change", exercise.id),
                Err(e) => warn!("Bad embedding stored for exercise {}: {}", exercise.id, e),
            }
        }
        let vector = self.embedder.embed(&exercise.name).await?;
        operations::set_exercise_embedding(&self.store, exercise.id, serde_json::to_string(&vector)?)
            .await?;
        Ok(vector)
    }

    /// Up to `limit` of the owner's exercises, closest first.
    pub async fn search(&self, query: &str, owner_id: i32, limit: usize) -> Result<Vec<ExerciseMatch>> {
        debug!("ExerciseSearch::search called query={:?} owner={}", query, owner_id);
        let query_vec = self.embedder.embed(query).await?;
        let exercises = operations::get_exercises_for_profile(&self.store, owner_id).await?;

        let mut matches = Vec::with_capacity(exercises.len());
        for exercise in exercises {
            let vector = self.exercise_embedding(&exercise, query_vec.len()).await?;
            matches.push(ExerciseMatch {
                id: exercise.id,
                name: exercise.name,
                distance: cosine_distance(&query_vec, &vector),
            });
        }
        matches.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }

    /// Top-1 match, dropped when further than the configured maximum distance.
    pub async fn best_match(&self, query: &str, owner_id: i32) -> Result<Option<ExerciseMatch>> {
        let best = self.search(query, owner_id, 1).await?.into_iter().next();
        Ok(match (best, self.max_distance) {
            (Some(m), Some(max)) if m.distance > max => {
                debug!("Best match {:?} for {:?} is too far ({:.3})", m.name, query, m.distance);
                None
            }
            (best, _) => best,
        })
    }

    /// Creates (or finds) an exercise with its embedding already stored.
    pub async fn create_exercise(&self, owner_id: i32, name: &str) -> Result<(Exercise, bool)> {
        let vector = self.embedder.embed(name).await?;
        operations::get_or_create_exercise(
            &self.store,
            owner_id,
            name,
            Some(serde_json::to_string(&vector)?),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn local_embedding_ignores_case_and_punctuation() {
        let a = local_embedding("Bench-Press!", LOCAL_DIMENSIONS);
        let b = local_embedding("bench press", LOCAL_DIMENSIONS);
        assert_eq!(a, b);
        assert!(cosine_distance(&a, &b).abs() < 1e-6);
    }

    async fn seeded() -> (ExerciseSearch, i32) {
        let store = Store::open_in_memory().unwrap();
        let seeds = vec!["Bench Press".to_string(), "Deadlift".into(), "Squat".into()];
        let (profile, _) = operations::get_or_create_profile(&store, "kim", "member", &seeds)
            .await
            .unwrap();
        (ExerciseSearch::new(store, Embedder::local(), Some(0.6)), profile.id)
    }

    #[tokio::test]
    async fn partial_names_find_the_right_exercise() {
        let (search, owner) = seeded().await;
        let results = search.search("bench", owner, 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].name, "Bench Press");
        assert!(results[0].distance < results[1].distance);

        let best = search.best_match("squats", owner).await.unwrap().unwrap();
        assert_eq!(best.name, "Squat");
    }

    #[tokio::test]
    async fn distant_queries_have_no_best_match() {
        let (search, owner) = seeded().await;
        assert!(search.best_match("zzyzx", owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_embeddings_are_backfilled() {
        let (search, owner) = seeded().await;
        search.search("deadlift", owner, 1).await.unwrap();
        let exercises = operations::get_exercises_for_profile(&search.store, owner).await.unwrap();
        assert!(exercises.iter().all(|e| e.name_embedding.is_some()));
    }

    #[tokio::test]
    async fn search_is_scoped_to_the_owner() {
        let (search, _) = seeded().await;
        let (other, _) = operations::get_or_create_profile(&search.store, "lee", "member", &[])
            .await
            .unwrap();
        assert!(search.search("bench", other.id, 5).await.unwrap().is_empty());
    }
}
