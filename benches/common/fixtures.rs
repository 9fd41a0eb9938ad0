use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Value type produced by the benchmark origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchUser {
    pub id: u64,
    pub name: String,
    pub email: String,
}

kv_memo::json_codec!(BenchUser);

/// A slow origin that producers call on a miss.
///
/// Users `user:0` to `user:{population - 1}` exist; anything else is an error.
#[derive(Clone)]
pub struct Origin {
    population: u64,
    latency: Duration,
    loads: Arc<AtomicUsize>,
}

impl Origin {
    pub fn new(population: u64, latency_ms: u64) -> Self {
        Self {
            population,
            latency: Duration::from_millis(latency_ms),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn load(&self, key: &str) -> Result<BenchUser, String> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;

        let id = key
            .strip_prefix("user:")
            .and_then(|id| id.parse::<u64>().ok())
            .filter(|id| *id < self.population)
            .ok_or_else(|| format!("{} not found", key))?;

        Ok(BenchUser {
            id,
            name: format!("User {}", id),
            email: format!("user{}@example.com", id),
        })
    }

    /// Producer runs so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

/// `user:0` .. `user:{count - 1}`.
pub fn user_keys(count: u64) -> Vec<String> {
    (0..count).map(|i| format!("user:{}", i)).collect()
}

/// `len` keys over `population` users where roughly `hit_ratio` of the
/// lookups land on the hot set, the first `hit_ratio` share of the users.
pub fn skewed_keys(population: u64, hit_ratio: f64, len: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let hot = ((population as f64 * hit_ratio) as u64).clamp(1, population - 1);

    (0..len)
        .map(|_| {
            let id = if rng.gen_bool(hit_ratio) {
                rng.gen_range(0..hot)
            } else {
                rng.gen_range(hot..population)
            };
            format!("user:{}", id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_origin_counts_loads() {
        let origin = Origin::new(10, 0);

        assert_eq!(origin.load("user:3").await.unwrap().id, 3);
        assert!(origin.load("user:10").await.is_err());
        assert!(origin.load("nobody").await.is_err());
        assert_eq!(origin.loads(), 3);
    }

    #[test]
    fn test_skewed_keys_stay_in_population() {
        let keys = skewed_keys(100, 0.8, 500);
        assert_eq!(keys.len(), 500);
        assert!(keys.iter().all(|k| {
            let id: u64 = k["user:".len()..].parse().unwrap();
            id < 100
        }));
        assert_eq!(user_keys(3), vec!["user:0", "user:1", "user:2"]);
    }
}
