use std::env;
use std::str::FromStr;

/// Benchmark knobs, read from the environment.
///
/// | Variable            | Default    |
/// |---------------------|------------|
/// | `REDIS_URL`         | unset, Redis runs skipped |
/// | `ORIGIN_LATENCY_MS` | 5          |
/// | `BENCH_SAMPLE_SIZE` | 100        |
/// | `STAMPEDE_CALLERS`  | 64         |
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub redis_url: Option<String>,
    pub origin_latency_ms: u64,
    pub sample_size: usize,
    pub stampede_callers: usize,
}

fn parsed<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            origin_latency_ms: parsed("ORIGIN_LATENCY_MS", 5),
            sample_size: parsed("BENCH_SAMPLE_SIZE", 100),
            stampede_callers: parsed("STAMPEDE_CALLERS", 64),
        }
    }
}

impl BenchConfig {
    /// Load from the environment and print what will be used.
    pub fn new() -> Self {
        let config = Self::default();
        eprintln!(
            "redis={} origin_latency={}ms samples={} stampede_callers={}",
            config.redis_url.as_deref().unwrap_or("(disabled)"),
            config.origin_latency_ms,
            config.sample_size,
            config.stampede_callers
        );
        config
    }
}
