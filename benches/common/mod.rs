pub mod config;
pub mod fixtures;

pub use config::BenchConfig;
pub use fixtures::{BenchUser, Origin, skewed_keys, user_keys};
