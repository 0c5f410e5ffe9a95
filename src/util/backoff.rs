use std::time::Duration;

use rand::Rng;

pub const DEFAULT_INTERVAL_MILLIS: u64 = 100;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const MAX_BACKOFF_MILLIS: u64 = 60 * 1_000;
pub const RANDOM_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub interval_millis: u64,
    pub backoff_factor: f64,
    pub max_millis: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            interval_millis: DEFAULT_INTERVAL_MILLIS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_millis: MAX_BACKOFF_MILLIS,
        }
    }
}

impl BackoffConfig {
    /// Jittered delay before retry number `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff_with_rng(
            attempt,
            *self,
            &mut rand::thread_rng(),
        ))
    }
}

fn calculate_backoff_with_rng<R: Rng + ?Sized>(
    backoff_count: u32,
    config: BackoffConfig,
    rng: &mut R,
) -> u64 {
    let base = (config.interval_millis as f64) * config.backoff_factor.powi(backoff_count as i32);
    let jitter = RANDOM_FACTOR * base * rng.gen_range(-1.0..=1.0);
    let value = (base + jitter).round().clamp(0.0, config.max_millis as f64);
    value as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn deterministic_with_seeded_rng() {
        let mut rng = StdRng::seed_from_u64(42);
        let value = calculate_backoff_with_rng(3, BackoffConfig::default(), &mut rng);
        assert!(value > 0);
        assert!(value <= MAX_BACKOFF_MILLIS);
    }

    #[test]
    fn backoff_grows_with_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let first = calculate_backoff_with_rng(0, BackoffConfig::default(), &mut rng);
        let mut rng = StdRng::seed_from_u64(1);
        let later = calculate_backoff_with_rng(4, BackoffConfig::default(), &mut rng);
        assert!(later >= first);
    }

    #[test]
    fn delay_respects_cap() {
        let config = BackoffConfig {
            interval_millis: 1_000,
            backoff_factor: 10.0,
            max_millis: 2_000,
        };
        assert!(config.delay(6) <= Duration::from_millis(2_000));
    }
}
