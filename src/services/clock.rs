use chrono::{DateTime, Utc};

/// Wall-clock capability. Injected so tests can pin time; the aggregate
/// itself never reads the clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Entropy capability for per-attempt shuffle seeds.
pub trait SeedSource: Send + Sync {
    fn next_seed(&self) -> i64;
}

pub struct ThreadRngSeedSource;

impl SeedSource for ThreadRngSeedSource {
    fn next_seed(&self) -> i64 {
        rand::random::<i64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_utc_and_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
