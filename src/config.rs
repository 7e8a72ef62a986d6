use rand::Rng;
use std::time::Duration;

/// Load shape of a periodic producer: how long to wait between rounds and
/// how many bytes to offer per round.
///
/// Both are sampled uniformly from the half-open range `[min, max)` on
/// every round; `min == max` pins the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub interval: (Duration, Duration),
    pub chunk: (usize, usize),
}

impl Pacing {
    pub const fn fixed(interval: Duration, chunk: usize) -> Self {
        Self {
            interval: (interval, interval),
            chunk: (chunk, chunk),
        }
    }

    /// Privileged-side ticker defaults: 8..40 ms between ticks,
    /// 1..17000 bytes per tick.
    pub const fn privileged_default() -> Self {
        Self {
            interval: (Duration::from_millis(8), Duration::from_millis(40)),
            chunk: (1, 17_000),
        }
    }

    /// Unprivileged-side defaults: 10 µs..30 ms between rounds,
    /// 1..15000 bytes per round.
    pub const fn unprivileged_default() -> Self {
        Self {
            interval: (Duration::from_micros(10), Duration::from_millis(30)),
            chunk: (1, 15_000),
        }
    }

    pub fn sample_interval<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (min, max) = self.interval;
        if max <= min {
            min
        } else {
            rng.gen_range(min..max)
        }
    }

    pub fn sample_chunk<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let (min, max) = self.chunk;
        if max <= min {
            min
        } else {
            rng.gen_range(min..max)
        }
    }
}

/// How the privileged side consumes the return ring on a doorbell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DrainMode {
    /// Pop byte by byte until empty, re-reading the write index each time.
    #[default]
    Bytewise,
    /// Snapshot the write index once and consume up to it in at most two
    /// contiguous segments.
    Snapshot,
}

#[derive(Debug, Clone)]
pub struct PrivilegedConfig {
    pub pacing: Pacing,
    /// Upper bound on bytes consumed per doorbell. `None` bounds each
    /// pass at the ring capacity.
    pub max_drain: Option<usize>,
    pub drain_mode: DrainMode,
    pub verbose_read: bool,
    pub verbose_write: bool,
}

/// Resolves an optional per-pass drain bound against a ring's capacity.
/// A pass always takes at least one byte.
pub(crate) fn drain_limit(max_drain: Option<usize>, capacity: usize) -> usize {
    max_drain.unwrap_or(capacity).max(1)
}

impl Default for PrivilegedConfig {
    fn default() -> Self {
        Self {
            pacing: Pacing::privileged_default(),
            max_drain: None,
            drain_mode: DrainMode::default(),
            verbose_read: false,
            verbose_write: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnprivilegedConfig {
    pub pacing: Pacing,
    /// Upper bound on bytes consumed per readiness wake. `None` bounds
    /// each pass at the ring capacity.
    pub max_drain: Option<usize>,
    /// Stop the draining loop at the first sequence mismatch.
    pub halt_on_mismatch: bool,
    /// Longest a blocking wait may run before the stop flag is re-checked.
    pub poll_granularity: Duration,
    pub verbose_read: bool,
    pub verbose_write: bool,
}

impl Default for UnprivilegedConfig {
    fn default() -> Self {
        Self {
            pacing: Pacing::unprivileged_default(),
            max_drain: None,
            halt_on_mismatch: false,
            poll_granularity: Duration::from_millis(100),
            verbose_read: false,
            verbose_write: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn fixed_pacing_always_samples_the_same_values() {
        let pacing = Pacing::fixed(Duration::from_millis(3), 128);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(pacing.sample_interval(&mut rng), Duration::from_millis(3));
            assert_eq!(pacing.sample_chunk(&mut rng), 128);
        }
    }

    #[test]
    fn random_pacing_stays_in_half_open_range() {
        let pacing = Pacing::unprivileged_default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let interval = pacing.sample_interval(&mut rng);
            assert!(interval >= pacing.interval.0 && interval < pacing.interval.1);
            let chunk = pacing.sample_chunk(&mut rng);
            assert!((1..15_000).contains(&chunk));
        }
    }

    #[test]
    fn drain_bound_defaults_to_ring_capacity() {
        assert_eq!(PrivilegedConfig::default().max_drain, None);
        assert_eq!(UnprivilegedConfig::default().max_drain, None);
        assert_eq!(drain_limit(None, 4096), 4096);
        assert_eq!(drain_limit(Some(10), 4096), 10);
        assert_eq!(drain_limit(Some(0), 4096), 1);
    }
}
