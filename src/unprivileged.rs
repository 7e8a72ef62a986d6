//! Unprivileged side of the channel.
//!
//! Split into two halves that never share an index field:
//!
//! - [`Drainer`] owns `to_consumer.read_index`. It waits for readiness and
//!   drains the ring, checking the privileged side's tag stream.
//! - [`Filler`] owns `to_producer.write_index`. It pushes its own tag
//!   stream and rings the doorbell when anything went in.
//!
//! [`UnprivilegedSide`] drives both from one thread
//! ([`run_multiplexed`](UnprivilegedSide::run_multiplexed)) or hands each
//! half its own thread ([`run_threaded`](UnprivilegedSide::run_threaded)).
//! Because the halves touch disjoint fields, neither mode needs a lock.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

use crate::config::{drain_limit, UnprivilegedConfig};
use crate::error::{Error, Result};
use crate::privileged::Region;
use crate::ring_buffer::DEFAULT_CAPACITY;
use crate::sequence::{SequenceChecker, SequenceTag};
use crate::signal::{Doorbell, Readiness, StopSignal};
use crate::utils::{human_bytes, ChannelStats, TrafficStats};

/// Reading half: drains `to_consumer`.
#[derive(Debug)]
pub struct Drainer<R, const CAPACITY: usize = DEFAULT_CAPACITY> {
    region: Region<CAPACITY>,
    readiness: R,
    checker: SequenceChecker,
    stats: TrafficStats,
    max_drain: usize,
    halt_on_mismatch: bool,
    poll_granularity: Duration,
    verbose: bool,
}

impl<R: Readiness, const CAPACITY: usize> Drainer<R, CAPACITY> {
    pub fn new(region: Region<CAPACITY>, readiness: R, config: &UnprivilegedConfig) -> Self {
        Self {
            region,
            readiness,
            checker: SequenceChecker::new(),
            stats: TrafficStats::default(),
            max_drain: drain_limit(config.max_drain, CAPACITY),
            halt_on_mismatch: config.halt_on_mismatch,
            poll_granularity: config.poll_granularity,
            verbose: config.verbose_read,
        }
    }

    pub fn readiness(&self) -> &R {
        &self.readiness
    }

    /// Pops everything currently available (up to `max_drain`) and checks
    /// each byte against the predicted tag.
    ///
    /// Mismatches are logged and counted. With `halt_on_mismatch` the pass
    /// stops at the first one and returns it as an error.
    pub fn drain(&mut self) -> Result<usize> {
        let ring = &self.region.to_consumer;
        let mut drained = 0;
        let mut outcome = Ok(());

        while drained < self.max_drain {
            let Some(byte) = ring.try_pop() else {
                break;
            };
            drained += 1;
            if let Err(mismatch) = self.checker.check(byte) {
                self.stats.mismatches += 1;
                warn!("unprivileged read: {}", mismatch);
                if self.halt_on_mismatch {
                    outcome = Err(Error::Mismatch(mismatch));
                    break;
                }
            }
        }

        self.stats.bytes += drained as u64;
        self.stats.rounds += 1;
        if self.verbose && drained > 0 {
            info!(
                "unprivileged read: {} bytes read ({} total)",
                drained,
                human_bytes(self.stats.bytes)
            );
        }
        outcome.map(|()| drained)
    }

    /// Blocks until readable (or `timeout`), then drains.
    ///
    /// Returns `Ok(0)` on timeout.
    pub fn wait_and_drain(&mut self, timeout: Option<Duration>) -> Result<usize> {
        if self.readiness.wait_readable(timeout) {
            self.drain()
        } else {
            Ok(0)
        }
    }

    /// Reader loop for threaded mode: block on readiness, drain, repeat.
    ///
    /// Waits are cut into `poll_granularity` slices so `stop` is noticed.
    /// Returns [`Error::Closed`] if the privileged side goes away first.
    pub fn run(&mut self, stop: &StopSignal) -> Result<()> {
        while !stop.is_requested() {
            if self.readiness.is_closed() {
                return Err(Error::Closed);
            }
            self.wait_and_drain(Some(self.poll_granularity))?;
        }
        Ok(())
    }

    pub fn stats(&self) -> TrafficStats {
        self.stats
    }
}

/// Writing half: fills `to_producer` and rings the doorbell.
#[derive(Debug)]
pub struct Filler<D, const CAPACITY: usize = DEFAULT_CAPACITY> {
    region: Region<CAPACITY>,
    doorbell: D,
    tag: SequenceTag,
    stats: TrafficStats,
    config: UnprivilegedConfig,
    rng: StdRng,
}

impl<D: Doorbell, const CAPACITY: usize> Filler<D, CAPACITY> {
    pub fn new(region: Region<CAPACITY>, doorbell: D, config: &UnprivilegedConfig) -> Self {
        Self {
            region,
            doorbell,
            tag: SequenceTag::new(),
            stats: TrafficStats::default(),
            config: config.clone(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Pushes up to `chunk` tagged bytes, stopping on the first full
    /// condition, and rings the doorbell if at least one byte went in.
    ///
    /// A poisoned ring takes nothing and counts nothing: the round is
    /// abandoned rather than reported as dropped.
    pub fn produce(&mut self, chunk: usize) -> usize {
        let ring = &self.region.to_producer;
        if ring.is_poisoned() {
            debug!("unprivileged write: region torn down, round skipped");
            return 0;
        }

        let mut pushed = 0;
        while pushed < chunk {
            if !ring.try_push(self.tag.peek()) {
                if ring.is_poisoned() {
                    debug!("unprivileged write: region torn down mid-round");
                    break;
                }
                self.stats.full_events += 1;
                self.stats.dropped += (chunk - pushed) as u64;
                debug!(
                    "unprivileged write: ring full, {} of {} bytes dropped",
                    chunk - pushed,
                    chunk
                );
                break;
            }
            self.tag.advance();
            pushed += 1;
        }

        if pushed > 0 {
            self.doorbell.ring();
        }

        self.stats.bytes += pushed as u64;
        self.stats.rounds += 1;
        if self.config.verbose_write {
            info!(
                "unprivileged write: {} bytes written ({} total)",
                pushed,
                human_bytes(self.stats.bytes)
            );
        }
        pushed
    }

    /// One paced round with a sampled chunk size.
    pub fn produce_sampled(&mut self) -> usize {
        let chunk = self.config.pacing.sample_chunk(&mut self.rng);
        self.produce(chunk)
    }

    pub fn sample_interval(&mut self) -> Duration {
        self.config.pacing.sample_interval(&mut self.rng)
    }

    /// Writer loop for threaded mode: produce, sleep a sampled interval,
    /// repeat until `stop`.
    pub fn run(&mut self, stop: &StopSignal) {
        while !stop.is_requested() {
            self.produce_sampled();
            let pause = self.sample_interval();
            if stop.sleep(pause) {
                break;
            }
        }
    }

    pub fn stats(&self) -> TrafficStats {
        self.stats
    }
}

/// The unprivileged producer/consumer, both halves together.
#[derive(Debug)]
pub struct UnprivilegedSide<R, D, const CAPACITY: usize = DEFAULT_CAPACITY> {
    drainer: Drainer<R, CAPACITY>,
    filler: Filler<D, CAPACITY>,
}

impl<R: Readiness, D: Doorbell, const CAPACITY: usize> UnprivilegedSide<R, D, CAPACITY> {
    pub fn new(
        region: Region<CAPACITY>,
        readiness: R,
        doorbell: D,
        config: UnprivilegedConfig,
    ) -> Self {
        Self {
            drainer: Drainer::new(region.clone(), readiness, &config),
            filler: Filler::new(region, doorbell, &config),
        }
    }

    pub fn drainer(&mut self) -> &mut Drainer<R, CAPACITY> {
        &mut self.drainer
    }

    pub fn filler(&mut self) -> &mut Filler<D, CAPACITY> {
        &mut self.filler
    }

    pub fn into_halves(self) -> (Drainer<R, CAPACITY>, Filler<D, CAPACITY>) {
        (self.drainer, self.filler)
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            sent: self.filler.stats(),
            received: self.drainer.stats(),
        }
    }

    /// Single-threaded mode.
    ///
    /// Each round waits for readiness bounded by a sampled write interval:
    /// if data shows up it is drained, if the interval runs out a chunk is
    /// produced instead. Runs until `stop` is requested.
    pub fn run_multiplexed(&mut self, stop: &StopSignal) -> Result<()> {
        while !stop.is_requested() {
            if self.drainer.readiness.is_closed() {
                return Err(Error::Closed);
            }
            let timeout = self.filler.sample_interval();
            if self.drainer.readiness.wait_readable(Some(timeout)) {
                self.drainer.drain()?;
            } else {
                self.filler.produce_sampled();
            }
        }
        Ok(())
    }
}

impl<R, D, const CAPACITY: usize> UnprivilegedSide<R, D, CAPACITY>
where
    R: Readiness + Send,
    D: Doorbell + Send,
{
    /// Two-thread mode: one thread blocks on readiness and drains, the
    /// other produces on its own interval.
    ///
    /// Runs until `stop` is requested. If the reader stops on an error it
    /// requests `stop` itself so the writer follows. Returns the final counters with the
    /// reader's error, if any.
    pub fn run_threaded(self, stop: &StopSignal) -> (ChannelStats, Result<()>) {
        let (mut drainer, mut filler) = self.into_halves();

        let outcome = std::thread::scope(|s| {
            let reader = std::thread::Builder::new()
                .name("shm-fifo-reader".into())
                .spawn_scoped(s, || {
                    let outcome = drainer.run(stop);
                    if outcome.is_err() {
                        stop.request();
                    }
                    outcome
                });
            let reader = match reader {
                Ok(reader) => reader,
                Err(err) => return Err(Error::Io(err)),
            };

            filler.run(stop);

            match reader.join() {
                Ok(outcome) => outcome,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        });

        let stats = ChannelStats {
            sent: filler.stats(),
            received: drainer.stats(),
        };
        (stats, outcome)
    }
}
