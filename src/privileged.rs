//! Privileged side of the channel.
//!
//! Owns the region's lifetime: it initializes the rings, runs the ticker
//! that fills `to_consumer`, drains `to_producer` whenever the doorbell
//! rings, and poisons the region on teardown once nothing of its own can
//! touch it any more.
//!
//! Each ring has its own lock, and the lock also guards that direction's
//! sequence state. No path ever holds both.

use crossbeam_utils::CachePadded;
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{drain_limit, DrainMode, PrivilegedConfig};
use crate::duplex::DuplexChannel;
use crate::error::Result;
use crate::mmap::SharedRegion;
use crate::ring_buffer::DEFAULT_CAPACITY;
use crate::sequence::{SequenceChecker, SequenceTag};
use crate::signal::{Doorbell, Readiness, StopSignal, WaitQueue};
use crate::utils::{human_bytes, ChannelStats, TrafficStats};

pub type Region<const CAPACITY: usize> = Arc<SharedRegion<DuplexChannel<CAPACITY>>>;

#[derive(Debug, Default)]
struct TxState {
    tag: SequenceTag,
    stats: TrafficStats,
}

#[derive(Debug)]
struct RxState {
    checker: SequenceChecker,
    stats: TrafficStats,
    scratch: Vec<u8>,
}

#[derive(Debug)]
struct Inner<const CAPACITY: usize> {
    region: Region<CAPACITY>,
    config: PrivilegedConfig,
    max_drain: usize,
    /// Guards `to_consumer.write_index` and the outbound tag.
    tx: CachePadded<Mutex<TxState>>,
    /// Guards `to_producer.read_index` and the inbound prediction.
    rx: CachePadded<Mutex<RxState>>,
    readable: WaitQueue,
    stop: StopSignal,
    closed: AtomicBool,
}

impl<const CAPACITY: usize> Inner<CAPACITY> {
    /// One production round: push up to `chunk` tagged bytes into
    /// `to_consumer`, stop on the first full condition, wake readers.
    fn produce(&self, chunk: usize) -> usize {
        let ring = &self.region.to_consumer;
        let pushed = {
            let mut tx = self.tx.lock();
            if self.closed.load(Ordering::Acquire) {
                return 0;
            }
            let TxState { tag, stats } = &mut *tx;

            let mut pushed = 0;
            while pushed < chunk {
                if !ring.try_push(tag.peek()) {
                    stats.full_events += 1;
                    stats.dropped += (chunk - pushed) as u64;
                    debug!(
                        "privileged write: ring full, {} of {} bytes dropped",
                        chunk - pushed,
                        chunk
                    );
                    break;
                }
                tag.advance();
                pushed += 1;
            }
            stats.bytes += pushed as u64;
            stats.rounds += 1;

            if self.config.verbose_write {
                info!(
                    "privileged write: {} bytes written ({} total)",
                    pushed,
                    human_bytes(stats.bytes)
                );
            }
            pushed
        };

        self.readable.wake_all();
        pushed
    }

    /// Doorbell handler: consume `to_producer` and check every byte.
    ///
    /// Mismatches are logged and counted; draining carries on to the end
    /// of the available data, at most `max_drain` bytes per pass.
    fn drain_inbound(&self) -> usize {
        let ring = &self.region.to_producer;
        let mut rx = self.rx.lock();
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        let RxState {
            checker,
            stats,
            scratch,
        } = &mut *rx;
        let limit = self.max_drain;

        let mut record = |byte: u8| {
            if let Err(mismatch) = checker.check(byte) {
                stats.mismatches += 1;
                warn!("privileged read: {}", mismatch);
            }
        };

        let drained = match self.config.drain_mode {
            DrainMode::Bytewise => {
                let mut drained = 0;
                while drained < limit {
                    let Some(byte) = ring.try_pop() else {
                        break;
                    };
                    record(byte);
                    drained += 1;
                }
                drained
            }
            DrainMode::Snapshot => {
                let want = scratch.len().min(limit);
                let drained = ring.pop_into(&mut scratch[..want]);
                scratch[..drained].iter().for_each(|&b| record(b));
                drained
            }
        };

        stats.bytes += drained as u64;
        stats.rounds += 1;
        if self.config.verbose_read && drained > 0 {
            info!(
                "privileged read: {} bytes received ({} total)",
                drained,
                human_bytes(stats.bytes)
            );
        }
        drained
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// The privileged producer/consumer.
///
/// Dropping it (or calling [`shutdown`](Self::shutdown)) stops and joins
/// the ticker, waits out any in-flight doorbell drain, and only then
/// poisons the region.
#[derive(Debug)]
pub struct PrivilegedSide<const CAPACITY: usize = DEFAULT_CAPACITY> {
    inner: Arc<Inner<CAPACITY>>,
    ticker: Option<JoinHandle<()>>,
}

impl<const CAPACITY: usize> PrivilegedSide<CAPACITY> {
    /// Initializes the region and attaches without a ticker.
    ///
    /// Production then only happens through [`tick`](Self::tick).
    pub fn attach(region: Region<CAPACITY>, config: PrivilegedConfig) -> Self {
        region.init();
        let max_drain = drain_limit(config.max_drain, CAPACITY);
        let scratch_len = match config.drain_mode {
            DrainMode::Bytewise => 0,
            DrainMode::Snapshot => CAPACITY.min(max_drain),
        };
        let inner = Arc::new(Inner {
            region,
            config,
            max_drain,
            tx: CachePadded::new(Mutex::new(TxState::default())),
            rx: CachePadded::new(Mutex::new(RxState {
                checker: SequenceChecker::new(),
                stats: TrafficStats::default(),
                scratch: vec![0; scratch_len],
            })),
            readable: WaitQueue::new(),
            stop: StopSignal::new(),
            closed: AtomicBool::new(false),
        });
        Self {
            inner,
            ticker: None,
        }
    }

    /// Initializes the region and starts the periodic ticker.
    pub fn start(region: Region<CAPACITY>, config: PrivilegedConfig) -> Result<Self> {
        let mut side = Self::attach(region, config);
        let inner = side.inner.clone();
        let ticker = std::thread::Builder::new()
            .name("shm-fifo-ticker".into())
            .spawn(move || run_ticker(inner))?;
        side.ticker = Some(ticker);
        Ok(side)
    }

    /// Handle for the unprivileged side: readiness queries and doorbell.
    pub fn endpoint(&self) -> Endpoint<CAPACITY> {
        Endpoint {
            inner: self.inner.clone(),
        }
    }

    /// Runs one production round immediately. Returns bytes pushed.
    pub fn tick(&self, chunk: usize) -> usize {
        self.inner.produce(chunk)
    }

    /// Drains the return ring as if the doorbell had rung.
    pub fn drain(&self) -> usize {
        self.inner.drain_inbound()
    }

    pub fn stats(&self) -> ChannelStats {
        let sent = self.inner.tx.lock().stats;
        let received = self.inner.rx.lock().stats;
        ChannelStats { sent, received }
    }

    /// Stops the ticker, closes the endpoint and poisons the region.
    pub fn shutdown(mut self) -> ChannelStats {
        self.teardown();
        self.stats()
    }

    fn teardown(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            self.inner.stop.request();
            if ticker.join().is_err() {
                error!("ticker thread panicked");
            }
        }

        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Anything already holding a ring lock finishes first; anything
        // later sees `closed` and leaves the region alone.
        drop(self.inner.tx.lock());
        drop(self.inner.rx.lock());
        self.inner.region.poison();
        self.inner.readable.wake_all();
        debug!("privileged side torn down");
    }
}

impl<const CAPACITY: usize> Drop for PrivilegedSide<CAPACITY> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn run_ticker<const CAPACITY: usize>(inner: Arc<Inner<CAPACITY>>) {
    let mut rng = rand::thread_rng();
    loop {
        let next = inner.config.pacing.sample_interval(&mut rng);
        trace!("ticker: next in {:?}", next);
        if inner.stop.sleep(next) {
            break;
        }
        let chunk = inner.config.pacing.sample_chunk(&mut rng);
        inner.produce(chunk);
    }
}

/// Unprivileged view of a [`PrivilegedSide`].
///
/// Implements [`Readiness`] over `to_consumer` and [`Doorbell`] into the
/// privileged drain handler. After teardown it reports nothing readable
/// and the doorbell is a no-op.
#[derive(Debug, Clone)]
pub struct Endpoint<const CAPACITY: usize = DEFAULT_CAPACITY> {
    inner: Arc<Inner<CAPACITY>>,
}

impl<const CAPACITY: usize> Endpoint<CAPACITY> {
    pub fn region(&self) -> Region<CAPACITY> {
        self.inner.region.clone()
    }
}

impl<const CAPACITY: usize> Readiness for Endpoint<CAPACITY> {
    fn is_readable(&self) -> bool {
        !self.inner.is_closed() && self.inner.region.to_consumer.is_readable()
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> bool {
        let inner = &self.inner;
        inner.readable.wait_until(
            || inner.is_closed() || inner.region.to_consumer.is_readable(),
            timeout,
        ) && !inner.is_closed()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<const CAPACITY: usize> Doorbell for Endpoint<CAPACITY> {
    fn ring(&self) {
        self.inner.drain_inbound();
    }
}
