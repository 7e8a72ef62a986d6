//! # Shared-Memory FIFO
//!
//! A bounded duplex byte channel between two independently scheduled
//! domains that meet in one mapped memory region: a **privileged** side
//! that produces on a timer and drains on a doorbell, and an
//! **unprivileged** side that drains on readiness and produces on its own
//! schedule.
//!
//! The region holds two single-producer/single-consumer rings laid out
//! back to back:
//!
//! ```text
//! [ to_consumer: wp | rp | bytes[CAPACITY] ][ to_producer: wp | rp | bytes[CAPACITY] ]
//! ```
//!
//! ## Protocol
//!
//! - **Full / empty:** a ring is empty when `rp == wp` and full when
//!   `(wp + 1) % CAPACITY == rp`; one slot is sacrificed.
//! - **Drop on full:** producers never block. Bytes offered to a full ring
//!   are discarded and counted.
//! - **Index ownership:** each index is stored by exactly one domain and
//!   published with release semantics. Within a domain, actors sharing an
//!   index are serialized by a per-ring lock (privileged side) or by never
//!   sharing it at all (unprivileged side).
//! - **Integrity:** every byte is a cyclic tag `1..=254`. Each receiver
//!   predicts the peer's next tag and reports divergence without stopping.
//! - **Signaling:** readiness wakes the unprivileged reader; a zero-payload
//!   doorbell triggers the privileged drain.
//! - **Teardown:** the privileged ticker is stopped and joined before the
//!   region is poisoned, so nothing of that side touches it afterwards.
//!
//! ## Modules
//!
//! - [`ring_buffer`]: [`RingChannel`], the index arithmetic.
//! - [`duplex`]: [`DuplexChannel`], the page-aligned shared layout.
//! - [`sequence`]: tag generation and checking.
//! - [`mmap`]: [`SharedRegion`], anonymous or POSIX-named mappings.
//! - [`signal`]: [`Readiness`], [`Doorbell`], [`WaitQueue`], [`StopSignal`].
//! - [`privileged`] / [`unprivileged`]: the two sides.
//!
//! ## License
//!
//! Licensed under the terms of the **GNU Lesser General Public License**,
//! version 3.0, or (at your option) any later version.
//!
//! See <https://www.gnu.org/licenses/lgpl-3.0.html> for details.

#[cfg(not(unix))]
compile_error!("This crate only supports Unix-like operating systems.");

pub mod config;
pub mod duplex;
pub mod error;
pub mod mmap;
pub mod privileged;
pub mod ring_buffer;
pub mod sequence;
pub mod signal;
pub mod unprivileged;
mod utils;

pub use config::{DrainMode, Pacing, PrivilegedConfig, UnprivilegedConfig};
pub use duplex::DuplexChannel;
pub use error::{Error, Result, SequenceMismatch};
pub use mmap::SharedRegion;
pub use privileged::{Endpoint, PrivilegedSide, Region};
pub use ring_buffer::{RingChannel, DEFAULT_CAPACITY, POISON};
pub use sequence::{SequenceChecker, SequenceTag};
pub use signal::{Doorbell, Readiness, StopSignal, WaitQueue};
pub use unprivileged::{Drainer, Filler, UnprivilegedSide};
pub use utils::{human_bytes, ChannelStats, TrafficStats};
