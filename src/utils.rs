use std::fmt;

/// Per-direction traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
    /// Bytes pushed (sender) or popped (receiver).
    pub bytes: u64,
    /// Producer rounds or drain passes.
    pub rounds: u64,
    /// Rounds that stopped early on a full ring.
    pub full_events: u64,
    /// Bytes offered but not pushed because the ring was full.
    pub dropped: u64,
    /// Received bytes whose tag differed from the prediction.
    pub mismatches: u64,
}

/// Counters for both directions as seen from one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub sent: TrafficStats,
    pub received: TrafficStats,
}

impl fmt::Display for ChannelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total read  {} bytes ({}), {} mismatches",
            self.received.bytes,
            human_bytes(self.received.bytes),
            self.received.mismatches
        )?;
        write!(
            f,
            "Total write {} bytes ({}), {} full events, {} bytes dropped",
            self.sent.bytes,
            human_bytes(self.sent.bytes),
            self.sent.full_events,
            self.sent.dropped
        )
    }
}

/// Formats a byte count with a binary (1024-based) unit suffix.
///
/// Values up to 1 KiB are printed as a plain integer; above that two
/// decimals and one of `K`, `M`, `G`, `T`.
pub fn human_bytes(count: u64) -> String {
    const K: u64 = 1024;
    const M: u64 = K * 1024;
    const G: u64 = M * 1024;
    const T: u64 = G * 1024;

    let scaled = |unit: u64, suffix: &str| format!("{:.2}{}", count as f64 / unit as f64, suffix);
    if count > T {
        scaled(T, "T")
    } else if count > G {
        scaled(G, "G")
    } else if count > M {
        scaled(M, "M")
    } else if count > K {
        scaled(K, "K")
    } else {
        count.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_small_values_are_plain() {
        assert_eq!(human_bytes(0), "0");
        assert_eq!(human_bytes(1023), "1023");
        // Exactly one unit is not "above" it.
        assert_eq!(human_bytes(1024), "1024");
    }

    #[test]
    fn human_bytes_picks_the_largest_unit() {
        assert_eq!(human_bytes(1536), "1.50K");
        assert_eq!(human_bytes(5 * 1024 * 1024 + 1), "5.00M");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024 + 1), "3.00G");
        assert_eq!(human_bytes(2 * 1024u64.pow(4) + 1), "2.00T");
    }

    #[test]
    fn channel_stats_display_smoke_test() {
        let stats = ChannelStats {
            sent: TrafficStats {
                bytes: 2048,
                full_events: 1,
                dropped: 10,
                ..Default::default()
            },
            received: TrafficStats {
                bytes: 100,
                ..Default::default()
            },
        };
        let text = stats.to_string();
        assert!(text.contains("Total read  100 bytes (100)"));
        assert!(text.contains("Total write 2048 bytes (2.00K)"));
    }
}
