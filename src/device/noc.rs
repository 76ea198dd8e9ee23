//! Network-on-chip latency model.

/// Parameters of a uniform, single-stage network on chip.
///
/// Not a trait: there is exactly one NoC shape here, so a plain struct with
/// one analytical method is enough, unlike an abstraction meant to cover
/// several interchangeable hardware backends.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkOnChip {
    pub bandwidth: u64,
    pub hops: u64,
    pub hop_latency: u64,
    pub multicast_supported: bool,
}

impl NetworkOnChip {
    pub fn new(bandwidth: u64, hops: u64, hop_latency: u64, multicast_supported: bool) -> Self {
        NetworkOnChip {
            bandwidth,
            hops,
            hop_latency,
            multicast_supported,
        }
    }

    /// Cycles to drain `volume_bytes` across this network: a transfer term
    /// plus a fixed hop latency, bounded below by the hop latency alone.
    pub fn outstanding_delay(&self, volume_bytes: u64) -> u64 {
        let transfer = if self.bandwidth == 0 {
            0
        } else {
            (volume_bytes + self.bandwidth - 1) / self.bandwidth
        };
        transfer + self.hops * self.hop_latency
    }

    pub fn multicast_supported(&self) -> bool {
        self.multicast_supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_rounds_up_and_adds_hop_latency() {
        let noc = NetworkOnChip::new(32, 1, 1, true);
        assert_eq!(noc.outstanding_delay(32), 1 + 1);
        assert_eq!(noc.outstanding_delay(33), 2 + 1);
    }

    #[test]
    fn delay_bounded_below_by_hop_latency() {
        let noc = NetworkOnChip::new(32, 3, 2, false);
        assert_eq!(noc.outstanding_delay(0), 6);
    }

    #[test]
    fn monotone_in_volume() {
        let noc = NetworkOnChip::new(32, 1, 1, true);
        assert!(noc.outstanding_delay(1000) >= noc.outstanding_delay(500));
    }
}
