//! Hardware-facing model: the network-on-chip latency function.
mod noc;

pub use noc::NetworkOnChip;

/// PE-array shape. Just the count, since every PE is identical and the
/// mapping analyzer is what turns it into tile counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HardwareConfig {
    pub num_pes: u32,
}

impl HardwareConfig {
    pub fn new(num_pes: u32) -> Self {
        HardwareConfig { num_pes }
    }
}
