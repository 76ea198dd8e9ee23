//! L1/L2 buffer sizing and read/write traffic volumes.
use crate::device::NetworkOnChip;
use crate::error::Result;
use crate::ir::Tensor;
use super::mapping::MappingAnalyzer;

/// Buffer and traffic formulas for one analysis. Caches the spatial-tile
/// counts it needs from the mapping analyzer at construction time, so every
/// query after that is a handful of arithmetic operations plus the
/// analyzer's per-tensor lookups.
pub struct BufferModel<'a> {
    mapping: &'a MappingAnalyzer,
    num_pes: i64,
    num_sp_tiles: i64,
    num_edge_tiles: i64,
    num_spatial_foldings: i64,
    num_temporal_iterations: i64,
    tile_size: i64,
    multicast_supported: bool,
    double_buffering: bool,
}

impl<'a> BufferModel<'a> {
    pub fn new(
        mapping: &'a MappingAnalyzer,
        noc: &NetworkOnChip,
        num_pes: i64,
        double_buffering: bool,
    ) -> Result<Self> {
        let num_sp_tiles = mapping
            .num_spatial_tiles()?
            .first()
            .map(|(_, n)| *n)
            .unwrap_or(1)
            .max(1);
        Ok(BufferModel {
            mapping,
            num_pes,
            num_sp_tiles,
            num_edge_tiles: mapping.num_edge_tiles()?,
            num_spatial_foldings: mapping.num_spatial_foldings()?,
            num_temporal_iterations: mapping.num_temporal_iterations()?,
            tile_size: num_pes / num_sp_tiles,
            multicast_supported: noc.multicast_supported(),
            double_buffering,
        })
    }

    pub fn num_spatial_foldings(&self) -> i64 {
        self.num_spatial_foldings
    }

    pub fn num_temporal_iterations(&self) -> i64 {
        self.num_temporal_iterations
    }

    /// Per-PE L1 capacity: the sum of every tensor's fully-mapped (no
    /// reuse) footprint, doubled when double buffering is enabled.
    pub fn l1_required_size(&self, tensors: &[Tensor]) -> Result<i64> {
        let mut sum = 0i64;
        for t in tensors {
            sum += self.mapping.mapped_size(t, false, false)?;
        }
        Ok(if self.double_buffering { 2 * sum } else { sum })
    }

    /// L2 capacity: one PE's full footprint plus every other active PE's
    /// spatially-unique slice.
    pub fn l2_required_size(&self, tensors: &[Tensor]) -> Result<i64> {
        let max_pes = if self.num_spatial_foldings == 1 {
            self.num_edge_tiles
        } else {
            self.num_sp_tiles
        };
        let mut sum = 0i64;
        for t in tensors {
            let first = self.mapping.mapped_size(t, false, false)?;
            let other = self.mapping.mapped_size(t, false, true)?;
            sum += first + (max_pes - 1) * other;
        }
        Ok(sum)
    }

    /// Traffic pushed from L1 up to L2 in one spatial iteration.
    pub fn spatial_l1_to_l2_traffic(
        &self,
        tensor: &Tensor,
        edge: bool,
        temporal_reuse: bool,
        spatial_reuse: bool,
    ) -> Result<i64> {
        let k = if edge { self.num_edge_tiles } else { self.num_sp_tiles };
        let unique = self.mapping.mapped_size(tensor, temporal_reuse, spatial_reuse)?;
        Ok(k * unique)
    }

    /// Traffic pulled from L2 down to L1 in one spatial/temporal iteration.
    /// The temporal-change-frequency division is baked in here, not left
    /// to callers, matching the source formula's own `/ f`.
    pub fn spatial_l2_to_l1_traffic(
        &self,
        tensor: &Tensor,
        first_tp: bool,
        edge_sp: bool,
        temporal_reuse: bool,
        spatial_reuse: bool,
    ) -> Result<i64> {
        let f = self.mapping.temporal_change_frequency(tensor)?.max(1);
        let a = self.mapping.mapped_size(tensor, false, false)?;
        let k = if edge_sp { self.num_edge_tiles } else { self.num_sp_tiles };
        if self.multicast_supported {
            if first_tp {
                let b = self.mapping.mapped_size(tensor, false, spatial_reuse)?;
                Ok(a + (k - 1) * b)
            } else {
                let c = self.mapping.mapped_size(tensor, temporal_reuse, false)?;
                let d = self.mapping.mapped_size(tensor, temporal_reuse, spatial_reuse)?;
                Ok((c + (k - 1) * d) / f)
            }
        } else {
            Ok(k * a / f)
        }
    }

    fn l2_reads_with_toggle(
        &self,
        tensor: &Tensor,
        temporal_reuse: bool,
        spatial_reuse: bool,
    ) -> Result<i64> {
        let first_tp_edge =
            self.spatial_l2_to_l1_traffic(tensor, true, true, temporal_reuse, spatial_reuse)?;
        let first_tp_steady =
            self.spatial_l2_to_l1_traffic(tensor, true, false, temporal_reuse, spatial_reuse)?;
        let steady_tp_edge =
            self.spatial_l2_to_l1_traffic(tensor, false, true, temporal_reuse, spatial_reuse)?;
        let steady_tp_steady =
            self.spatial_l2_to_l1_traffic(tensor, false, false, temporal_reuse, spatial_reuse)?;
        let first_tp_read = first_tp_edge + (self.num_spatial_foldings - 1) * first_tp_steady;
        let steady_tp_read = steady_tp_edge + (self.num_spatial_foldings - 1) * steady_tp_steady;
        Ok(first_tp_read + (self.num_temporal_iterations - 1) * steady_tp_read)
    }

    /// Total L2 reads for one tensor across a whole analysis, under full
    /// temporal and spatial reuse.
    pub fn l2_reads(&self, tensor: &Tensor) -> Result<i64> {
        self.l2_reads_with_toggle(tensor, true, true)
    }

    /// Assumes full output reuse: every element is written to L2 exactly
    /// once over the analysis.
    pub fn l2_writes(&self, tensor: &Tensor) -> Result<i64> {
        self.mapping.full_size(tensor)
    }

    pub fn l1_reads(&self, tensor: &Tensor) -> Result<i64> {
        let m = self.mapping.mapped_size(tensor, false, false)?;
        let steady = self.tile_size * self.num_sp_tiles * m;
        let edge = self.tile_size * self.num_edge_tiles * m;
        Ok(self.num_temporal_iterations * ((self.num_spatial_foldings - 1) * steady + edge))
    }

    pub fn l1_writes(&self, tensor: &Tensor) -> Result<i64> {
        let base = self.l2_reads_with_toggle(tensor, true, false)?;
        if self.multicast_supported {
            let numerator = self.mapping.mapped_size(tensor, false, false)?;
            let denominator = self.mapping.mapped_size(tensor, false, true)?.max(1);
            let multicast_factor = numerator / denominator;
            Ok(base * multicast_factor)
        } else {
            Ok(base)
        }
    }

    pub fn temporal_reuse_factor(&self, tensor: &Tensor) -> Result<f64> {
        let full = self.mapping.full_size(tensor)? as f64;
        if full == 0.0 {
            return Ok(0.0);
        }
        Ok(self.l1_reads(tensor)? as f64 / full)
    }

    pub fn spatial_reuse_factor(&self, tensor: &Tensor) -> Result<f64> {
        let reads = self.l2_reads(tensor)? as f64;
        if reads == 0.0 {
            return Ok(0.0);
        }
        Ok(self.l1_writes(tensor)? as f64 / reads)
    }
}
