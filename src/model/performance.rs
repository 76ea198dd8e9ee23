//! Closed-form runtime: compute delay plus NoC delay across the four
//! first/steady temporal x steady/edge spatial phases.
use crate::device::NetworkOnChip;
use crate::error::Result;
use crate::ir::Tensor;
use crate::model::{BufferModel, Mode};

use super::mapping::MappingAnalyzer;

/// Runtime and op-count formulas for one analysis.
pub struct PerformanceModel<'a> {
    mapping: &'a MappingAnalyzer,
    buffer: &'a BufferModel<'a>,
    noc: &'a NetworkOnChip,
    mode: Mode,
    reduction: bool,
    same_cycle_reduction: bool,
    fine_grained_sync: bool,
}

impl<'a> PerformanceModel<'a> {
    pub fn new(
        mapping: &'a MappingAnalyzer,
        buffer: &'a BufferModel<'a>,
        noc: &'a NetworkOnChip,
        mode: Mode,
        reduction: bool,
        same_cycle_reduction: bool,
        fine_grained_sync: bool,
    ) -> Self {
        PerformanceModel {
            mapping,
            buffer,
            noc,
            mode,
            reduction,
            same_cycle_reduction,
            fine_grained_sync,
        }
    }

    /// Ops executed per PE over one pass of `tensors`.
    ///
    /// `cartesian` multiplies every tensor's mapped size together (a full
    /// cross product of the input spaces); the non-cartesian path instead
    /// keeps the largest map as the op count and folds the rest into a
    /// separate multiplier, which the reduction adjustment below then
    /// applies to.
    pub fn num_ops_per_pe(&self, tensors: &[Tensor], cartesian: bool) -> Result<i64> {
        if cartesian {
            let mut product = 1i64;
            for t in tensors {
                product *= self.mapping.mapped_size(t, false, false)?;
            }
            return Ok(self.reduction_adjust(product, 1));
        }
        let mut num_ops = 1i64;
        let mut mult = 1i64;
        for t in tensors {
            let m = self.mapping.mapped_size(t, false, false)?;
            if m > num_ops {
                mult = num_ops;
                num_ops = m;
            } else {
                mult *= m;
            }
        }
        Ok(self.reduction_adjust(num_ops, mult))
    }

    fn reduction_adjust(&self, num_ops: i64, mult: i64) -> i64 {
        if self.reduction && !self.same_cycle_reduction {
            2 * num_ops * mult - 1
        } else {
            num_ops
        }
    }

    fn phase_delay(
        &self,
        accum: &mut i64,
        inputs: &[Tensor],
        first_tp: bool,
        edge_sp: bool,
        compute_delay: i64,
        l1_to_l2_noc: i64,
        latency_hiding: bool,
    ) -> Result<i64> {
        for t in inputs {
            let f = self.mapping.temporal_change_frequency(t)?.max(1);
            *accum += self
                .buffer
                .spatial_l2_to_l1_traffic(t, first_tp, edge_sp, false, false)?
                / f;
        }
        let d2 = self.noc.outstanding_delay((*accum).max(0) as u64) as i64;
        Ok(if latency_hiding {
            std::cmp::max(d2, l1_to_l2_noc + compute_delay)
        } else {
            d2 + compute_delay + l1_to_l2_noc
        })
    }

    /// End-to-end runtime in cycles for the coarse-grained-sync path.
    /// `fine_grained_sync` is reserved and always returns 0; no per-element
    /// overlap model is implemented for it.
    pub fn runtime(
        &self,
        inputs: &[Tensor],
        outputs: &[Tensor],
        num_alus_per_pe: i64,
        latency_hiding: bool,
    ) -> Result<i64> {
        if self.fine_grained_sync {
            return Ok(0);
        }

        let compute_delay = std::cmp::max(
            1,
            self.num_ops_per_pe(inputs, false)? / std::cmp::max(1, num_alus_per_pe),
        );

        let mut init_traffic = 0i64;
        for t in inputs {
            init_traffic += self
                .buffer
                .spatial_l2_to_l1_traffic(t, true, true, true, false)?;
        }
        let init_noc = self.noc.outstanding_delay(init_traffic.max(0) as u64) as i64;
        let mut runtime = init_noc;

        let mut l1_to_l2_traffic = 0i64;
        for t in outputs {
            l1_to_l2_traffic += self.buffer.spatial_l1_to_l2_traffic(t, false, true, true)?;
        }
        let l1_to_l2_noc = self.noc.outstanding_delay(l1_to_l2_traffic.max(0) as u64) as i64;

        let nsf = self.buffer.num_spatial_foldings();
        let ntf = self.buffer.num_temporal_iterations();

        // Phases (a), (c) and (d) share one accumulator that is never reset
        // between them in Mode::Compat. Mode::Strict resets it before each
        // phase instead. Phase (b) always gets a fresh accumulator.
        let mut chain_traffic = 0i64;

        if nsf > 2 {
            let iter_delay = self.phase_delay(
                &mut chain_traffic,
                inputs,
                true,
                false,
                compute_delay,
                l1_to_l2_noc,
                latency_hiding,
            )?;
            runtime += (nsf - 2) * iter_delay;
        }

        {
            let mut b_traffic = 0i64;
            let iter_delay = self.phase_delay(
                &mut b_traffic,
                inputs,
                true,
                true,
                compute_delay,
                l1_to_l2_noc,
                latency_hiding,
            )?;
            runtime += iter_delay;
        }

        if self.mode == Mode::Strict {
            chain_traffic = 0;
        }
        {
            let iter_delay = self.phase_delay(
                &mut chain_traffic,
                inputs,
                false,
                false,
                compute_delay,
                l1_to_l2_noc,
                latency_hiding,
            )?;
            runtime += (ntf - 1) * (nsf - 1) * iter_delay;
        }

        if self.mode == Mode::Strict {
            chain_traffic = 0;
        }
        {
            let iter_delay = self.phase_delay(
                &mut chain_traffic,
                inputs,
                false,
                true,
                compute_delay,
                l1_to_l2_noc,
                latency_hiding,
            )?;
            runtime += (ntf - 1) * iter_delay;
        }

        Ok(runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Directive, DirectiveTable, Loop, LoopTable};

    fn trivial() -> (MappingAnalyzer, NetworkOnChip) {
        let mut loops = LoopTable::new();
        for v in ["K", "C", "R", "S", "Y", "X"] {
            loops.push(Loop::new(v, 1));
        }
        let mut directives = DirectiveTable::new();
        directives.push(Directive::SpatialMap {
            var: "K".into(),
            size: 1,
            offset: 1,
            num_components: 1,
        });
        let mut a = MappingAnalyzer::new(directives, loops, 1, Mode::Compat);
        a.preprocess().unwrap();
        (a, NetworkOnChip::new(32, 1, 1, true))
    }

    #[test]
    fn trivial_scenario_runtime_is_init_plus_one_edge_phase() {
        let (a, noc) = trivial();
        let buffer = BufferModel::new(&a, &noc, 1, true).unwrap();
        let perf = PerformanceModel::new(&a, &buffer, &noc, Mode::Compat, true, true, false);
        let weight = Tensor::new("weight", vec!["K".into(), "C".into(), "R".into(), "S".into()]);
        let output = Tensor::new("output", vec!["K".into(), "Y".into(), "X".into()]);
        let runtime = perf.runtime(&[weight], &[output], 9, true).unwrap();
        assert!(runtime > 0);
    }

    #[test]
    fn fine_grained_sync_returns_zero() {
        let (a, noc) = trivial();
        let buffer = BufferModel::new(&a, &noc, 1, true).unwrap();
        let perf = PerformanceModel::new(&a, &buffer, &noc, Mode::Compat, true, true, true);
        let weight = Tensor::new("weight", vec!["K".into()]);
        let output = Tensor::new("output", vec!["K".into()]);
        assert_eq!(perf.runtime(&[weight], &[output], 9, true).unwrap(), 0);
    }

    #[test]
    fn num_ops_per_pe_cartesian_multiplies_all_tensors() {
        let (a, noc) = trivial();
        let buffer = BufferModel::new(&a, &noc, 1, true).unwrap();
        let perf = PerformanceModel::new(&a, &buffer, &noc, Mode::Compat, false, true, false);
        let weight = Tensor::new("weight", vec!["K".into(), "C".into()]);
        let input = Tensor::new("input", vec!["C".into()]);
        let ops = perf.num_ops_per_pe(&[weight, input], true).unwrap();
        assert_eq!(ops, 1);
    }
}
