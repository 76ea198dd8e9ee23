//! Fixed-order pipeline: parse the two input files, configure the mapping
//! analyzer, preprocess, then run the buffer and performance models and
//! assemble a report.
use std::path::Path;

use itertools::Itertools;
use log::{debug, info};

use crate::device::{HardwareConfig, NetworkOnChip};
use crate::error::Result;
use crate::helper::{bindings, parser};
use crate::ir::Tensor;
use crate::model::{BufferModel, MappingAnalyzer, Mode, PerformanceModel};

/// Hardware and algorithm knobs the orchestrator needs beyond the two
/// input files. Defaults match the values this crate's formulas were
/// validated against: 7 PEs, a bandwidth-32/1-hop/1-cycle NoC with
/// multicast, 9 ALUs per PE, reduction and implicit reduction on.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub hardware: HardwareConfig,
    pub num_alus_per_pe: i64,
    pub noc_bandwidth: u64,
    pub noc_hops: u64,
    pub noc_hop_latency: u64,
    pub noc_multicast_supported: bool,
    pub do_reduction_op: bool,
    pub do_implicit_reduction: bool,
    pub do_fg_sync: bool,
    pub mode: Mode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            hardware: HardwareConfig::new(7),
            num_alus_per_pe: 9,
            noc_bandwidth: 32,
            noc_hops: 1,
            noc_hop_latency: 1,
            noc_multicast_supported: true,
            do_reduction_op: true,
            do_implicit_reduction: true,
            do_fg_sync: false,
            mode: Mode::default(),
        }
    }
}

/// Per-tensor figures pulled out of the buffer model for the final report.
#[derive(Clone, Debug, serde::Serialize)]
pub struct TensorReport {
    pub name: String,
    pub full_size: i64,
    pub mapped_size: i64,
    pub l1_reads: i64,
    pub l1_writes: i64,
    pub l2_reads: i64,
    pub l2_writes: i64,
    pub temporal_reuse: f64,
    pub spatial_reuse: f64,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct AnalysisReport {
    pub num_temporal_iterations: i64,
    pub num_spatial_foldings: i64,
    pub l1_required_size: i64,
    pub l2_required_size: i64,
    pub tensors: Vec<TensorReport>,
    pub runtime_cycles: i64,
    pub energy: f64,
}

impl AnalysisReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// `l1_energy = (L1 reads + L1 writes) * 2.91`, `l2_energy = (L2 reads + L2
/// writes) * 32.2`, summed. An external collaborator, not part of the
/// buffer or performance models proper: nothing about it is analytical,
/// it's a fixed per-access energy coefficient from a characterized process.
pub fn estimate_energy(l1_reads: i64, l1_writes: i64, l2_reads: i64, l2_writes: i64) -> f64 {
    let l1_energy = (l1_reads + l1_writes) as f64 * 2.91;
    let l2_energy = (l2_reads + l2_writes) as f64 * 32.2;
    l1_energy + l2_energy
}

/// Runs the whole pipeline against files on disk and returns the report.
/// Tensor bindings come from `helper::bindings::convolution_bindings`, the
/// only computation this crate ships end to end, but any `Vec<Tensor>`
/// would work equally well against the same mapping/buffer/performance
/// calls.
pub fn run(
    dataflow_path: &Path,
    layer_path: &Path,
    config: &OrchestratorConfig,
) -> Result<AnalysisReport> {
    let dataflow_src = std::fs::read_to_string(dataflow_path)?;
    let layer_src = std::fs::read_to_string(layer_path)?;
    let directives = parser::parse_dataflow(dataflow_path, &dataflow_src)?;
    let loops = parser::parse_layer(layer_path, &layer_src)?;
    info!(
        "parsed {} directives and {} loops from {} and {}",
        directives.len(),
        loops.len(),
        dataflow_path.display(),
        layer_path.display()
    );

    let tensors = bindings::convolution_bindings();
    run_with_tensors(directives, loops, &tensors, config)
}

/// Same pipeline as `run`, but over an already-built directive/loop table
/// and caller-supplied tensor bindings. Library callers that don't want
/// the convolution bindings, or that built their tables directly rather
/// than parsing files, should call this instead.
pub fn run_with_tensors(
    directives: crate::ir::DirectiveTable,
    loops: crate::ir::LoopTable,
    tensors: &[Tensor],
    config: &OrchestratorConfig,
) -> Result<AnalysisReport> {
    debug!(
        "directive order: {}",
        directives.iter().map(|d| d.to_string()).join(" | ")
    );
    let num_pes = i64::from(config.hardware.num_pes);
    let mut mapping = MappingAnalyzer::new(directives, loops, num_pes, config.mode);
    mapping.preprocess()?;
    info!(
        "preprocessed: {} temporal iterations, {} spatial foldings",
        mapping.num_temporal_iterations()?,
        mapping.num_spatial_foldings()?
    );

    let noc = NetworkOnChip::new(
        config.noc_bandwidth,
        config.noc_hops,
        config.noc_hop_latency,
        config.noc_multicast_supported,
    );
    let buffer = BufferModel::new(&mapping, &noc, num_pes, true)?;
    let perf = PerformanceModel::new(
        &mapping,
        &buffer,
        &noc,
        config.mode,
        config.do_reduction_op,
        config.do_implicit_reduction,
        config.do_fg_sync,
    );

    let output = bindings::find_tensor(tensors, "output")?.clone();
    let inputs: Vec<Tensor> = tensors
        .iter()
        .filter(|t| t.name != output.name)
        .cloned()
        .collect();
    let outputs = vec![output];

    let mut tensor_reports = Vec::with_capacity(tensors.len());
    let (mut l1_reads_total, mut l1_writes_total) = (0i64, 0i64);
    let (mut l2_reads_total, mut l2_writes_total) = (0i64, 0i64);
    for t in tensors {
        let l1_reads = buffer.l1_reads(t)?;
        let l1_writes = buffer.l1_writes(t)?;
        let l2_reads = buffer.l2_reads(t)?;
        let l2_writes = buffer.l2_writes(t)?;
        l1_reads_total += l1_reads;
        l1_writes_total += l1_writes;
        l2_reads_total += l2_reads;
        l2_writes_total += l2_writes;
        tensor_reports.push(TensorReport {
            name: t.name.clone(),
            full_size: mapping.full_size(t)?,
            mapped_size: mapping.mapped_size(t, false, false)?,
            l1_reads,
            l1_writes,
            l2_reads,
            l2_writes,
            temporal_reuse: buffer.temporal_reuse_factor(t)?,
            spatial_reuse: buffer.spatial_reuse_factor(t)?,
        });
    }

    let runtime_cycles = perf.runtime(&inputs, &outputs, config.num_alus_per_pe, true)?;
    let energy = estimate_energy(
        l1_reads_total,
        l1_writes_total,
        l2_reads_total,
        l2_writes_total,
    );

    let report = AnalysisReport {
        num_temporal_iterations: mapping.num_temporal_iterations()?,
        num_spatial_foldings: mapping.num_spatial_foldings()?,
        l1_required_size: buffer.l1_required_size(tensors)?,
        l2_required_size: buffer.l2_required_size(tensors)?,
        tensors: tensor_reports,
        runtime_cycles,
        energy,
    };
    info!(
        "runtime={} cycles, energy={:.2} (MAC-normalized {:.2})",
        report.runtime_cycles,
        report.energy,
        report.energy / 1.73
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Directive, DirectiveTable, Loop, LoopTable};

    fn output_stationary_tables() -> (DirectiveTable, LoopTable) {
        let mut loops = LoopTable::new();
        loops.push(Loop::new("K", 16));
        loops.push(Loop::new("C", 16));
        loops.push(Loop::new("R", 3));
        loops.push(Loop::new("S", 3));
        loops.push(Loop::new("Y", 8));
        loops.push(Loop::new("X", 8));
        let mut directives = DirectiveTable::new();
        directives.push(Directive::TemporalMap { var: "K".into(), size: 1, offset: 1 });
        directives.push(Directive::TemporalMap { var: "C".into(), size: 16, offset: 16 });
        directives.push(Directive::TemporalMap { var: "R".into(), size: 3, offset: 3 });
        directives.push(Directive::TemporalMap { var: "S".into(), size: 3, offset: 3 });
        directives.push(Directive::SpatialMap {
            var: "Y".into(),
            size: 1,
            offset: 1,
            num_components: 1,
        });
        directives.push(Directive::TemporalMap { var: "X".into(), size: 1, offset: 1 });
        (directives, loops)
    }

    #[test]
    fn full_pipeline_produces_a_positive_runtime_and_energy() {
        let (directives, loops) = output_stationary_tables();
        let config = OrchestratorConfig {
            hardware: crate::device::HardwareConfig::new(8),
            ..OrchestratorConfig::default()
        };
        let report = run_with_tensors(
            directives,
            loops,
            &bindings::convolution_bindings(),
            &config,
        )
        .unwrap();
        assert_eq!(report.tensors.len(), 3);
        assert!(report.runtime_cycles > 0);
        assert!(report.energy > 0.0);
    }

    #[test]
    fn missing_dataflow_file_is_an_io_error() {
        let config = OrchestratorConfig::default();
        let err = run(
            Path::new("/nonexistent/dataflow.m"),
            Path::new("/nonexistent/layer.m"),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::ModelError::Io(_)));
    }
}
