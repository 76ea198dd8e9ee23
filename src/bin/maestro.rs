//! Command-line entry point: wires `structopt`-parsed flags into
//! `explorer::orchestrator::run` and prints the resulting report.
use std::path::PathBuf;
use std::process;

use structopt::StructOpt;

use maestro_model::device::HardwareConfig;
use maestro_model::explorer::{self, OrchestratorConfig};
use maestro_model::model::Mode;

#[derive(StructOpt)]
#[structopt(
    name = "maestro",
    about = "Analytical cost model for dataflow-accelerator tensor mappings"
)]
struct Opt {
    #[structopt(long = "dataflow-file", default_value = "data/dataflow/maeri.m")]
    dataflow_file: PathBuf,

    #[structopt(long = "layer-file", default_value = "data/layer/vgg16_conv1.m")]
    layer_file: PathBuf,

    #[structopt(long = "num-pes", default_value = "7")]
    num_pes: u32,

    #[structopt(long = "num-pe-alus", default_value = "9")]
    num_pe_alus: i64,

    #[structopt(long = "noc-bw", default_value = "32")]
    noc_bw: u64,

    #[structopt(long = "noc-hops", default_value = "1")]
    noc_hops: u64,

    #[structopt(long = "noc-hop-latency", default_value = "1")]
    noc_hop_latency: u64,

    #[structopt(long = "noc-mc-support", parse(try_from_str), default_value = "true")]
    noc_mc_support: bool,

    #[structopt(long = "do-reduction-op", parse(try_from_str), default_value = "true")]
    do_reduction_op: bool,

    #[structopt(long = "do-implicit-reduction", parse(try_from_str), default_value = "true")]
    do_implicit_reduction: bool,

    #[structopt(long = "do-fg-sync", parse(try_from_str), default_value = "false")]
    do_fg_sync: bool,

    /// Use the corrected ("strict") readings of the three documented
    /// analyzer quirks instead of the default bug-for-bug ("compat") mode.
    #[structopt(long = "strict-quirks")]
    strict_quirks: bool,

    /// Print the report as JSON instead of the human-readable table.
    #[structopt(long = "json")]
    json: bool,
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    let config = OrchestratorConfig {
        hardware: HardwareConfig::new(opt.num_pes),
        num_alus_per_pe: opt.num_pe_alus,
        noc_bandwidth: opt.noc_bw,
        noc_hops: opt.noc_hops,
        noc_hop_latency: opt.noc_hop_latency,
        noc_multicast_supported: opt.noc_mc_support,
        do_reduction_op: opt.do_reduction_op,
        do_implicit_reduction: opt.do_implicit_reduction,
        do_fg_sync: opt.do_fg_sync,
        mode: if opt.strict_quirks {
            Mode::Strict
        } else {
            Mode::Compat
        },
    };

    match explorer::run(&opt.dataflow_file, &opt.layer_file, &config) {
        Ok(report) if opt.json => match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: failed to serialize report: {}", e);
                process::exit(1);
            }
        },
        Ok(report) => {
            println!("temporal iterations: {}", report.num_temporal_iterations);
            println!("spatial foldings:    {}", report.num_spatial_foldings);
            println!("L1 required size:    {}", report.l1_required_size);
            println!("L2 required size:    {}", report.l2_required_size);
            for t in &report.tensors {
                println!(
                    "  {:<8} full={:<10} mapped={:<8} l1_rd={:<10} l1_wr={:<10} l2_rd={:<10} l2_wr={:<10} tr={:.3} sr={:.3}",
                    t.name,
                    t.full_size,
                    t.mapped_size,
                    t.l1_reads,
                    t.l1_writes,
                    t.l2_reads,
                    t.l2_writes,
                    t.temporal_reuse,
                    t.spatial_reuse,
                );
            }
            println!("runtime (cycles):    {}", report.runtime_cycles);
            println!("energy estimate:     {:.2}", report.energy);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}
