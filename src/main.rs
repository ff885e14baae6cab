//! Command-line front end of the epsilon spatial join engine.

use clap::Parser;
use sjoin::config::{Algorithm, GridPolicy, JoinConfig, SortOrder, Traversal};
use sjoin::engine::{JoinSummary, SpatialJoin};
use sjoin::errors::JoinError;
use sjoin::report::append_log;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "sjoin", about = "Epsilon spatial join over binary 3D datasets")]
struct Arguments {
    /// Algorithm: 0 NL, 1 PS, 2 SGrid, 3 S3, 4 PBSM, 5 TOUCH.
    #[arg(short = 'a', default_value_t = 0)]
    algorithm: u32,

    /// Algorithm for joining the buckets (the local join; same tags).
    #[arg(short = 'J', default_value_t = 0)]
    local_join: u32,

    /// Leaf size for TOUCH; cell count per axis for SGrid and PBSM; level
    /// count for S3.
    #[arg(short = 'l', default_value_t = 100)]
    leaf_size: usize,

    /// Node fanout for TOUCH.
    #[arg(short = 'b', default_value_t = 2)]
    fanout: usize,

    /// Local grid cell count per axis inside TOUCH nodes.
    #[arg(short = 'g', default_value_t = 100)]
    local_cells: usize,

    /// Sort type: 0 none, 1 Hilbert, 2 center x, 3 low x (STR slot).
    #[arg(short = 't', default_value_t = 1)]
    sort: u32,

    /// Epsilon of the similarity join.
    #[arg(short = 'e', default_value_t = 0.5)]
    epsilon: f64,

    /// Dataset A path followed by dataset B path.
    #[arg(short = 'i', num_args = 2, value_names = ["A", "B"], required = true)]
    inputs: Vec<PathBuf>,

    /// Cap on the records loaded from A and B (0 = all).
    #[arg(short = 'n', num_args = 2, value_names = ["NA", "NB"], default_values_t = [0usize, 0usize])]
    limits: Vec<usize>,

    /// Tree traversal: 0 BU, 1 TD, 2 TDD (unsupported), 3 TDF.
    #[arg(short = 'y', default_value_t = 1)]
    traversal: u32,

    /// Local-grid resolution policy: 0 static, 1 dynamic-equal,
    /// 2 dynamic-flex.
    #[arg(short = 's', default_value_t = 2)]
    grid_policy: u32,

    /// Verbose output (0 or 1).
    #[arg(short = 'v', default_value_t = 0)]
    verbose: u32,

    /// Destination of the CSV performance log.
    #[arg(long = "log", default_value = "SJ.csv")]
    log: PathBuf,
}

fn build_config(arguments: &Arguments) -> Result<JoinConfig, JoinError> {
    Ok(JoinConfig {
        algorithm: Algorithm::from_tag(arguments.algorithm)?,
        local_join: Algorithm::from_tag(arguments.local_join)?,
        epsilon: arguments.epsilon,
        sort: SortOrder::from_tag(arguments.sort)?,
        traversal: Traversal::from_tag(arguments.traversal)?,
        grid_policy: GridPolicy::from_tag(arguments.grid_policy)?,
        leaf_size: arguments.leaf_size,
        fanout: arguments.fanout,
        local_cells: arguments.local_cells,
        resolution: arguments.leaf_size,
        s3_levels: arguments.leaf_size.clamp(1, 8),
        limit_a: arguments.limits[0],
        limit_b: arguments.limits[1],
        verbose: arguments.verbose == 1,
        log_path: Some(arguments.log.clone()),
        ..JoinConfig::default()
    })
}

fn print_summary(config: &JoinConfig, summary: &JoinSummary) {
    let stats = &summary.stats;
    if config.verbose {
        println!("\n================================");
        println!(
            "{} using {} (leaf {}, fanout {}, grid {})",
            config.algorithm_name(),
            config.local_join.name(),
            config.leaf_size,
            config.fanout,
            config.local_cells
        );
        println!("#A {} #B {}", stats.size_a, stats.size_b);
        let cross = (stats.size_a * stats.size_b).max(1) as f64;
        println!(
            "Compared # {} ({:.4}%)  max {}",
            stats.items_compared,
            100.0 * stats.items_compared as f64 / cross,
            stats.items_max_compared
        );
        println!(
            "Results {}  Duplicates {}  Selectivity {:.4}%",
            summary.results,
            summary.duplicates,
            100.0 * summary.results as f64 / cross
        );
        println!(
            "Filtered A {} B {}  add-filter {}",
            stats.filtered[0], stats.filtered[1], stats.add_filter
        );
        println!(
            "EmptyCells {:.2}%  MaxObj {}  AvgObj {:.2}  StdObj {:.2}",
            stats.percentage_empty, stats.max_mapped, stats.avg_per_cell, stats.std_per_cell
        );
        println!(
            "Times: total {:.4}s load {:.4}s sort {:.4}s partition {:.4}s build {:.4}s",
            stats.total.as_secs_f64(),
            stats.data_load.as_secs_f64(),
            stats.sorting.as_secs_f64(),
            stats.partition.as_secs_f64(),
            stats.building.as_secs_f64(),
        );
        println!(
            "       probe {:.4}s compare {:.4}s analyze {:.4}s dedup {:.4}s",
            stats.probing.as_secs_f64(),
            stats.comparing.as_secs_f64(),
            stats.analyzing.as_secs_f64(),
            stats.dedup.as_secs_f64(),
        );
        println!("Levels {}  Nodes {}", stats.levels, stats.total_nodes);
        println!(
            "Memory: VM {:.0} KB  RSS {:.0} KB",
            stats.mem_vm_kb, stats.mem_rss_kb
        );
        println!("================================");
    } else {
        println!(
            "{} done. Result: {}; Total time: {:.4}s; Memory: VM {:.0} KB RSS {:.0} KB",
            config.algorithm_name(),
            summary.results,
            stats.total.as_secs_f64(),
            stats.mem_vm_kb,
            stats.mem_rss_kb
        );
    }
}

fn run(arguments: &Arguments) -> Result<(), JoinError> {
    let config = build_config(arguments)?;
    let mut engine = SpatialJoin::new(config.clone())?;
    engine.load_files(&arguments.inputs[0], &arguments.inputs[1])?;
    let summary = engine.run()?;
    print_summary(&config, &summary);
    if let Some(log_path) = &config.log_path {
        let (file_a, file_b) = engine.file_names();
        append_log(log_path, &config, &summary.stats, file_a, file_b)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let arguments = match Arguments::try_parse() {
        Ok(arguments) => arguments,
        Err(err) => {
            // Help requests exit cleanly; everything else is a usage error.
            if err.kind() == clap::error::ErrorKind::DisplayHelp {
                print!("{err}");
                return ExitCode::SUCCESS;
            }
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(if arguments.verbose == 1 {
            Level::DEBUG
        } else {
            Level::WARN
        })
        .init();

    if let Err(err) = run(&arguments) {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
