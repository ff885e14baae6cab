//! ## Performance Log
//!
//! Appends one CSV row of engine metrics per run. The first write to a log
//! file also writes the header row. The log is advisory output for
//! benchmarking sessions, not a stable interface.

use crate::config::JoinConfig;
use crate::engine::JoinStats;
use crate::errors::JoinError;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::debug;

fn seconds(duration: std::time::Duration) -> f64 {
    duration.as_secs_f64()
}

/// Appends the metrics of one finished run to the CSV log at `path`.
pub fn append_log(
    path: &Path,
    config: &JoinConfig,
    stats: &JoinStats,
    file_a: Option<&Path>,
    file_b: Option<&Path>,
) -> Result<(), JoinError> {
    let needs_header = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    if needs_header {
        let mut header = String::from(
            "algorithm,local_join,epsilon,size_a,size_b,file_a,file_b,\
             fanout,leaf_size,resolution,local_cells,\
             compared,compared_max,hash_probes,duplicates,results,\
             filtered_a,filtered_b,add_filter,\
             t_load,t_init,t_sort,t_partition,t_build,t_grid,t_probe,t_compare,\
             t_analyze,t_dedup,t_total,\
             empty_cells_pct,max_obj,avg_obj,std_obj,rep_a,rep_b,levels,\
             mem_vm_kb,mem_rss_kb",
        );
        for side in ["a", "b"] {
            for level in 0..10 {
                header.push_str(&format!(",l{level}_assigned_{side}"));
            }
        }
        for side in ["a", "b"] {
            for level in 0..10 {
                header.push_str(&format!(",l{level}_avg_{side}"));
            }
        }
        writeln!(file, "{header}")?;
    }

    let mut row = format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.3},{},{:.3},{:.3},{:.3},{:.3},{},{:.1},{:.1}",
        config.algorithm_name(),
        config.local_join.name(),
        config.epsilon,
        stats.size_a,
        stats.size_b,
        file_a.map(|p| p.display().to_string()).unwrap_or_default(),
        file_b.map(|p| p.display().to_string()).unwrap_or_default(),
        config.fanout,
        config.leaf_size,
        config.resolution,
        config.local_cells,
        stats.items_compared,
        stats.items_max_compared,
        stats.hash_probes,
        stats.duplicates,
        stats.results,
        stats.filtered[0],
        stats.filtered[1],
        stats.add_filter,
        seconds(stats.data_load),
        seconds(stats.initialize),
        seconds(stats.sorting),
        seconds(stats.partition),
        seconds(stats.building),
        seconds(stats.grid_build),
        seconds(stats.probing),
        seconds(stats.comparing),
        seconds(stats.analyzing),
        seconds(stats.dedup),
        seconds(stats.total),
        stats.percentage_empty,
        stats.max_mapped,
        stats.avg_per_cell,
        stats.std_per_cell,
        stats.rep_a,
        stats.rep_b,
        stats.levels,
        stats.mem_vm_kb,
        stats.mem_rss_kb,
    );
    for side in 0..2 {
        for level in 0..10 {
            row.push_str(&format!(",{}", stats.level_assigned[side][level]));
        }
    }
    for side in 0..2 {
        for level in 0..10 {
            row.push_str(&format!(",{:.4}", stats.level_avg[side][level]));
        }
    }
    writeln!(file, "{row}")?;
    debug!("Appended performance log row to {}", path.display());
    Ok(())
}
