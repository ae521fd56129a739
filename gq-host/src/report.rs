use chrono::Local;
use colored::Colorize;
use gq_slurm::hostlist::natural_cmp;
use gq_slurm::jobs::JobRecord;
use gq_slurm::nodes::{MemScale, NodeRecord, NodeSet, scale_mem};

const HEADER: [&str; 11] = [
    "HOSTNAME", "PROC", "NCPU", "NSOC", "NCOR", "NTHR", "LOAD", "MEMTOT", "MEMUSE", "DISK",
    "STATE",
];

/// Formats and prints the host summary: one line per host in natural name
/// order, with computed column widths, and (optionally) one indented line
/// per attached per-host job record.
pub fn print_report(nodes: &NodeSet, show_jobs: bool, scale: MemScale, no_color: bool) {
    println!(
        "Cluster host report, {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let mut names: Vec<&String> = nodes.nodes.keys().collect();
    names.sort_by(|a, b| natural_cmp(a, b));

    let rows: Vec<(Vec<String>, &NodeRecord)> = names
        .iter()
        .map(|name| {
            let node = &nodes.nodes[*name];
            (host_columns(node, scale), node)
        })
        .collect();

    // Pre-calculate all column widths
    let mut widths: Vec<usize> = HEADER.iter().map(|h| h.len()).collect();
    for (columns, _) in &rows {
        for (width, column) in widths.iter_mut().zip(columns) {
            *width = (*width).max(column.len());
        }
    }

    let header_line = HEADER
        .iter()
        .zip(&widths)
        .map(|(title, width)| format!("{title:<w$}", w = *width))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{header_line}");
    if show_jobs {
        println!("{}", job_header());
    }
    println!("{}", "-".repeat(header_line.len()));

    for (columns, node) in &rows {
        let mut line = String::new();
        for (index, (column, width)) in columns.iter().zip(&widths).enumerate() {
            if index == columns.len() - 1 {
                line.push_str(&paint_state(column, node.online, no_color));
            } else {
                line.push_str(&format!("{column:<w$} ", w = *width));
            }
        }
        println!("{line}");

        if show_jobs {
            for job in &node.jobs {
                println!("{}", job_line(job));
            }
        }
    }
}

/// One host's cells, in HEADER order. Down hosts zero every numeric field,
/// so they render as dashes instead of misleading zeros.
fn host_columns(node: &NodeRecord, scale: MemScale) -> Vec<String> {
    if !node.online {
        return vec![
            node.name.clone(),
            node.processor.clone(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
            node.state.clone(),
        ];
    }

    let load = match node.load_per_cpu() {
        Some(load) => format!("{load:.2}"),
        None => "-".to_string(),
    };

    vec![
        node.name.clone(),
        node.processor.clone(),
        node.cpus_total.to_string(),
        node.sockets.to_string(),
        node.cores_per_socket.to_string(),
        node.threads_per_core.to_string(),
        load,
        scale_mem(node.mem_total_mb, scale),
        scale_mem(node.mem_alloc_mb, scale),
        scale_mem(node.tmp_disk_mb, scale),
        node.state.clone(),
    ]
}

fn job_header() -> String {
    format!(
        "   {:>10} {:>6} {:<20} {:<12} {:^5} {:<20} {:>6} {:>5}",
        "JOBID", "TASK", "NAME", "USER", "ST", "START", "NTASK", "NCPU"
    )
}

fn job_line(job: &JobRecord) -> String {
    let task = if job.task_id.is_empty() {
        "-"
    } else {
        &job.task_id
    };
    format!(
        "   {:>10} {:>6} {:<20} {:<12} {:^5} {:<20} {:>6} {:>5}",
        job.job_id,
        task,
        truncate(&job.name, 20),
        truncate(&job.user, 12),
        job.state,
        job.start_time,
        job.ntasks,
        job.ncpus
    )
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut shortened: String = text.chars().take(max - 1).collect();
        shortened.push('+');
        shortened
    }
}

fn paint_state(state: &str, online: bool, no_color: bool) -> String {
    if no_color {
        return state.to_string();
    }
    let painted = if !online {
        state.red()
    } else if state.starts_with("idle") {
        state.green()
    } else if state.starts_with("alloc") {
        state.blue()
    } else {
        state.yellow()
    };
    painted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gq_slurm::fields::FieldMap;
    use gq_slurm::nodes::NODE_FIELDS;

    fn node(line: &str) -> NodeRecord {
        NodeRecord::from_fields(&FieldMap::exact(NODE_FIELDS, line).unwrap()).unwrap()
    }

    #[test]
    fn test_online_host_columns() {
        let node = node("n01|icelake|64|32/32/0|32.00|2|16|2|256000|128000|64000|900000|mix|");
        let columns = host_columns(&node, MemScale::Metric);
        assert_eq!(columns[0], "n01");
        assert_eq!(columns[2], "64");
        assert_eq!(columns[6], "0.50");
        assert_eq!(columns[7], "256.0G");
        assert_eq!(columns[10], "mix");
    }

    #[test]
    fn test_down_host_renders_dashes() {
        let node = node("n02|x|0|0/0/0|0|0|0|0|0|0|0|0|down*|");
        let columns = host_columns(&node, MemScale::Binary);
        assert_eq!(columns[1], "n/a");
        assert!(columns[2..10].iter().all(|cell| cell == "-"));
        assert_eq!(columns[10], "down*");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 20), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd+");
    }

    #[test]
    fn test_paint_state_plain() {
        assert_eq!(paint_state("idle", true, true), "idle");
    }
}
