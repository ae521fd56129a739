use std::collections::HashMap;

use crate::fields::{FieldMap, RecordError};
use crate::jobs::JobRecord;
use crate::query::{self, QueryError};

/// Field layout requested from the node query, one `|`-separated line per
/// node. The order here drives both the sinfo `--Format` argument and the
/// parsing of its output.
pub const NODE_FIELDS: &[&str] = &[
    "nodeaddr",
    "features_act",
    "cpus",
    "cpusstate",
    "cpusload",
    "sockets",
    "cores",
    "threads",
    "memory",
    "allocmem",
    "freemem",
    "disk",
    "statecompact",
];

/// One host as the scheduler reports it, plus the per-host job records
/// attached to it during report assembly. Jobs are only ever appended.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub name: String,
    pub sockets: u32,
    pub cores_per_socket: u32,
    pub threads_per_core: u32,
    pub state: String,
    pub online: bool,
    pub cpus_total: u32,
    pub cpus_alloc: u32,
    pub cpus_idle: u32,
    pub cpus_other: u32,
    /// The longest active-feature token, used as a processor label.
    pub processor: String,
    pub load: f64,
    pub mem_total_mb: u64,
    pub mem_alloc_mb: u64,
    pub mem_free_mb: u64,
    pub tmp_disk_mb: u64,
    pub jobs: Vec<JobRecord>,
}

impl NodeRecord {
    /// Builds a node record from one parsed query line.
    ///
    /// A node whose compact state contains "down" reports junk in its
    /// numeric columns, so it is synthesized fully offline without
    /// touching them. Online nodes must parse their CPU, memory, and disk
    /// columns; socket/core/thread counts degrade to 0 when unknown.
    pub fn from_fields(fields: &FieldMap) -> Result<Self, RecordError> {
        let name = fields.require("nodeaddr")?.to_string();
        let state = fields.get("statecompact").to_string();

        if state.contains("down") {
            return Ok(NodeRecord::offline(name, state));
        }

        let raw_cpu_state = fields.require("cpusstate")?;
        let (cpus_alloc, cpus_idle, cpus_other) =
            split_cpu_state(raw_cpu_state).ok_or_else(|| RecordError::BadValue {
                field: "cpusstate",
                value: raw_cpu_state.to_string(),
            })?;

        Ok(NodeRecord {
            name,
            sockets: fields.parse_or_default("sockets"),
            cores_per_socket: fields.parse_or_default("cores"),
            threads_per_core: fields.parse_or_default("threads"),
            state,
            online: true,
            cpus_total: fields.parse_required("cpus")?,
            cpus_alloc,
            cpus_idle,
            cpus_other,
            processor: processor_label(fields.get("features_act")),
            load: fields.parse_or_default("cpusload"),
            mem_total_mb: fields.parse_required("memory")?,
            mem_alloc_mb: fields.parse_required("allocmem")?,
            mem_free_mb: fields.parse_required("freemem")?,
            tmp_disk_mb: fields.parse_required("disk")?,
            jobs: Vec::new(),
        })
    }

    fn offline(name: String, state: String) -> Self {
        NodeRecord {
            name,
            sockets: 0,
            cores_per_socket: 0,
            threads_per_core: 0,
            state,
            online: false,
            cpus_total: 0,
            cpus_alloc: 0,
            cpus_idle: 0,
            cpus_other: 0,
            processor: "n/a".to_string(),
            load: -1.0,
            mem_total_mb: 0,
            mem_alloc_mb: 0,
            mem_free_mb: 0,
            tmp_disk_mb: 0,
            jobs: Vec::new(),
        }
    }

    /// Raw load divided by the CPU count; `None` when the node reports
    /// zero CPUs rather than a divide-by-zero.
    pub fn load_per_cpu(&self) -> Option<f64> {
        if self.cpus_total == 0 {
            None
        } else {
            Some(self.load / self.cpus_total as f64)
        }
    }
}

/// The "alloc/idle/other" triple from the node query.
fn split_cpu_state(raw: &str) -> Option<(u32, u32, u32)> {
    let mut parts = raw.split('/');
    let alloc = parts.next()?.trim().parse().ok()?;
    let idle = parts.next()?.trim().parse().ok()?;
    let other = parts.next()?.trim().parse().ok()?;
    Some((alloc, idle, other))
}

/// The longest comma-separated feature token, or "n/a" when the node
/// advertises none.
fn processor_label(features: &str) -> String {
    features
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .max_by_key(|token| token.len())
        .map(str::to_string)
        .unwrap_or_else(|| "n/a".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemScale {
    Binary,
    Metric,
}

/// Scales a megabyte count for display, stepping M -> G -> T while the
/// value still exceeds the divisor, to one decimal place.
pub fn scale_mem(megabytes: u64, scale: MemScale) -> String {
    const UNITS: [&str; 3] = ["M", "G", "T"];
    let divisor = match scale {
        MemScale::Binary => 1024.0,
        MemScale::Metric => 1000.0,
    };

    let mut value = megabytes as f64;
    let mut unit = 0;
    while value > divisor && unit < UNITS.len() - 1 {
        value /= divisor;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}

/// All known nodes for one report, keyed by host address.
#[derive(Debug, Default)]
pub struct NodeSet {
    pub nodes: HashMap<String, NodeRecord>,
}

/// Fetches the current node listing, optionally restricted to a hostlist
/// expression, and builds one record per distinct host address.
pub fn get_nodes(host_filter: Option<&str>) -> Result<NodeSet, QueryError> {
    let format = format!("--Format={}", query::format_arg(NODE_FIELDS));
    let mut args = vec!["--Node", "--noheader", format.as_str()];
    if let Some(filter) = host_filter {
        args.push("--nodes");
        args.push(filter);
    }

    let output = query::run_query("sinfo", &args)?;
    Ok(parse_node_lines(&output))
}

/// Parses the node query output, reporting and skipping malformed lines.
/// A node listed once per partition collapses to a single record.
pub fn parse_node_lines(output: &str) -> NodeSet {
    let mut nodes = HashMap::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(fields) = FieldMap::exact(NODE_FIELDS, line) else {
            eprintln!("gq-slurm: skipping node line with unexpected field count: {line}");
            continue;
        };
        match NodeRecord::from_fields(&fields) {
            Ok(node) => {
                nodes.insert(node.name.clone(), node);
            }
            Err(err) => {
                eprintln!(
                    "gq-slurm: skipping node '{}': {err}",
                    fields.get("nodeaddr")
                );
            }
        }
    }

    NodeSet { nodes }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONLINE_LINE: &str =
        "n01|icelake,ib,cpu-intel|64|32/32/0|12.34|2|16|2|256000|128000|128000|900000|mix|";
    const DOWN_LINE: &str = "n02|icelake|N/A|N/A|N/A|N/A|N/A|N/A|N/A|N/A|N/A|N/A|down*|";

    fn build(line: &str) -> Result<NodeRecord, RecordError> {
        NodeRecord::from_fields(&FieldMap::exact(NODE_FIELDS, line).unwrap())
    }

    #[test]
    fn test_online_node() {
        let node = build(ONLINE_LINE).unwrap();
        assert!(node.online);
        assert_eq!(node.cpus_total, 64);
        assert_eq!(node.cpus_alloc, 32);
        assert_eq!(node.cpus_idle, 32);
        assert_eq!(node.sockets, 2);
        assert_eq!(node.processor, "cpu-intel");
        assert_eq!(node.mem_total_mb, 256000);
        let load = node.load_per_cpu().unwrap();
        assert!((load - 12.34 / 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_down_node_is_zeroed() {
        let node = build(DOWN_LINE).unwrap();
        assert!(!node.online);
        assert_eq!(node.cpus_total, 0);
        assert_eq!(node.processor, "n/a");
        assert_eq!(node.load, -1.0);
        assert_eq!(node.load_per_cpu(), None);
        assert_eq!(node.state, "down*");
    }

    #[test]
    fn test_missing_address_is_fatal() {
        let line = "|icelake|64|32/32/0|12.34|2|16|2|256000|128000|128000|900000|mix|";
        assert!(matches!(
            build(line),
            Err(RecordError::MissingField("nodeaddr"))
        ));
    }

    #[test]
    fn test_bad_core_field_is_fatal_when_online() {
        let line = "n03|icelake|sixty-four|32/32/0|1.0|2|16|2|256000|128000|128000|900000|idle|";
        assert!(matches!(build(line), Err(RecordError::BadValue { .. })));
    }

    #[test]
    fn test_unknown_topology_defaults_to_zero() {
        let line = "n04|icelake|64|0/64/0|0.50|N/A|N/A|N/A|256000|0|256000|900000|idle|";
        let node = build(line).unwrap();
        assert_eq!(node.sockets, 0);
        assert_eq!(node.cores_per_socket, 0);
        assert_eq!(node.cpus_total, 64);
    }

    #[test]
    fn test_parse_node_lines_skips_bad_lines() {
        let output = format!("{ONLINE_LINE}\nnot|enough|fields\n{DOWN_LINE}\n");
        let set = parse_node_lines(&output);
        assert_eq!(set.nodes.len(), 2);
        assert!(set.nodes.contains_key("n01"));
        assert!(set.nodes.contains_key("n02"));
    }

    #[test]
    fn test_scale_mem() {
        assert_eq!(scale_mem(512, MemScale::Binary), "512.0M");
        assert_eq!(scale_mem(1024, MemScale::Binary), "1024.0M");
        assert_eq!(scale_mem(1025, MemScale::Binary), "1.0G");
        assert_eq!(scale_mem(256000, MemScale::Binary), "250.0G");
        assert_eq!(scale_mem(256000, MemScale::Metric), "256.0G");
        assert_eq!(scale_mem(2_500_000, MemScale::Metric), "2.5T");
    }
}
