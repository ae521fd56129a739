use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::fields::{FieldMap, RecordError};
use crate::hostlist;
use crate::nodes::NodeSet;
use crate::query::{self, QueryError};

/// Field layout requested from the queue query, one `|`-separated line per
/// (job, task) pair. The name comes last because it may itself contain the
/// delimiter; the line split is capped to this tuple's length.
pub const JOB_FIELDS: &[&str] = &[
    "batchhost",
    "batchflag",
    "nodelist",
    "jobid",
    "arraytaskid",
    "priority",
    "username",
    "statecompact",
    "starttime",
    "partition",
    "cpuspertask",
    "numtasks",
    "numnodes",
    "numcpus",
    "sockets",
    "cores",
    "threads",
    "taskspercore",
    "taskspernode",
    "taskspersocket",
    "name",
];

/// One (job, task) pair from the queue listing. The resource counts are
/// job-wide totals until [`distribute`] narrows them to a single host.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_id: String,
    /// Empty unless the job is an array member.
    pub task_id: String,
    pub batch_host: String,
    pub batch: bool,
    pub hosts: Vec<String>,
    pub priority: String,
    pub name: String,
    pub user: String,
    pub state: String,
    pub start_time: String,
    pub partition: String,
    pub cpus_per_task: u32,
    pub ntasks: u32,
    pub nnodes: u32,
    pub ncpus: u32,
    pub sockets: u32,
    pub cores: u32,
    pub threads: u32,
    pub tasks_per_core: u32,
    pub tasks_per_node: u32,
    pub tasks_per_socket: u32,
}

impl JobRecord {
    /// Builds a job record from one parsed queue line. Only the job id is
    /// mandatory; the scheduler legitimately omits unrequested resource
    /// dimensions, which default to 0. The node list goes straight through
    /// the hostlist expander, and a malformed one fails this line only.
    pub fn from_fields(fields: &FieldMap) -> Result<Self, RecordError> {
        let job_id = fields.require("jobid")?.to_string();

        let raw_task = fields.get("arraytaskid");
        let task_id = if raw_task.eq_ignore_ascii_case("N/A") {
            String::new()
        } else {
            raw_task.to_string()
        };

        Ok(JobRecord {
            job_id,
            task_id,
            batch_host: fields.get("batchhost").to_string(),
            batch: fields.flag("batchflag"),
            hosts: hostlist::expand(fields.get("nodelist"))?,
            priority: fields.get("priority").to_string(),
            name: fields.get("name").to_string(),
            user: fields.get("username").to_string(),
            state: fields.get("statecompact").to_string(),
            start_time: fields.get("starttime").to_string(),
            partition: fields.get("partition").to_string(),
            cpus_per_task: fields.parse_or_default("cpuspertask"),
            ntasks: fields.parse_or_default("numtasks"),
            nnodes: fields.parse_or_default("numnodes"),
            ncpus: fields.parse_or_default("numcpus"),
            sockets: fields.parse_or_default("sockets"),
            cores: fields.parse_or_default("cores"),
            threads: fields.parse_or_default("threads"),
            tasks_per_core: fields.parse_or_default("taskspercore"),
            tasks_per_node: fields.parse_or_default("taskspernode"),
            tasks_per_socket: fields.parse_or_default("taskspersocket"),
        })
    }
}

/// Source of the per-job detail text (`scontrol show job -d`). A trait so
/// the distributor can be exercised without a live scheduler.
pub trait DetailSource {
    fn job_detail(&mut self, job_id: &str) -> Result<String, QueryError>;
}

pub struct ScontrolDetail;

impl DetailSource for ScontrolDetail {
    fn job_detail(&mut self, job_id: &str) -> Result<String, QueryError> {
        query::run_query("scontrol", &["show", "job", "-d", job_id])
    }
}

/// Parses `Nodes=<hostlist> CPU_IDs=<rangelist>` lines from a job's detail
/// block into a host -> CPU count map. When one line groups several hosts,
/// the expanded CPU-ID count is divided among them, any remainder going to
/// the earliest hosts so no CPU is dropped. Unparseable lines are dropped;
/// the caller tolerates a partial or empty map.
pub fn parse_cpu_ids(detail: &str) -> HashMap<String, u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"Nodes=(\S+)\s+CPU_IDs=([0-9,\-]+)")
            .expect("failed to compile detail-line regex")
    });

    let mut cpus_by_host = HashMap::new();
    for caps in re.captures_iter(detail) {
        let Ok(hosts) = hostlist::expand(&caps[1]) else {
            continue;
        };
        let Ok(ids) = hostlist::expand_rangelist(&caps[2], "") else {
            continue;
        };
        if hosts.is_empty() {
            continue;
        }
        let base = (ids.len() / hosts.len()) as u32;
        let extra = ids.len() % hosts.len();
        for (index, host) in hosts.into_iter().enumerate() {
            cpus_by_host.insert(host, base + u32::from(index < extra));
        }
    }
    cpus_by_host
}

/// Turns one job covering N hosts into N per-host records whose task/CPU
/// counts reflect each host's actual share; the queue listing only reports
/// job-wide totals.
///
/// A single-host (or hostless) job is returned as-is, by move. When the
/// job requested a uniform tasks-per-node count that fixed share is used
/// directly; otherwise the scheduler is asked once for the job's per-node
/// CPU-ID assignments. A host the detail block never mentions gets
/// 0/unknown rather than failing the report. Consuming the job means each
/// one is distributed exactly once.
pub fn distribute(job: JobRecord, detail: &mut dyn DetailSource) -> Vec<JobRecord> {
    if job.hosts.len() <= 1 {
        return vec![job];
    }

    if job.tasks_per_node > 0 {
        return job
            .hosts
            .iter()
            .map(|host| {
                let mut per_host = job.clone();
                per_host.hosts = vec![host.clone()];
                per_host.ntasks = job.tasks_per_node;
                per_host
            })
            .collect();
    }

    let cpus_by_host = match detail.job_detail(&job.job_id) {
        Ok(text) => parse_cpu_ids(&text),
        Err(err) => {
            eprintln!(
                "gq-slurm: detail query for job {} failed: {err}",
                job.job_id
            );
            HashMap::new()
        }
    };

    job.hosts
        .iter()
        .map(|host| {
            let cpus = cpus_by_host.get(host).copied().unwrap_or(0);
            let mut per_host = job.clone();
            per_host.hosts = vec![host.clone()];
            per_host.ntasks = cpus;
            per_host.ncpus = cpus;
            per_host
        })
        .collect()
}

/// Fetches the current queue listing, one record per (job, task) pair.
pub fn get_jobs() -> Result<Vec<JobRecord>, QueryError> {
    let format = format!("--Format={}", query::format_arg(JOB_FIELDS));
    let output = query::run_query("squeue", &["--noheader", "--array", format.as_str()])?;
    Ok(parse_job_lines(&output))
}

/// Parses the queue query output, reporting and skipping malformed lines
/// so one bad job never sinks the report.
pub fn parse_job_lines(output: &str) -> Vec<JobRecord> {
    let mut jobs = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(fields) = FieldMap::capped(JOB_FIELDS, line) else {
            eprintln!("gq-slurm: skipping job line with too few fields: {line}");
            continue;
        };
        match JobRecord::from_fields(&fields) {
            Ok(job) => jobs.push(job),
            Err(err) => {
                eprintln!("gq-slurm: skipping job '{}': {err}", fields.get("jobid"));
            }
        }
    }

    jobs
}

/// Joins distributed per-host job records onto their owning nodes.
/// Records for hosts outside the node set are dropped without complaint:
/// the node may have been excluded by a host filter, and pending jobs have
/// no host at all yet.
pub fn attach_jobs(nodes: &mut NodeSet, jobs: Vec<JobRecord>, detail: &mut dyn DetailSource) {
    for job in jobs {
        for per_host in distribute(job, detail) {
            let Some(host) = per_host.hosts.first().cloned() else {
                continue;
            };
            if let Some(node) = nodes.nodes.get_mut(&host) {
                node.jobs.push(per_host);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{NODE_FIELDS, NodeRecord, parse_node_lines};

    struct StubDetail {
        text: String,
        calls: u32,
    }

    impl StubDetail {
        fn new(text: &str) -> Self {
            StubDetail {
                text: text.to_string(),
                calls: 0,
            }
        }
    }

    impl DetailSource for StubDetail {
        fn job_detail(&mut self, _job_id: &str) -> Result<String, QueryError> {
            self.calls += 1;
            Ok(self.text.clone())
        }
    }

    fn job_line(nodelist: &str, tasks_per_node: &str) -> String {
        format!(
            "n01|1|{nodelist}|1234|N/A|0.99|alice|R|2026-08-20T10:00:00|batch\
             |1|8|2|8|0|0|0|0|{tasks_per_node}|0|bench|run|"
        )
    }

    fn build(line: &str) -> JobRecord {
        JobRecord::from_fields(&FieldMap::capped(JOB_FIELDS, line).unwrap()).unwrap()
    }

    #[test]
    fn test_job_record_from_line() {
        let job = build(&job_line("n[01-02]", "4"));
        assert_eq!(job.job_id, "1234");
        assert_eq!(job.task_id, "");
        assert!(job.batch);
        assert_eq!(job.hosts, vec!["n01", "n02"]);
        assert_eq!(job.user, "alice");
        assert_eq!(job.ntasks, 8);
        assert_eq!(job.tasks_per_node, 4);
        // The trailing name field kept its embedded delimiter.
        assert_eq!(job.name, "bench|run");
        // Unrequested dimensions default to zero.
        assert_eq!(job.sockets, 0);
    }

    #[test]
    fn test_missing_job_id_is_fatal() {
        let line = "n01|1|n01||N/A|0.99|alice|R|now|batch|1|1|1|1|0|0|0|0|0|0|x|";
        let fields = FieldMap::capped(JOB_FIELDS, line).unwrap();
        assert!(matches!(
            JobRecord::from_fields(&fields),
            Err(RecordError::MissingField("jobid"))
        ));
    }

    #[test]
    fn test_malformed_nodelist_fails_the_line() {
        let fields_line = job_line("n[1-", "0");
        let fields = FieldMap::capped(JOB_FIELDS, &fields_line).unwrap();
        assert!(matches!(
            JobRecord::from_fields(&fields),
            Err(RecordError::BadHostlist(_))
        ));
    }

    #[test]
    fn test_single_host_job_is_returned_by_move() {
        let job = build(&job_line("n01", "0"));
        let mut detail = StubDetail::new("");
        let per_host = distribute(job.clone(), &mut detail);
        assert_eq!(per_host, vec![job]);
        assert_eq!(detail.calls, 0);
    }

    #[test]
    fn test_uniform_tasks_per_node_distribution() {
        let job = build(&job_line("h1,h2", "4"));
        let mut detail = StubDetail::new("");
        let per_host = distribute(job, &mut detail);
        assert_eq!(per_host.len(), 2);
        for (record, host) in per_host.iter().zip(["h1", "h2"]) {
            assert_eq!(record.hosts, vec![host]);
            assert_eq!(record.ntasks, 4);
        }
        // The cheap path never issues a detail query.
        assert_eq!(detail.calls, 0);
    }

    #[test]
    fn test_detail_fallback_distribution() {
        let job = build(&job_line("h1,h2", "0"));
        let mut detail = StubDetail::new("   Nodes=h1,h2 CPU_IDs=0-3,4-7 Mem=8192\n");
        let per_host = distribute(job, &mut detail);
        assert_eq!(detail.calls, 1);
        assert_eq!(per_host.len(), 2);
        for record in &per_host {
            assert_eq!(record.ntasks, 4);
            assert_eq!(record.ncpus, 4);
        }
    }

    #[test]
    fn test_host_missing_from_detail_map_counts_as_zero() {
        let job = build(&job_line("h1,h2", "0"));
        let mut detail = StubDetail::new("   Nodes=h1 CPU_IDs=0-7 Mem=8192\n");
        let per_host = distribute(job, &mut detail);
        assert_eq!(per_host[0].ncpus, 8);
        assert_eq!(per_host[1].ncpus, 0);
    }

    #[test]
    fn test_parse_cpu_ids_per_line() {
        let detail = "JobId=99 JobName=x\n\
                      Nodes=a01 CPU_IDs=0-15 Mem=0\n\
                      Nodes=a[02-03] CPU_IDs=0-7 Mem=0\n";
        let map = parse_cpu_ids(detail);
        assert_eq!(map.get("a01"), Some(&16));
        assert_eq!(map.get("a02"), Some(&4));
        assert_eq!(map.get("a03"), Some(&4));
    }

    #[test]
    fn test_uneven_grouped_detail_line_keeps_every_cpu() {
        // 7 CPU IDs over 2 hosts: the odd one goes to the first host.
        let map = parse_cpu_ids("Nodes=b[1-2] CPU_IDs=0-6 Mem=0\n");
        assert_eq!(map.get("b1"), Some(&4));
        assert_eq!(map.get("b2"), Some(&3));
        assert_eq!(map.values().sum::<u32>(), 7);
    }

    #[test]
    fn test_parse_job_lines_skips_short_lines() {
        let output = format!("{}\nway|too|short\n", job_line("n01", "0"));
        assert_eq!(parse_job_lines(&output).len(), 1);
    }

    #[test]
    fn test_attach_drops_unknown_hosts_and_pending_jobs() {
        let node_line = "h1|gen|8|4/4/0|1.0|1|8|1|64000|32000|32000|500000|mix|";
        assert!(FieldMap::exact(NODE_FIELDS, node_line).is_some());
        let mut nodes = parse_node_lines(node_line);

        let on_known = build(&job_line("h1", "0"));
        let on_unknown = build(&job_line("h9", "0"));
        let pending = build(&job_line("", "0"));
        assert!(pending.hosts.is_empty());

        let mut detail = StubDetail::new("");
        attach_jobs(
            &mut nodes,
            vec![on_known, on_unknown, pending],
            &mut detail,
        );

        let node: &NodeRecord = &nodes.nodes["h1"];
        assert_eq!(node.jobs.len(), 1);
        assert_eq!(node.jobs[0].hosts, vec!["h1"]);
    }
}
