pub mod report;

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use gq_slurm::hostlist;
use gq_slurm::jobs::{self, ScontrolDetail};
use gq_slurm::nodes::{self, MemScale};

/// The main entry point for the `gq-host` utility
///
/// The function orchestrates the main pipeline:
/// 1. Validate the optional host filter expression
/// 2. Load node (and, when requested, job) data from the scheduler CLI
/// 3. Distribute job-wide resource counts into per-host records and
///    attach them to their nodes
/// 4. Print the final, formatted host summary to the console
fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("gq-host: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let start = Instant::now();

    // A malformed host filter is fatal to the whole run, unlike a bad
    // node list on a single job line.
    let host_filter = match &args.hosts {
        Some(expression) => {
            hostlist::expand(expression).map_err(|err| err.to_string())?;
            Some(expression.as_str())
        }
        None => None,
    };

    let mut node_set = nodes::get_nodes(host_filter).map_err(|err| err.to_string())?;
    if args.debug {
        println!("Loaded {} nodes: {:?}", node_set.nodes.len(), start.elapsed());
    }

    let show_jobs = args.jobs || args.user.is_some() || args.mine;
    if show_jobs {
        let mut job_records = jobs::get_jobs().map_err(|err| err.to_string())?;
        if args.debug {
            println!(
                "Loaded {} job records: {:?}",
                job_records.len(),
                start.elapsed()
            );
        }

        if let Some(user) = job_filter_user(&args) {
            job_records.retain(|job| job.user == user);
        }

        let mut detail = ScontrolDetail;
        jobs::attach_jobs(&mut node_set, job_records, &mut detail);
        if args.debug {
            println!("Attached per-host job records: {:?}", start.elapsed());
        }
    }

    let scale = if args.si {
        MemScale::Metric
    } else {
        MemScale::Binary
    };
    report::print_report(&node_set, show_jobs, scale, args.no_color);

    if args.debug {
        println!("Finished printing report: {:?}", start.elapsed());
    }
    Ok(())
}

fn job_filter_user(args: &Args) -> Option<String> {
    if let Some(user) = &args.user {
        return Some(user.clone());
    }
    if args.mine {
        return users::get_current_username().map(|name| name.to_string_lossy().into_owned());
    }
    None
}

const HELP: &str = "Report the hosts of a Slurm cluster in a Grid-Engine-style summary: one \
line per host with its processor label, topology, normalized load, and memory, plus (with -j) \
the jobs running on it. Down hosts show dashes for their numeric columns.";

#[derive(Parser, Debug)]
#[command(version, after_help = HELP)]
struct Args {
    #[arg(short = 'n', long = "hosts")]
    #[arg(
        help = "Restrict the report to this hostlist expression, e.g. \"n[01-16],login01\""
    )]
    hosts: Option<String>,

    #[arg(short, long)]
    #[arg(help = "Show the jobs running on each host")]
    jobs: bool,

    #[arg(short, long)]
    #[arg(help = "Only show jobs belonging to this user (implies -j)")]
    user: Option<String>,

    #[arg(short, long)]
    #[arg(help = "Only show your own jobs (implies -j)")]
    mine: bool,

    #[arg(long)]
    #[arg(help = "Scale memory sizes by powers of 1000 instead of 1024")]
    si: bool,

    #[arg(long)]
    #[arg(help = "Disable colors in output")]
    no_color: bool,

    #[arg(long, hide = true)]
    #[arg(help = "Prints debug-level timing steps to terminal")]
    debug: bool,
}
