pub mod pager;

use std::io::IsTerminal;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use gq_slurm::query;

/// The main entry point for the `gq-view` utility
///
/// Runs one scheduler query command to completion, then either prints its
/// tabular output directly (when stdout is not a terminal, or on request)
/// or pages it in a scrollable terminal view.
fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let (program, rest) = args
        .command
        .split_first()
        .ok_or_else(|| eyre!("no command given"))?;
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

    let output = query::run_query(program, &rest)?;
    let lines: Vec<String> = output.lines().map(str::to_string).collect();

    if args.no_pager || !std::io::stdout().is_terminal() {
        for line in &lines {
            println!("{line}");
        }
        return Ok(());
    }

    let title = args.command.join(" ");
    pager::run(&title, &lines)
}

const HELP: &str = "Wraps any scheduler query command and shows its tabular output in a \
scrollable terminal view. Scroll with the arrow keys, j/k, PageUp/PageDown, or g/G; quit \
with q or Escape. Example: gq-view -- squeue --long";

#[derive(Parser, Debug)]
#[command(version, after_help = HELP)]
struct Args {
    #[arg(long)]
    #[arg(help = "Print the output directly instead of paging it")]
    no_pager: bool,

    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    #[arg(help = "The query command to run, e.g. \"squeue --long\"")]
    command: Vec<String>,
}
