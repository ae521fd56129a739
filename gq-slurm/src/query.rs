use std::process::Command;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("failed to launch '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' exited with status {status}: {stderr}")]
    Failed {
        command: String,
        status: i32,
        stderr: String,
    },
}

/// Runs one scheduler query command to completion and returns its stdout.
/// Strict request/response: no timeout, no retry, no concurrency.
pub fn run_query(program: &str, args: &[&str]) -> Result<String, QueryError> {
    let command = if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    };

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| QueryError::Launch {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(QueryError::Failed {
            command,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Builds a `--Format` argument that makes sinfo/squeue separate fields
/// with a literal `|`: the non-numeric suffix after each field's colon is
/// emitted verbatim instead of acting as a width.
pub fn format_arg(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| format!("{field}:|"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_arg() {
        assert_eq!(format_arg(&["nodeaddr", "cpus"]), "nodeaddr:|,cpus:|");
    }

    #[test]
    fn test_missing_program_is_a_launch_error() {
        let err = run_query("definitely-not-a-real-scheduler-cli", &[]).unwrap_err();
        assert!(matches!(err, QueryError::Launch { .. }));
    }
}
