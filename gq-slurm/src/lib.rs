//! Read-only reporting primitives over the Slurm command-line interface.
//!
//! This crate knows how to expand hostlist expressions, turn the textual
//! output of `sinfo`/`squeue`/`scontrol` into structured node and job
//! records, and reconcile a job's aggregate resource request into per-host
//! shares. It performs no scheduling and mutates nothing on the cluster.

pub mod fields;
pub mod hostlist;
pub mod jobs;
pub mod nodes;
pub mod query;
