//! Cluster-wide node, core and job counts.

use serde::Serialize;
use utils::text::pipe_cells;

use super::{
    cluster::{Cluster, ClusterError, Fetched},
    sinfo::StateCounts,
    table::ParseError,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounts {
    pub allocated: u64,
    pub mixed: u64,
    pub idle: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoreCounts {
    pub allocated: u64,
    pub idle: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub running: u64,
    pub pending: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Utilization {
    pub nodes: NodeCounts,
    pub cores: CoreCounts,
    pub jobs: JobCounts,
}

/// Rows of `sinfo --format=%T|%D`. States other than allocated, mixed and
/// idle (down, drained, ...) are not counted.
pub fn parse_node_states(text: &str) -> Result<NodeCounts, ParseError> {
    let mut counts = NodeCounts::default();
    for line in text.lines() {
        let [state, count] = pipe_cells(line)[..] else {
            continue;
        };
        let Ok(count) = count.parse::<u64>() else {
            continue;
        };
        // `mixed+drain`, `idle*`, `alloc~` all count under their base state
        let base = state
            .split('+')
            .next()
            .unwrap_or_default()
            .trim_end_matches(['*', '~', '#', '!', '%', '$', '@', '^', '-']);
        match base.to_ascii_lowercase().as_str() {
            "alloc" | "allocated" => counts.allocated += count,
            "mix" | "mixed" => counts.mixed += count,
            "idle" => counts.idle += count,
            _ => {}
        }
    }
    Ok(counts)
}

/// Single `A/I/O/T` line of `sinfo --format=%C`.
pub fn parse_core_counts(text: &str) -> Result<CoreCounts, ParseError> {
    let counts = text
        .lines()
        .find_map(StateCounts::parse)
        .ok_or_else(|| ParseError::new("sinfo", "no allocated/idle/other/total core counts"))?;
    Ok(CoreCounts {
        allocated: counts.allocated,
        idle: counts.idle,
    })
}

/// One state per line from `squeue --format=%T`.
pub fn parse_job_states(text: &str) -> Result<JobCounts, ParseError> {
    let mut counts = JobCounts::default();
    for state in text.lines().map(str::trim) {
        match state {
            "RUNNING" => counts.running += 1,
            "PENDING" => counts.pending += 1,
            _ => {}
        }
    }
    Ok(counts)
}

impl Cluster {
    pub async fn utilization(&self) -> Result<Fetched<Utilization>, ClusterError> {
        let (nodes, cores, jobs) = tokio::try_join!(
            self.fetch(
                self.command("sinfo").args(["--noheader", "--format=%T|%D"]),
                parse_node_states,
            ),
            self.fetch(
                self.command("sinfo").args(["--noheader", "--format=%C"]),
                parse_core_counts,
            ),
            self.fetch(
                self.command("squeue").args(["--noheader", "--format=%T"]),
                parse_job_states,
            ),
        )?;

        let mut traces = nodes.traces;
        traces.extend(cores.traces);
        traces.extend(jobs.traces);
        Ok(Fetched {
            data: Utilization {
                nodes: nodes.data,
                cores: cores.data,
                jobs: jobs.data,
            },
            traces,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use utils::process::ScriptedRunner;

    use super::*;
    use crate::services::cluster::testing;

    #[test]
    fn node_states_fold_suffixes_into_base_states() {
        let text = "allocated|120\nmixed|30\nmixed+drain|2\nidle*|3\nidle|10\ndown*|4\ndrained|1\n";
        assert_eq!(
            parse_node_states(text).unwrap(),
            NodeCounts {
                allocated: 120,
                mixed: 32,
                idle: 13
            }
        );
    }

    #[test]
    fn core_counts_require_the_slash_notation() {
        assert_eq!(
            parse_core_counts("5000/3000/200/8200\n").unwrap(),
            CoreCounts {
                allocated: 5000,
                idle: 3000
            }
        );
        assert!(parse_core_counts("n/a\n").is_err());
    }

    #[tokio::test]
    async fn utilization_combines_three_commands() {
        let runner = ScriptedRunner::new()
            .on("sinfo --noheader --format=%T|%D", "allocated|2\nidle|1\n")
            .on("sinfo --noheader --format=%C", "10/20/0/30\n")
            .on("squeue --noheader --format=%T", "RUNNING\nPENDING\nRUNNING\nCOMPLETING\n");
        let (cluster, _) = testing::cluster(runner);

        let fetched = cluster.utilization().await.unwrap();
        assert_eq!(
            serde_json::to_value(fetched.data).unwrap(),
            json!({
                "nodes": {"allocated": 2, "mixed": 0, "idle": 1},
                "cores": {"allocated": 10, "idle": 20},
                "jobs": {"running": 2, "pending": 1},
            })
        );
        assert_eq!(fetched.traces.len(), 3);
    }

    #[tokio::test]
    async fn any_failing_command_fails_the_summary() {
        let runner = ScriptedRunner::new()
            .on("sinfo --noheader --format=%T|%D", "allocated|2\n")
            .on("sinfo --noheader --format=%C", "10/20/0/30\n");
        let (cluster, _) = testing::cluster(runner);
        assert!(matches!(
            cluster.utilization().await,
            Err(ClusterError::Process(_))
        ));
    }
}
