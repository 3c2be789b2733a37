use serde::Serialize;
use utils::text::pipe_cells;

use super::{
    cluster::{Cluster, ClusterError, Fetched},
    table::ParseError,
};

const TOOL: &str = "sinfo";
const FORMAT: &str = "--format=%P|%s|%l|%C|%F";

/// One partition of `sinfo --format=%P|%s|%l|%C|%F`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSummary {
    #[serde(rename = "queue")]
    pub partition: String,
    pub job_size: String,
    pub time_limit: String,
    #[serde(rename = "CPU_total")]
    pub cpu_total: u64,
    #[serde(rename = "CPU_avail")]
    pub cpu_avail: u64,
    pub nodes_total: u64,
    pub nodes_avail: u64,
}

/// Counts in slurm's `allocated/idle/other/total` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateCounts {
    pub allocated: u64,
    pub idle: u64,
    pub other: u64,
    pub total: u64,
}

impl StateCounts {
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('/').map(|part| part.parse::<u64>().ok());
        let counts = Self {
            allocated: parts.next()??,
            idle: parts.next()??,
            other: parts.next()??,
            total: parts.next()??,
        };
        parts.next().is_none().then_some(counts)
    }
}

/// Rows are headerless; malformed rows are dropped.
pub fn parse_partitions(text: &str) -> Result<Vec<PartitionSummary>, ParseError> {
    Ok(text
        .lines()
        .filter_map(|line| {
            let [partition, job_size, time_limit, cpus, nodes] = pipe_cells(line)[..] else {
                return None;
            };
            let cpus = StateCounts::parse(cpus)?;
            let nodes = StateCounts::parse(nodes)?;
            Some(PartitionSummary {
                partition: partition.trim_end_matches('*').to_string(),
                job_size: job_size.to_string(),
                time_limit: time_limit.to_string(),
                cpu_total: cpus.total,
                cpu_avail: cpus.idle,
                nodes_total: nodes.total,
                nodes_avail: nodes.idle,
            })
        })
        .collect())
}

impl Cluster {
    pub async fn partitions(&self) -> Result<Fetched<Vec<PartitionSummary>>, ClusterError> {
        let invocation = self.command(TOOL).args(["--noheader", FORMAT]);
        self.fetch(invocation, parse_partitions).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn partitions_report_idle_capacity() {
        let text = "cpu*|1-64|7-00:00:00|1200/800/0/2000|30/10/0/40\ngpu|1-4|2-00:00:00|96/32/0/128|3/1/0/4\n";
        let partitions = parse_partitions(text).unwrap();
        assert_eq!(partitions.len(), 2);
        assert_eq!(
            serde_json::to_value(&partitions[0]).unwrap(),
            json!({
                "queue": "cpu",
                "job_size": "1-64",
                "time_limit": "7-00:00:00",
                "CPU_total": 2000,
                "CPU_avail": 800,
                "nodes_total": 40,
                "nodes_avail": 10,
            })
        );
        assert_eq!(partitions[1].partition, "gpu");
    }

    #[test]
    fn malformed_rows_are_dropped() {
        let text = "cpu|1-64|7-00:00:00|1200/800/0|30/10/0/40\nbad line\n\n";
        assert!(parse_partitions(text).unwrap().is_empty());
    }

    #[test]
    fn state_counts_need_four_parts() {
        assert_eq!(
            StateCounts::parse("1/2/3/6"),
            Some(StateCounts {
                allocated: 1,
                idle: 2,
                other: 3,
                total: 6
            })
        );
        assert_eq!(StateCounts::parse("1/2/3"), None);
        assert_eq!(StateCounts::parse("1/2/3/4/5"), None);
        assert_eq!(StateCounts::parse("a/2/3/4"), None);
    }
}
