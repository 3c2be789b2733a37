//! Node configuration and availability as printed by `cpuavail`.
//!
//! The output carries two sections, each opened by a marker line and a
//! column header:
//!
//! ```text
//! CONFIGURATION
//! NodeType   Count
//! GPU        4
//! AVAILABILITY
//! NodeName   CPUs  Memory
//! c001       12    98304
//! ```

use serde::Serialize;
use utils::text::fields;

use super::{
    cluster::{Cluster, ClusterError, Fetched},
    table::{Marker, ParseError},
};

const TOOL: &str = "cpuavail";

const CONFIGURATION: Marker = Marker {
    description: "CONFIGURATION",
    matches: is_configuration,
    skip: 2,
};

const AVAILABILITY: Marker = Marker {
    description: "AVAILABILITY",
    matches: is_availability,
    skip: 2,
};

fn is_configuration(line: &str) -> bool {
    line.contains("CONFIGURATION")
}

fn is_availability(line: &str) -> bool {
    line.contains("AVAILABILITY")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeConfiguration {
    pub node_type: String,
    pub node_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAvailability {
    pub node_name: String,
    pub cpus_available: u32,
    pub memory_available: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuAvailability {
    pub configuration: Vec<NodeConfiguration>,
    pub availability: Vec<NodeAvailability>,
}

pub fn parse_cpuavail(text: &str) -> Result<CpuAvailability, ParseError> {
    let lines: Vec<&str> = text.lines().collect();
    let missing = |marker: &Marker| {
        ParseError::new(TOOL, format!("marker line `{}` not found", marker.description))
    };
    let config_at = CONFIGURATION.find(&lines).ok_or_else(|| missing(&CONFIGURATION))?;
    let avail_at = AVAILABILITY.find(&lines).ok_or_else(|| missing(&AVAILABILITY))?;

    // The configuration section ends where the availability marker begins.
    let config_end = if avail_at > config_at { avail_at } else { lines.len() };
    let config_rows = lines
        .get(config_at + CONFIGURATION.skip..config_end)
        .unwrap_or_default();
    let avail_end = if config_at > avail_at { config_at } else { lines.len() };
    let avail_rows = lines
        .get(avail_at + AVAILABILITY.skip..avail_end)
        .unwrap_or_default();

    let configuration = config_rows
        .iter()
        .filter_map(|line| match fields(line).as_slice() {
            [node_type, count] => Some(NodeConfiguration {
                node_type: node_type.to_string(),
                node_count: count.parse().ok()?,
            }),
            _ => None,
        })
        .collect();

    let availability = avail_rows
        .iter()
        .filter_map(|line| match fields(line).as_slice() {
            [node_name, cpus, memory] => Some(NodeAvailability {
                node_name: node_name.to_string(),
                cpus_available: cpus.parse().ok()?,
                memory_available: memory.parse().ok()?,
            }),
            _ => None,
        })
        .collect();

    Ok(CpuAvailability {
        configuration,
        availability,
    })
}

impl Cluster {
    pub async fn cpu_availability(&self) -> Result<Fetched<CpuAvailability>, ClusterError> {
        self.fetch(self.command(TOOL), parse_cpuavail).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
CONFIGURATION
NodeType     Count
GPU 4
CPU 10
broken

AVAILABILITY
NodeName     CPUs    Memory
c001 12 98304
c002 0 0
c003 n/a 1024
";

    #[test]
    fn configuration_rows_need_exactly_two_fields() {
        let parsed = parse_cpuavail(SAMPLE).unwrap();
        assert_eq!(
            parsed.configuration,
            vec![
                NodeConfiguration {
                    node_type: "GPU".into(),
                    node_count: 4
                },
                NodeConfiguration {
                    node_type: "CPU".into(),
                    node_count: 10
                },
            ]
        );
    }

    #[test]
    fn availability_rows_with_bad_numbers_are_skipped() {
        let parsed = parse_cpuavail(SAMPLE).unwrap();
        assert_eq!(parsed.availability.len(), 2);
        assert_eq!(parsed.availability[0].node_name, "c001");
        assert_eq!(parsed.availability[0].cpus_available, 12);
        assert_eq!(parsed.availability[0].memory_available, 98304);
    }

    #[test]
    fn sections_may_come_in_either_order() {
        let text = "AVAILABILITY\nhdr\nc001 1 2\nCONFIGURATION\nhdr\nGPU 4\n";
        let parsed = parse_cpuavail(text).unwrap();
        assert_eq!(parsed.availability.len(), 1);
        assert_eq!(parsed.configuration.len(), 1);
    }

    #[test]
    fn either_marker_missing_is_unexpected_format() {
        assert!(parse_cpuavail("CONFIGURATION\nhdr\nGPU 4\n").is_err());
        assert!(parse_cpuavail("AVAILABILITY\nhdr\nc001 1 2\n").is_err());
    }
}
