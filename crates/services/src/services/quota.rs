use serde::Serialize;
use utils::text::fields;

use super::{
    cluster::{Cluster, ClusterError, Fetched},
    table::{Marker, ParseError},
};

const TOOL: &str = "showquota";

/// Column header of the quota table; a one line banner precedes it.
const HEADER: Marker = Marker {
    description: "Disk ... Usage",
    matches: is_header,
    skip: 1,
};

fn is_header(line: &str) -> bool {
    line.trim_start().starts_with("Disk") && line.contains("Usage")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaRecord {
    pub disk: String,
    pub disk_usage: String,
    pub disk_limit: String,
    pub file_usage: String,
    pub file_limit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

pub fn parse_quota(text: &str) -> Result<Vec<QuotaRecord>, ParseError> {
    let rows = HEADER.rows(TOOL, text)?;
    Ok(rows
        .into_iter()
        .filter_map(|line| {
            let cells = fields(line);
            if cells.len() < 5 {
                return None;
            }
            let additional_info = (cells.len() > 5).then(|| cells[5..].join(" "));
            Some(QuotaRecord {
                disk: cells[0].to_string(),
                disk_usage: cells[1].to_string(),
                disk_limit: cells[2].to_string(),
                file_usage: cells[3].to_string(),
                file_limit: cells[4].to_string(),
                additional_info,
            })
        })
        .collect())
}

impl Cluster {
    pub async fn quotas(&self) -> Result<Fetched<Vec<QuotaRecord>>, ClusterError> {
        self.fetch(self.command(TOOL), parse_quota).await
    }
}
