use std::collections::BTreeMap;

use serde::Serialize;
use utils::validate;

use super::{
    cluster::{Cluster, ClusterError, Fetched},
    table::ParseError,
};

const TOOL: &str = "scontrol";

/// `scontrol` keys we expose, with their JSON names.
const KEY_MAP: &[(&str, &str)] = &[
    ("JobId", "job_id"),
    ("JobName", "job_name"),
    ("UserId", "user"),
    ("JobState", "state"),
    ("Partition", "partition"),
    ("NumNodes", "nodes"),
    ("NumCPUs", "cores"),
    ("TimeLimit", "time_requested"),
    ("RunTime", "time_elapsed"),
    ("SubmitTime", "submit_time"),
    ("StartTime", "start_time"),
    ("WorkDir", "submit_dir"),
    ("Account", "account"),
    ("Reason", "reason"),
];

/// Renamed `Key=Value` pairs of one `scontrol show job` record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct JobDetails(BTreeMap<&'static str, String>);

impl JobDetails {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Length of the `Key` in a `Key=...` word, if the word starts one.
fn key_len(word: &str) -> Option<usize> {
    let end = word.find(|c: char| c == '=' || c.is_whitespace())?;
    let key = &word[..end];
    let is_key = word[end..].starts_with('=')
        && !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '/'));
    is_key.then_some(end)
}

/// `Key=Value` pairs of one line. A value runs until the next word that
/// starts a key, so `JobName=my run` keeps its space.
fn pairs(line: &str) -> Vec<(&str, &str)> {
    let mut keys: Vec<(usize, usize)> = Vec::new();
    let mut at_word_start = true;
    for (index, c) in line.char_indices() {
        if c.is_whitespace() {
            at_word_start = true;
            continue;
        }
        if at_word_start {
            if let Some(len) = key_len(&line[index..]) {
                keys.push((index, index + len));
            }
        }
        at_word_start = false;
    }

    keys.iter()
        .enumerate()
        .map(|(position, &(start, eq))| {
            let end = keys
                .get(position + 1)
                .map(|&(next, _)| next)
                .unwrap_or(line.len());
            (&line[start..eq], line[eq + 1..end].trim())
        })
        .collect()
}

/// Flatten the `Key=Value` pairs of `scontrol show job` output.
///
/// Only keys in the rename table survive. The first occurrence of a key
/// wins, so a second job in the same output never overwrites the first.
pub fn parse_job_details(text: &str) -> Result<JobDetails, ParseError> {
    let mut details = BTreeMap::new();
    for (key, value) in text.lines().flat_map(pairs) {
        let Some((_, name)) = KEY_MAP.iter().find(|(raw, _)| *raw == key) else {
            continue;
        };
        details.entry(*name).or_insert_with(|| value.to_string());
    }
    if !details.contains_key("job_id") {
        return Err(ParseError::new(TOOL, "no JobId in output"));
    }
    Ok(JobDetails(details))
}

impl Cluster {
    pub async fn job_details(&self, job_id: &str) -> Result<Fetched<JobDetails>, ClusterError> {
        let job_id = validate::job_id(job_id)?;
        let invocation = self.command(TOOL).args(["show", "job", job_id]);
        self.fetch(invocation, parse_job_details).await
    }
}
