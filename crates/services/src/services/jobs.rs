//! The caller's active queue, enriched with per-job `scontrol` details.

use futures::{StreamExt, stream};
use serde::Serialize;
use utils::{text::fields, validate};

use super::{
    cluster::{Cluster, ClusterError, CommandTrace, Fetched},
    scontrol::JobDetails,
    table::{Marker, ParseError},
};

const TOOL: &str = "squeue";
const FORMAT: &str = "%.18i %.2t %.6D";

const HEADER: Marker = Marker {
    description: "JOBID",
    matches: is_header,
    skip: 1,
};

fn is_header(line: &str) -> bool {
    line.split_whitespace().next() == Some("JOBID")
}

/// One row of `squeue -o '%.18i %.2t %.6D'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub job_id: String,
    pub state: String,
    pub nodes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub job_name: Option<String>,
    pub state: String,
    pub cpus: Option<String>,
    pub nodes: String,
    pub time_requested: Option<String>,
    pub time_elapsed: Option<String>,
    pub submit_dir: Option<String>,
}

impl JobRecord {
    fn from_entry(entry: QueueEntry, details: Option<&JobDetails>) -> Self {
        let detail = |key: &str| details.and_then(|d| d.get(key)).map(str::to_string);
        Self {
            job_name: detail("job_name"),
            cpus: detail("cores"),
            time_requested: detail("time_requested"),
            time_elapsed: detail("time_elapsed"),
            submit_dir: detail("submit_dir"),
            job_id: entry.job_id,
            state: entry.state,
            nodes: entry.nodes,
        }
    }
}

pub fn parse_queue(text: &str) -> Result<Vec<QueueEntry>, ParseError> {
    let rows = HEADER.rows(TOOL, text)?;
    Ok(rows
        .into_iter()
        .filter_map(|line| match fields(line).as_slice() {
            [job_id, state, nodes] => Some(QueueEntry {
                job_id: job_id.to_string(),
                state: state.to_string(),
                nodes: nodes.to_string(),
            }),
            _ => None,
        })
        .collect())
}

impl Cluster {
    /// Jobs of `user` in queue order.
    ///
    /// Details are looked up with at most `fanout_limit` concurrent
    /// `scontrol` calls. A failed lookup leaves that job's optional fields
    /// empty instead of failing the listing.
    pub async fn active_jobs(&self, user: &str) -> Result<Fetched<Vec<JobRecord>>, ClusterError> {
        let user = validate::user_name(user)?;
        let invocation = self.command(TOOL).args(["-u", user, "-o", FORMAT]);
        let queue = self.fetch(invocation, parse_queue).await?;
        let mut traces = queue.traces;

        let limit = self.settings().fanout_limit.max(1);
        let enriched: Vec<(JobRecord, Option<CommandTrace>)> = stream::iter(queue.data)
            .map(|entry| async move {
                match self.job_details(&entry.job_id).await {
                    Ok(fetched) => {
                        let trace = fetched.traces.into_iter().next();
                        (JobRecord::from_entry(entry, Some(&fetched.data)), trace)
                    }
                    Err(err) => {
                        tracing::warn!(job_id = %entry.job_id, error = %err, "job details unavailable");
                        (JobRecord::from_entry(entry, None), None)
                    }
                }
            })
            .buffered(limit)
            .collect()
            .await;

        let mut jobs = Vec::with_capacity(enriched.len());
        for (job, trace) in enriched {
            jobs.push(job);
            traces.extend(trace);
        }
        Ok(Fetched { data: jobs, traces })
    }

    /// Cancel one job. The id is validated before `scancel` is started.
    pub async fn cancel_job(&self, job_id: &str) -> Result<String, ClusterError> {
        let job_id = validate::job_id(job_id)?;
        let trace = self.capture(self.command("scancel").arg(job_id)).await?;
        let message = trace.stdout.trim();
        Ok(if message.is_empty() {
            format!("Job {job_id} cancelled successfully")
        } else {
            message.to_string()
        })
    }
}
