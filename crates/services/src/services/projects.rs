//! Allocation accounts, pending jobs and job history from `myproject`.

use serde::Serialize;
use utils::{
    text::pipe_cells,
    validate,
};

use super::{
    cluster::{Cluster, ClusterError, Fetched},
    table::{Marker, ParseError},
};

const TOOL: &str = "myproject";

/// Header of the account table followed by its separator rule.
const ACCOUNT_HEADER: Marker = Marker {
    description: "|  Account",
    matches: is_account_header,
    skip: 2,
};

const LEGACY_JOB_HEADER: Marker = Marker {
    description: "JobID",
    matches: is_legacy_job_header,
    skip: 2,
};

const DETAILED_JOB_HEADER: Marker = Marker {
    description: "JobID ... SubmitTime",
    matches: is_detailed_job_header,
    skip: 1,
};

fn is_account_header(line: &str) -> bool {
    pipe_cells(line).first().is_some_and(|cell| *cell == "Account")
}

fn is_legacy_job_header(line: &str) -> bool {
    line.contains("JobID")
}

fn is_detailed_job_header(line: &str) -> bool {
    line.contains("JobID") && line.contains("SubmitTime")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectAccount {
    pub account: String,
    #[serde(rename = "fy")]
    pub fiscal_year: String,
    #[serde(rename = "default")]
    pub is_default: String,
    pub allocation: f64,
    #[serde(rename = "used_pending_sus")]
    pub used_pending: f64,
    pub balance: f64,
    pub pi: String,
}

/// Row of the five column job table printed for pending jobs and, by older
/// releases of the tool, for job history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingJob {
    pub job_id: String,
    pub state: String,
    pub cores: String,
    pub effective_cores: String,
    pub walltime_hours: String,
}

/// Row of the eight column job history table.
///
/// Columns, in order: `JobID | SubmitTime | StartTime | EndTime | Walltime |
/// TotalSlots | UsedSUs | State`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHistoryRecord {
    pub job_id: String,
    pub submit_time: String,
    pub start_time: String,
    pub end_time: String,
    pub walltime: String,
    pub total_slots: String,
    pub used_sus: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobHistory {
    Detailed(Vec<JobHistoryRecord>),
    Legacy(Vec<PendingJob>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectInfo {
    Projects(Vec<ProjectAccount>),
    PendingJobs(Vec<PendingJob>),
    JobHistory(JobHistory),
}

/// Which `myproject` variant a request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectQuery {
    Accounts,
    PendingJobs(String),
    JobHistory(String),
}

impl ProjectQuery {
    /// Job history wins when both flags are set. Either flag requires a
    /// valid account.
    pub fn from_flags(
        account: Option<&str>,
        job_history: bool,
        pending_jobs: bool,
    ) -> Result<Self, validate::ValidationError> {
        if !job_history && !pending_jobs {
            return Ok(Self::Accounts);
        }
        let account = validate::account(account.unwrap_or_default())?.to_string();
        Ok(if job_history {
            Self::JobHistory(account)
        } else {
            Self::PendingJobs(account)
        })
    }
}

/// Service units as printed: signed, possibly with thousands separators.
/// Anything unparsable, such as `N/A`, counts as zero.
fn amount(cell: &str) -> f64 {
    cell.trim().replace(',', "").parse().unwrap_or(0.0)
}

pub fn parse_accounts(text: &str) -> Result<Vec<ProjectAccount>, ParseError> {
    let rows = ACCOUNT_HEADER.rows(TOOL, text)?;
    Ok(rows
        .into_iter()
        .filter_map(|line| match pipe_cells(line).as_slice() {
            [account, fy, default, allocation, used, balance, pi] => Some(ProjectAccount {
                account: account.to_string(),
                fiscal_year: fy.to_string(),
                is_default: default.to_string(),
                allocation: amount(allocation),
                used_pending: amount(used),
                balance: amount(balance),
                pi: pi.to_string(),
            }),
            _ => None,
        })
        .collect())
}

pub fn parse_pending_jobs(text: &str) -> Result<Vec<PendingJob>, ParseError> {
    let rows = LEGACY_JOB_HEADER.rows(TOOL, text)?;
    Ok(rows.into_iter().filter_map(legacy_row).collect())
}

fn legacy_row(line: &str) -> Option<PendingJob> {
    match pipe_cells(line).as_slice() {
        [job_id, state, cores, effective_cores, walltime_hours] => Some(PendingJob {
            job_id: job_id.to_string(),
            state: state.to_string(),
            cores: cores.to_string(),
            effective_cores: effective_cores.to_string(),
            walltime_hours: walltime_hours.to_string(),
        }),
        _ => None,
    }
}

/// Job history in whichever layout the installed tool prints.
///
/// Rows of the detailed layout with fewer than eight filled cells are
/// skipped. A row with more than eight cells means the columns no longer
/// line up with [`JobHistoryRecord`] and fails the whole table.
pub fn parse_job_history(text: &str) -> Result<JobHistory, ParseError> {
    let lines: Vec<&str> = text.lines().collect();
    let Some(start) = DETAILED_JOB_HEADER.find(&lines) else {
        return parse_pending_jobs(text).map(JobHistory::Legacy);
    };

    let mut records = Vec::new();
    for line in lines.iter().skip(start + DETAILED_JOB_HEADER.skip) {
        let cells = pipe_cells(line);
        if cells.len() > 8 {
            return Err(ParseError::new(
                TOOL,
                format!("job history row has {} columns, expected 8", cells.len()),
            ));
        }
        if cells.len() < 8 || cells.iter().any(|cell| cell.is_empty()) {
            continue;
        }
        records.push(JobHistoryRecord {
            job_id: cells[0].to_string(),
            submit_time: cells[1].to_string(),
            start_time: cells[2].to_string(),
            end_time: cells[3].to_string(),
            walltime: cells[4].to_string(),
            total_slots: cells[5].to_string(),
            used_sus: cells[6].to_string(),
            state: cells[7].to_string(),
        });
    }
    Ok(JobHistory::Detailed(records))
}

impl Cluster {
    pub async fn project_info(
        &self,
        query: &ProjectQuery,
    ) -> Result<Fetched<ProjectInfo>, ClusterError> {
        let invocation = self.command(TOOL);
        match query {
            ProjectQuery::Accounts => {
                Ok(self.fetch(invocation, parse_accounts).await?.map(ProjectInfo::Projects))
            }
            ProjectQuery::PendingJobs(account) => {
                let invocation = invocation.arg("-p").arg(validate::account(account)?);
                Ok(self.fetch(invocation, parse_pending_jobs).await?.map(ProjectInfo::PendingJobs))
            }
            ProjectQuery::JobHistory(account) => {
                let invocation = invocation.arg("-j").arg(validate::account(account)?);
                Ok(self.fetch(invocation, parse_job_history).await?.map(ProjectInfo::JobHistory))
            }
        }
    }

    /// Make `account` the default for future submissions; returns the tool's
    /// own confirmation text.
    pub async fn set_default_account(&self, account: &str) -> Result<String, ClusterError> {
        let account = validate::account(account)?;
        let trace = self
            .capture(self.command(TOOL).arg("-d").arg(account))
            .await?;
        let message = trace.stdout.trim();
        Ok(if message.is_empty() {
            format!("Default account set to {account}")
        } else {
            message.to_string()
        })
    }
}
