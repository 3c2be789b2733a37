use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use services::services::projects::ProjectQuery;

use super::with_debug;
use crate::{
    AppState,
    error::ApiError,
    extract::{ApiQuery, FormFields},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sinfo", get(partitions))
        .route("/jobs", get(active_jobs))
        .route("/cancel_job/{job_id}", post(cancel_job).delete(cancel_job))
        .route("/showquota", get(quotas))
        .route("/cpuavail", get(cpu_availability))
        .route("/projectinfo", get(project_info))
        .route("/set_default_account", post(set_default_account))
        .route("/utilization", get(utilization))
}

/// Bare array: the overview widget reads the list directly.
async fn partitions(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let fetched = state.cluster().partitions().await?;
    Ok(Json(json!(fetched.data)))
}

async fn active_jobs(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let fetched = state.cluster().active_jobs(&state.config().user).await?;
    Ok(with_debug(&state, json!({ "jobs": fetched.data }), fetched.traces))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let message = state.cluster().cancel_job(&job_id).await?;
    tracing::info!(%job_id, "job cancelled");
    Ok(Json(json!({ "message": message })))
}

async fn quotas(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let fetched = state.cluster().quotas().await?;
    Ok(with_debug(&state, json!({ "quotas": fetched.data }), fetched.traces))
}

async fn cpu_availability(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let fetched = state.cluster().cpu_availability().await?;
    Ok(with_debug(&state, json!(fetched.data), fetched.traces))
}

#[derive(Debug, Deserialize)]
struct ProjectInfoParams {
    account: Option<String>,
    job_history: Option<String>,
    pending_jobs: Option<String>,
}

fn truthy(flag: Option<&str>) -> bool {
    matches!(
        flag.map(|value| value.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    )
}

async fn project_info(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ProjectInfoParams>,
) -> Result<Json<Value>, ApiError> {
    let query = ProjectQuery::from_flags(
        params.account.as_deref(),
        truthy(params.job_history.as_deref()),
        truthy(params.pending_jobs.as_deref()),
    )?;
    let fetched = state.cluster().project_info(&query).await?;
    Ok(with_debug(&state, json!(fetched.data), fetched.traces))
}

async fn set_default_account(
    State(state): State<AppState>,
    FormFields(form): FormFields,
) -> Result<Json<Value>, ApiError> {
    let Some(account) = form.get("account_no").and_then(Value::as_str) else {
        return Err(ApiError::BadRequest("account_no is required".into()));
    };
    let message = state.cluster().set_default_account(account).await?;
    Ok(Json(json!({ "message": message })))
}

async fn utilization(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let fetched = state.cluster().utilization().await?;
    Ok(with_debug(&state, json!(fetched.data), fetched.traces))
}

#[cfg(test)]
mod tests {
    use super::truthy;

    #[test]
    fn flags_accept_common_spellings() {
        assert!(truthy(Some("true")));
        assert!(truthy(Some("True")));
        assert!(truthy(Some("1")));
        assert!(!truthy(Some("false")));
        assert!(!truthy(Some("")));
        assert!(!truthy(None));
    }
}
