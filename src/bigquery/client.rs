// src/bigquery/client.rs

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::rows::{self, ResultRow, TableSchema, WireRow};
use crate::auth::Authenticator;

const BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Reference to a submitted query job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub job_id: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub reason: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: String,
    #[serde(default)]
    pub errors: Vec<JobError>,
}

/// The slice of the job resource this crate reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_reference: JobReference,
    pub status: JobStatus,
}

impl Job {
    pub fn is_done(&self) -> bool {
        self.status.state == "DONE"
    }

    /// A non-empty job-level error list aborts the run before any row is
    /// read.
    pub fn failure(&self) -> Option<String> {
        if self.status.errors.is_empty() {
            return None;
        }
        let joined = self
            .status
            .errors
            .iter()
            .map(|e| match &e.reason {
                Some(reason) => format!("{}: {}", reason, e.message),
                None => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        Some(joined)
    }
}

/// One page of query results.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultsPage {
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Vec<WireRow>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub job_complete: Option<bool>,
}

/// Thin client for the BigQuery v2 REST surface: submit a query job, poll
/// it to completion, fetch the paged results.
pub struct BigQuery {
    http: Client,
    auth: Authenticator,
    project_id: String,
    location: String,
}

impl BigQuery {
    pub fn new(http: Client, auth: Authenticator, project_id: String, location: String) -> Self {
        BigQuery {
            http,
            auth,
            project_id,
            location,
        }
    }

    /// Submit `sql`, wait for the job to finish, and return every result
    /// row in server order.
    pub async fn run_query(&self, sql: &str) -> Result<(Job, Vec<ResultRow>)> {
        let job = self.create_query_job(sql).await?;
        let done = self.wait_for_job(&job).await?;
        let rows = self.query_results(&done.job_reference).await?;
        Ok((done, rows))
    }

    /// Submit `sql` as an asynchronous query job. Submission is a single
    /// attempt so a timeout cannot double-submit the job.
    pub async fn create_query_job(&self, sql: &str) -> Result<Job> {
        let url = format!("{}/projects/{}/jobs", BASE_URL, self.project_id);
        let body = json!({
            "configuration": {
                "query": {
                    "query": sql,
                    "useLegacySql": false
                }
            },
            "jobReference": {
                "location": self.location
            }
        });

        let token = self.auth.token(&self.http).await?;
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        let job: Job = decode(resp, &url).await?;

        info!(job_id = %job.job_reference.job_id, "job started");
        Ok(job)
    }

    /// Poll until the job reaches DONE, then surface any job-level errors.
    pub async fn wait_for_job(&self, job: &Job) -> Result<Job> {
        let job_id = job.job_reference.job_id.clone();
        let mut current = job.clone();
        loop {
            if current.is_done() {
                if let Some(msg) = current.failure() {
                    bail!("query job {} failed: {}", job_id, msg);
                }
                info!(job_id = %job_id, "job completed");
                return Ok(current);
            }
            debug!(job_id = %job_id, state = %current.status.state, "waiting for job");
            sleep(POLL_INTERVAL).await;
            current = self.get_job(&current.job_reference).await?;
        }
    }

    async fn get_job(&self, job_ref: &JobReference) -> Result<Job> {
        let url = format!(
            "{}/projects/{}/jobs/{}",
            BASE_URL, self.project_id, job_ref.job_id
        );
        self.get_json(&url, &self.location_params(job_ref)).await
    }

    /// Fetch every result page for the job, following `pageToken` until it
    /// runs out.
    pub async fn query_results(&self, job_ref: &JobReference) -> Result<Vec<ResultRow>> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            BASE_URL, self.project_id, job_ref.job_id
        );

        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = self.location_params(job_ref);
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: QueryResultsPage = self.get_json(&url, &params).await?;
            if page.job_complete == Some(false) {
                bail!("query job {} reported results before completing", job_ref.job_id);
            }
            let schema = page
                .schema
                .as_ref()
                .context("query results page is missing its schema")?;
            rows::convert_page(schema, &page.rows, &mut out)?;
            debug!(rows = out.len(), "fetched result page");

            match page.page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(out)
    }

    fn location_params(&self, job_ref: &JobReference) -> Vec<(&'static str, String)> {
        let location = job_ref
            .location
            .clone()
            .unwrap_or_else(|| self.location.clone());
        vec![("location", location)]
    }

    /// GET with bounded retries and exponential backoff for transient
    /// failures.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<T> {
        let mut attempts = 0;
        loop {
            match self.get_json_once(url, params).await {
                Ok(v) => return Ok(v),
                Err(e) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempts - 1);
                    warn!(%url, attempt = attempts, delay_ms = backoff, error = %e, "Retrying");
                    sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<T> {
        let token = self.auth.token(&self.http).await?;
        let resp = self
            .http
            .get(url)
            .query(params)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        decode(resp, url).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response, url: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("{} returned {}: {}", url, status, body);
    }
    resp.json()
        .await
        .with_context(|| format!("decoding response from {}", url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(json: &str) -> Job {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn deserializes_a_running_job() {
        let job = job(
            r#"{
                "jobReference": {"projectId": "p", "jobId": "job_123", "location": "US"},
                "status": {"state": "RUNNING"}
            }"#,
        );
        assert_eq!(job.job_reference.job_id, "job_123");
        assert_eq!(job.job_reference.location.as_deref(), Some("US"));
        assert!(!job.is_done());
        assert!(job.failure().is_none());
    }

    #[test]
    fn failure_joins_the_error_list() {
        let job = job(
            r#"{
                "jobReference": {"jobId": "job_123"},
                "status": {
                    "state": "DONE",
                    "errors": [
                        {"reason": "invalidQuery", "message": "no such table"},
                        {"message": "second failure"}
                    ]
                }
            }"#,
        );
        assert!(job.is_done());
        assert_eq!(
            job.failure().unwrap(),
            "invalidQuery: no such table; second failure"
        );
    }

    #[test]
    fn clean_done_job_has_no_failure() {
        let job = job(
            r#"{
                "jobReference": {"jobId": "job_123"},
                "status": {"state": "DONE", "errors": []}
            }"#,
        );
        assert!(job.is_done());
        assert!(job.failure().is_none());
    }

    #[test]
    fn results_page_carries_token_and_rows() {
        let page: QueryResultsPage = serde_json::from_str(
            r#"{
                "jobComplete": true,
                "pageToken": "NEXT",
                "schema": {"fields": [{"name": "Id", "type": "INTEGER"}]},
                "rows": [{"f": [{"v": "1"}]}, {"f": [{"v": "2"}]}]
            }"#,
        )
        .unwrap();
        assert_eq!(page.page_token.as_deref(), Some("NEXT"));
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.job_complete, Some(true));
    }

    #[test]
    fn final_page_has_no_token() {
        let page: QueryResultsPage = serde_json::from_str(
            r#"{
                "jobComplete": true,
                "schema": {"fields": [{"name": "Id", "type": "INTEGER"}]},
                "rows": []
            }"#,
        )
        .unwrap();
        assert!(page.page_token.is_none());
        assert!(page.rows.is_empty());
    }
}
