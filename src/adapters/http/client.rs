//! REST client for the testing service.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client as ReqwestClient, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::errors::ApiClientError;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ActiveExecution, ApiConfig, BatchApplyReport, ComparisonListEntry, ComparisonRequest,
    ComparisonRun, ComparisonStarted, DeployReport, DiagnosisReport, ExecutionRequest,
    ExecutionStarted, Fix, TestRun, VerificationReport,
};
use crate::domain::ports::{ComparisonApi, ExecutionApi, FixApi};

/// Implements every testing-service port over HTTP/JSON.
///
/// Outgoing requests share one token bucket so a fast poll loop and a CLI
/// command cannot together exceed `requests_per_second`.
pub struct HttpTestingApi {
    http: ReqwestClient,
    base_url: Url,
    limiter: DefaultDirectRateLimiter,
}

impl HttpTestingApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiClientError> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiClientError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiClientError::InvalidBaseUrl(config.base_url.clone()));
        }

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            http,
            base_url,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    /// Base url extended with `segments`, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiClientError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiClientError> {
        self.limiter.until_ready().await;
        debug!(method = "GET", path = url.path(), "testing api request");
        let response = self.http.get(url).send().await?;
        Self::parse(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, url: Url, body: &B) -> Result<T, ApiClientError> {
        self.limiter.until_ready().await;
        debug!(method = "POST", path = url.path(), "testing api request");
        let response = self.http.post(url).json(body).send().await?;
        Self::parse(response).await
    }

    /// POST whose response body is ignored.
    async fn post_unit(&self, url: Url) -> Result<(), ApiClientError> {
        self.limiter.until_ready().await;
        debug!(method = "POST", path = url.path(), "testing api request");
        let response = self.http.post(url).send().await?;
        Self::check(response).await.map(|_| ())
    }

    async fn check(response: Response) -> Result<Response, ApiClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        Err(ApiClientError::from_status(status, body))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ApiClientError> {
        let response = Self::check(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiClientError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ExecutionApi for HttpTestingApi {
    async fn start_execution(&self, request: &ExecutionRequest) -> DomainResult<ExecutionStarted> {
        Ok(self.post(self.url(&["api", "execution", "start"])?, request).await?)
    }

    async fn get_active_execution(&self) -> DomainResult<ActiveExecution> {
        Ok(self.get(self.url(&["api", "execution", "active"])?).await?)
    }

    async fn stop_execution(&self, run_id: &str) -> DomainResult<()> {
        Ok(self.post_unit(self.url(&["api", "execution", run_id, "stop"])?).await?)
    }

    async fn pause_execution(&self, run_id: &str) -> DomainResult<()> {
        Ok(self.post_unit(self.url(&["api", "execution", run_id, "pause"])?).await?)
    }

    async fn resume_execution(&self, run_id: &str) -> DomainResult<()> {
        Ok(self.post_unit(self.url(&["api", "execution", run_id, "resume"])?).await?)
    }

    async fn list_runs(&self) -> DomainResult<Vec<TestRun>> {
        Ok(self.get(self.url(&["api", "runs"])?).await?)
    }

    async fn get_run(&self, run_id: &str) -> DomainResult<TestRun> {
        Ok(self.get(self.url(&["api", "runs", run_id])?).await?)
    }
}

#[async_trait]
impl ComparisonApi for HttpTestingApi {
    async fn start_comparison(&self, request: &ComparisonRequest) -> DomainResult<ComparisonStarted> {
        Ok(self.post(self.url(&["api", "comparisons"])?, request).await?)
    }

    async fn get_comparison_run(&self, comparison_id: &str) -> DomainResult<ComparisonRun> {
        Ok(self.get(self.url(&["api", "comparisons", comparison_id])?).await?)
    }

    async fn list_comparisons(&self) -> DomainResult<Vec<ComparisonListEntry>> {
        Ok(self.get(self.url(&["api", "comparisons"])?).await?)
    }
}

#[async_trait]
impl FixApi for HttpTestingApi {
    async fn run_diagnosis(&self, run_id: &str, use_llm: bool) -> DomainResult<DiagnosisReport> {
        let body = json!({ "useLLM": use_llm });
        Ok(self.post(self.url(&["api", "runs", run_id, "diagnosis"])?, &body).await?)
    }

    async fn list_fixes(&self, run_id: Option<&str>) -> DomainResult<Vec<Fix>> {
        let mut url = self.url(&["api", "fixes"])?;
        if let Some(run_id) = run_id {
            url.query_pairs_mut().append_pair("runId", run_id);
        }
        Ok(self.get(url).await?)
    }

    async fn apply_batch_fixes(&self, fix_ids: &[String]) -> DomainResult<BatchApplyReport> {
        Ok(self.post(self.url(&["api", "fixes", "apply-batch"])?, &json!({ "fixIds": fix_ids })).await?)
    }

    async fn verify_fixes(&self, fix_ids: &[String]) -> DomainResult<VerificationReport> {
        Ok(self.post(self.url(&["api", "fixes", "verify"])?, &json!({ "fixIds": fix_ids })).await?)
    }

    async fn deploy_fixes(&self, fix_ids: &[String]) -> DomainResult<DeployReport> {
        Ok(self.post(self.url(&["api", "fixes", "deploy"])?, &json!({ "fixIds": fix_ids })).await?)
    }
}
