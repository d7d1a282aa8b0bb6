//! Polling asynchronous Textract jobs to completion.
//!
//! The Start* operations return a job id and nothing else; results are
//! observed by calling the matching Get* operation until the job reaches a
//! terminal status, then following `NextToken` pagination to gather every
//! page of blocks. The loop itself is deliberately behind a trait so it can
//! be driven by a scripted fake in tests.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_textract::types::{Block as SdkBlock, DocumentMetadata as SdkDocumentMetadata, JobStatus};
use tokio::time::Instant;

use crate::{
    document::response::{Block, DocumentMetadata, TextractResponse},
    prelude::*,
};

use super::{TextractClient, send_with_retry};

/// One Get* response: the job status plus (for terminal statuses) a page of
/// blocks and a pagination token.
#[derive(Debug)]
pub struct JobPage {
    pub status: JobStatus,
    pub status_message: Option<String>,
    pub document_metadata: Option<SdkDocumentMetadata>,
    pub detect_model_version: Option<String>,
    pub analyze_model_version: Option<String>,
    pub next_token: Option<String>,
    pub blocks: Vec<SdkBlock>,
}

/// The Get* side of an asynchronous Textract operation.
#[async_trait]
pub trait GetJobPages: Send + Sync {
    /// Fetch one page of job results.
    async fn get_page(&self, job_id: &str, next_token: Option<String>) -> Result<JobPage>;
}

/// Fetches pages of a text-detection job.
pub struct TextDetectionPages {
    client: TextractClient,
}

impl TextDetectionPages {
    pub fn new(client: TextractClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GetJobPages for TextDetectionPages {
    async fn get_page(&self, job_id: &str, next_token: Option<String>) -> Result<JobPage> {
        let builder = self
            .client
            .client
            .get_document_text_detection()
            .job_id(job_id)
            .set_next_token(next_token);
        let output = send_with_retry!(
            self.client.rate_limiter,
            "GetDocumentTextDetection",
            builder
        )?;
        Ok(JobPage {
            status: output
                .job_status()
                .cloned()
                .ok_or_else(|| anyhow!("GetDocumentTextDetection returned no job status"))?,
            status_message: output.status_message().map(str::to_owned),
            document_metadata: output.document_metadata().cloned(),
            detect_model_version: output
                .detect_document_text_model_version()
                .map(str::to_owned),
            analyze_model_version: None,
            next_token: output.next_token().map(str::to_owned),
            blocks: output.blocks.unwrap_or_default(),
        })
    }
}

/// Fetches pages of a document-analysis job.
pub struct AnalysisPages {
    client: TextractClient,
}

impl AnalysisPages {
    pub fn new(client: TextractClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GetJobPages for AnalysisPages {
    async fn get_page(&self, job_id: &str, next_token: Option<String>) -> Result<JobPage> {
        let builder = self
            .client
            .client
            .get_document_analysis()
            .job_id(job_id)
            .set_next_token(next_token);
        let output =
            send_with_retry!(self.client.rate_limiter, "GetDocumentAnalysis", builder)?;
        Ok(JobPage {
            status: output
                .job_status()
                .cloned()
                .ok_or_else(|| anyhow!("GetDocumentAnalysis returned no job status"))?,
            status_message: output.status_message().map(str::to_owned),
            document_metadata: output.document_metadata().cloned(),
            detect_model_version: None,
            analyze_model_version: output
                .analyze_document_model_version()
                .map(str::to_owned),
            next_token: output.next_token().map(str::to_owned),
            blocks: output.blocks.unwrap_or_default(),
        })
    }
}

/// Drives a started job to completion.
pub struct JobPoller {
    /// Time between status polls.
    interval: Duration,
    /// Give up after this much total waiting.
    timeout: Duration,
}

impl JobPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Poll until the job reaches a terminal status, then gather every page
    /// of results into a single response.
    ///
    /// `PARTIAL_SUCCESS` is treated like success: we merge the pages that
    /// exist and record the status so callers can see the job was cut short.
    #[instrument(level = "debug", skip(self, api))]
    pub async fn poll_to_completion(
        &self,
        api: &dyn GetJobPages,
        job_id: &str,
    ) -> Result<TextractResponse> {
        let started = Instant::now();
        let first = loop {
            let page = api.get_page(job_id, None).await?;
            match &page.status {
                JobStatus::InProgress => {
                    if started.elapsed() >= self.timeout {
                        bail!(
                            "timed out waiting for Textract job {} after {:.0?}",
                            job_id,
                            started.elapsed(),
                        );
                    }
                    trace!(job_id, "job still in progress");
                    tokio::time::sleep(self.interval).await;
                }
                JobStatus::Succeeded | JobStatus::PartialSuccess => break page,
                JobStatus::Failed => bail!(
                    "Textract job {} failed: {}",
                    job_id,
                    page.status_message.as_deref().unwrap_or("no status message"),
                ),
                other => bail!(
                    "Textract job {} returned unexpected status {:?}",
                    job_id,
                    other,
                ),
            }
        };

        let mut response = TextractResponse {
            document_metadata: first.document_metadata.as_ref().map(DocumentMetadata::from),
            detect_document_text_model_version: first.detect_model_version.clone(),
            analyze_document_model_version: first.analyze_model_version.clone(),
            job_status: Some(first.status.as_str().to_owned()),
            status_message: first.status_message.clone(),
            blocks: Vec::new(),
        };

        // Follow NextToken pagination, appending blocks in service order.
        let mut page = first;
        loop {
            response.blocks.extend(page.blocks.iter().map(Block::from));
            match page.next_token.take() {
                Some(token) => page = api.get_page(job_id, Some(token)).await?,
                None => break,
            }
        }
        debug!(
            job_id,
            blocks = response.blocks.len(),
            "collected all job results"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use aws_sdk_textract::types::BlockType;

    use super::*;

    /// A fake Get* API that serves a scripted sequence of pages.
    struct ScriptedJob {
        pages: Mutex<VecDeque<JobPage>>,
        /// Next tokens we expect to receive, in order.
        expected_tokens: Mutex<VecDeque<Option<String>>>,
    }

    impl ScriptedJob {
        fn new(pages: Vec<JobPage>, expected_tokens: Vec<Option<&str>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                expected_tokens: Mutex::new(
                    expected_tokens
                        .into_iter()
                        .map(|t| t.map(str::to_owned))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl GetJobPages for ScriptedJob {
        async fn get_page(
            &self,
            _job_id: &str,
            next_token: Option<String>,
        ) -> Result<JobPage> {
            let expected = self
                .expected_tokens
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra poll");
            assert_eq!(next_token, expected);
            Ok(self
                .pages
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra poll"))
        }
    }

    fn page(status: JobStatus, texts: &[&str], next_token: Option<&str>) -> JobPage {
        JobPage {
            status,
            status_message: None,
            document_metadata: None,
            detect_model_version: Some("1.0".to_owned()),
            analyze_model_version: None,
            next_token: next_token.map(str::to_owned),
            blocks: texts
                .iter()
                .map(|text| {
                    SdkBlock::builder()
                        .block_type(BlockType::Line)
                        .text(*text)
                        .build()
                })
                .collect(),
        }
    }

    fn fast_poller() -> JobPoller {
        JobPoller::new(Duration::from_millis(1), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_waits_through_in_progress_then_merges_pages() {
        let api = ScriptedJob::new(
            vec![
                page(JobStatus::InProgress, &[], None),
                page(JobStatus::InProgress, &[], None),
                page(JobStatus::Succeeded, &["first"], Some("t1")),
                page(JobStatus::Succeeded, &["second", "third"], None),
            ],
            vec![None, None, None, Some("t1")],
        );
        let response = fast_poller()
            .poll_to_completion(&api, "job-1")
            .await
            .unwrap();
        assert_eq!(response.job_status.as_deref(), Some("SUCCEEDED"));
        assert_eq!(
            response.detect_document_text_model_version.as_deref(),
            Some("1.0")
        );
        let texts: Vec<_> = response
            .blocks
            .iter()
            .map(|b| b.text.as_deref().unwrap())
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failed_job_reports_status_message() {
        let mut failed = page(JobStatus::Failed, &[], None);
        failed.status_message = Some("unsupported document".to_owned());
        let api = ScriptedJob::new(vec![failed], vec![None]);
        let err = fast_poller()
            .poll_to_completion(&api, "job-2")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("job-2"), "unexpected error: {message}");
        assert!(
            message.contains("unsupported document"),
            "unexpected error: {message}"
        );
    }

    #[tokio::test]
    async fn test_partial_success_still_merges_and_records_status() {
        let api = ScriptedJob::new(
            vec![page(JobStatus::PartialSuccess, &["only"], None)],
            vec![None],
        );
        let response = fast_poller()
            .poll_to_completion(&api, "job-3")
            .await
            .unwrap();
        assert_eq!(response.job_status.as_deref(), Some("PARTIAL_SUCCESS"));
        assert_eq!(response.blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_times_out_on_a_job_that_never_finishes() {
        struct NeverDone;

        #[async_trait]
        impl GetJobPages for NeverDone {
            async fn get_page(
                &self,
                _job_id: &str,
                _next_token: Option<String>,
            ) -> Result<JobPage> {
                Ok(JobPage {
                    status: JobStatus::InProgress,
                    status_message: None,
                    document_metadata: None,
                    detect_model_version: None,
                    analyze_model_version: None,
                    next_token: None,
                    blocks: Vec::new(),
                })
            }
        }

        let poller = JobPoller::new(Duration::from_millis(1), Duration::from_millis(5));
        let err = poller
            .poll_to_completion(&NeverDone, "job-4")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
