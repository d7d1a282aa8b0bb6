//! Command-line entry points.

use std::time::Duration;

use clap::Args;
use tokio::io::AsyncWriteExt as _;
use uuid::Uuid;

use crate::{
    aws::load_aws_config,
    document::{Document, response::TextractResponse},
    input::DocumentInput,
    prelude::*,
    s3::{S3Location, delete_from_s3, put_object_bytes, upload_to_s3},
    textract::{
        TextractClient, TextractFeature,
        poll::{AnalysisPages, GetJobPages, JobPoller, TextDetectionPages},
    },
    ui::{ProgressConfig, Ui},
};

pub mod analyze;
pub mod detect;

/// Options shared by every subcommand that talks to AWS.
#[derive(Args, Clone, Debug)]
pub struct AwsOpts {
    /// The AWS shared-credentials profile to use. Defaults to the standard
    /// credential chain.
    #[clap(long)]
    pub profile: Option<String>,

    /// Override the AWS region.
    #[clap(long)]
    pub region: Option<String>,
}

impl AwsOpts {
    /// Load AWS configuration for these options.
    pub async fn load_config(&self) -> Result<aws_config::SdkConfig> {
        load_aws_config(self.profile.as_deref(), self.region.as_deref()).await
    }
}

/// Options shared by the asynchronous `start-*` subcommands.
#[derive(Args, Clone, Debug)]
pub struct StartJobOpts {
    /// S3 prefix to upload local input files to, e.g. `s3://bucket/upload`.
    /// Required when the input is a local file, since the asynchronous APIs
    /// only read from S3.
    #[clap(long)]
    pub s3_upload_path: Option<S3Location>,

    /// S3 prefix to write the response JSON to, e.g. `s3://bucket/output`.
    /// Without this, the JSON goes to standard output.
    #[clap(long)]
    pub s3_output_path: Option<S3Location>,

    /// Seconds between job status polls.
    #[clap(long, default_value = "1")]
    pub poll_interval: u64,

    /// Give up on a job after waiting this many seconds.
    #[clap(long, default_value = "600")]
    pub poll_timeout: u64,
}

/// Which asynchronous operation to run.
pub(crate) enum AsyncOperation {
    TextDetection,
    Analysis { features: Vec<TextractFeature> },
}

/// Shared driver for the `start-*` subcommands: get the document into S3,
/// start the job, poll it to completion, and deliver the response.
pub(crate) async fn run_async_job(
    ui: &Ui,
    raw_input: &str,
    operation: AsyncOperation,
    job_opts: &StartJobOpts,
    aws_opts: &AwsOpts,
) -> Result<()> {
    let input = DocumentInput::resolve(raw_input).await?;
    let config = aws_opts.load_config().await?;
    let textract = TextractClient::new(&config);
    let s3 = aws_sdk_s3::Client::new(&config);

    // Make sure the document is in S3, uploading it if necessary.
    let (location, uploaded) = match (&input, &job_opts.s3_upload_path) {
        (DocumentInput::S3(location), _) => (location.clone(), None),
        (DocumentInput::Local { path, .. }, Some(upload_path)) => {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("document");
            let location = upload_path.join(&format!("{}-{}", Uuid::new_v4(), file_name));
            upload_to_s3(&s3, &location, path).await?;
            info!(location = %location, "uploaded input document");
            (location.clone(), Some(location))
        }
        (DocumentInput::Local { path, .. }, None) => bail!(
            "local input {} requires --s3-upload-path, because asynchronous Textract jobs only read from S3",
            path.display(),
        ),
    };

    // Start the job.
    let job_id = match &operation {
        AsyncOperation::TextDetection => textract.start_text_detection(&location).await?,
        AsyncOperation::Analysis { features } => {
            textract.start_analysis(&location, features).await?
        }
    };
    info!(job_id = %job_id, "started Textract job");

    // Poll it to completion.
    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "⏳",
        msg: "Waiting for Textract job",
        done_msg: "Textract job finished",
    });
    let pages: Box<dyn GetJobPages> = match &operation {
        AsyncOperation::TextDetection => {
            Box::new(TextDetectionPages::new(textract.clone()))
        }
        AsyncOperation::Analysis { .. } => Box::new(AnalysisPages::new(textract.clone())),
    };
    let poller = JobPoller::new(
        Duration::from_secs(job_opts.poll_interval),
        Duration::from_secs(job_opts.poll_timeout),
    );
    let result = poller.poll_to_completion(pages.as_ref(), &job_id).await;
    match &result {
        Ok(_) => spinner.finish(),
        Err(_) => spinner.finish_and_clear(),
    }

    // Clean up our uploaded copy whether or not the job worked out.
    if let Some(location) = uploaded
        && let Err(err) = delete_from_s3(&s3, &location).await
    {
        warn!("failed to delete uploaded document {}: {:?}", location, err);
    }

    let response = result?;
    log_document_summary(&response);

    // Deliver the response.
    match &job_opts.s3_output_path {
        Some(output_path) => {
            let location = output_path.join(&format!("{job_id}.json"));
            let json = serde_json::to_vec_pretty(&response)
                .context("failed to serialize response")?;
            put_object_bytes(&s3, &location, json, "application/json").await?;
            info!(location = %location, "wrote response JSON");
        }
        None => write_response(Path::new("-"), &response).await?,
    }
    Ok(())
}

/// Write a response as pretty-printed JSON to a file, or to standard output
/// when the path is `-`.
pub(crate) async fn write_response(
    path: &Path,
    response: &TextractResponse,
) -> Result<()> {
    let mut json =
        serde_json::to_vec_pretty(response).context("failed to serialize response")?;
    json.push(b'\n');
    if path == Path::new("-") {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(&json)
            .await
            .context("failed to write response to stdout")?;
        stdout.flush().await.context("failed to flush stdout")?;
    } else {
        tokio::fs::write(path, &json)
            .await
            .with_context(|| format!("failed to write output to {}", path.display()))?;
    }
    Ok(())
}

/// Log what the document model made of the response. Purely informational,
/// so a response the model can't digest is a warning, not a failure.
pub(crate) fn log_document_summary(response: &TextractResponse) {
    match Document::from_response(response) {
        Ok(document) => {
            info!(
                pages = document.pages.len(),
                lines = document
                    .pages
                    .iter()
                    .map(|p| p.lines.len())
                    .sum::<usize>(),
                words = document
                    .pages
                    .iter()
                    .flat_map(|p| p.lines.iter())
                    .map(|l| l.words.len())
                    .sum::<usize>(),
                tables = document
                    .pages
                    .iter()
                    .map(|p| p.tables.len())
                    .sum::<usize>(),
                key_values = document
                    .pages
                    .iter()
                    .map(|p| p.key_values.len())
                    .sum::<usize>(),
                "parsed document",
            );
        }
        Err(err) => warn!("could not build a document from the response: {:?}", err),
    }
}
