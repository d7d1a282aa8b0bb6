//! The text-detection subcommands.

use clap::Args;

use crate::{input::DocumentInput, prelude::*, textract::TextractClient, ui::Ui};

use super::{
    AsyncOperation, AwsOpts, StartJobOpts, log_document_summary, run_async_job,
    write_response,
};

/// Options for `detect-document-text`.
#[derive(Args, Debug)]
pub struct DetectOpts {
    /// The document to process, as a local path or an `s3://bucket/key` URI.
    pub input: String,

    /// Where to write the response JSON (`-` for standard output).
    pub output: PathBuf,

    #[clap(flatten)]
    pub aws: AwsOpts,
}

/// Run the `detect-document-text` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_detect_document_text(_ui: &Ui, opts: &DetectOpts) -> Result<()> {
    let input = DocumentInput::resolve(&opts.input).await?;
    input.check_sync_limits()?;

    let config = opts.aws.load_config().await?;
    let textract = TextractClient::new(&config);
    let response = textract.detect_document_text(&input).await?;

    log_document_summary(&response);
    write_response(&opts.output, &response).await
}

/// Options for `start-document-text-detection`.
#[derive(Args, Debug)]
pub struct StartDetectionOpts {
    /// The document to process, as a local path or an `s3://bucket/key` URI.
    pub input: String,

    #[clap(flatten)]
    pub job: StartJobOpts,

    #[clap(flatten)]
    pub aws: AwsOpts,
}

/// Run the `start-document-text-detection` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_start_document_text_detection(
    ui: &Ui,
    opts: &StartDetectionOpts,
) -> Result<()> {
    run_async_job(
        ui,
        &opts.input,
        AsyncOperation::TextDetection,
        &opts.job,
        &opts.aws,
    )
    .await
}
