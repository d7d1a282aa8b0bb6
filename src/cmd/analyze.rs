//! The document-analysis subcommands.

use clap::Args;

use crate::{
    input::DocumentInput,
    prelude::*,
    textract::{TextractClient, TextractFeature},
    ui::Ui,
};

use super::{
    AsyncOperation, AwsOpts, StartJobOpts, log_document_summary, run_async_job,
    write_response,
};

/// Options for `analyze-document`.
#[derive(Args, Debug)]
pub struct AnalyzeOpts {
    /// The document to process, as a local path or an `s3://bucket/key` URI.
    pub input: String,

    /// Where to write the response JSON (`-` for standard output).
    pub output: PathBuf,

    /// Feature types to run, e.g. `--features TABLES FORMS`.
    #[clap(long, value_enum, num_args = 1.., required = true)]
    pub features: Vec<TextractFeature>,

    #[clap(flatten)]
    pub aws: AwsOpts,
}

/// Run the `analyze-document` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_analyze_document(_ui: &Ui, opts: &AnalyzeOpts) -> Result<()> {
    let input = DocumentInput::resolve(&opts.input).await?;
    input.check_sync_limits()?;

    let config = opts.aws.load_config().await?;
    let textract = TextractClient::new(&config);
    let response = textract.analyze_document(&input, &opts.features).await?;

    log_document_summary(&response);
    write_response(&opts.output, &response).await
}

/// Options for `start-document-analysis`.
#[derive(Args, Debug)]
pub struct StartAnalysisOpts {
    /// The document to process, as a local path or an `s3://bucket/key` URI.
    pub input: String,

    /// Feature types to run, e.g. `--features TABLES FORMS`.
    #[clap(long, value_enum, num_args = 1.., required = true)]
    pub features: Vec<TextractFeature>,

    #[clap(flatten)]
    pub job: StartJobOpts,

    #[clap(flatten)]
    pub aws: AwsOpts,
}

/// Run the `start-document-analysis` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_start_document_analysis(
    ui: &Ui,
    opts: &StartAnalysisOpts,
) -> Result<()> {
    run_async_job(
        ui,
        &opts.input,
        AsyncOperation::Analysis {
            features: opts.features.clone(),
        },
        &opts.job,
        &opts.aws,
    )
    .await
}
