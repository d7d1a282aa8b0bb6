use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod aws;
mod cmd;
mod document;
mod input;
mod prelude;
mod s3;
mod textract;
mod ui;

/// Extract text, tables and forms from documents with AWS Textract.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  Standard AWS environment variables and credential files are used
  to authenticate; --profile and --region override them.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Detect lines and words of text (synchronous, single-page documents).
    DetectDocumentText(cmd::detect::DetectOpts),

    /// Detect text in a multi-page document with an asynchronous job.
    StartDocumentTextDetection(cmd::detect::StartDetectionOpts),

    /// Analyze tables, forms and layout (synchronous, single-page documents).
    #[clap(alias = "AnalyzeDocument")]
    AnalyzeDocument(cmd::analyze::AnalyzeOpts),

    /// Analyze a multi-page document with an asynchronous job.
    StartDocumentAnalysis(cmd::analyze::StartAnalysisOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::DetectDocumentText(opts) => opts.output.as_path() == Path::new("-"),
            Cmd::AnalyzeDocument(opts) => opts.output.as_path() == Path::new("-"),
            Cmd::StartDocumentTextDetection(opts) => opts.job.s3_output_path.is_none(),
            Cmd::StartDocumentAnalysis(opts) => opts.job.s3_output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the spinner if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::DetectDocumentText(opts) => {
            cmd::detect::cmd_detect_document_text(&ui, opts).await?;
        }
        Cmd::StartDocumentTextDetection(opts) => {
            cmd::detect::cmd_start_document_text_detection(&ui, opts).await?;
        }
        Cmd::AnalyzeDocument(opts) => {
            cmd::analyze::cmd_analyze_document(&ui, opts).await?;
        }
        Cmd::StartDocumentAnalysis(opts) => {
            cmd::analyze::cmd_start_document_analysis(&ui, opts).await?;
        }
    }
    Ok(())
}
