//! A thin client wrapper around the AWS Textract SDK.
//!
//! All the OCR and layout analysis happens inside the service; our job is to
//! marshal documents into API calls, stay under the service's request rate,
//! and retry the errors known to be transient.

pub mod poll;

use std::{sync::Arc, time::Duration};

use aws_sdk_textract::{
    error::{ProvideErrorMetadata, SdkError},
    types::{DocumentLocation, FeatureType, S3Object},
};
use clap::ValueEnum;
use leaky_bucket::RateLimiter;
use uuid::Uuid;

use crate::{
    document::response::TextractResponse, input::DocumentInput, prelude::*,
    s3::S3Location,
};

/// Textract request rate we stay under, per second. The service's default
/// quotas for the Get* calls are in the low single digits.
const REQUESTS_PER_SECOND: usize = 4;

/// How many times to attempt a single request before giving up on it.
pub(crate) const MAX_SEND_ATTEMPTS: usize = 5;

/// Backoff before the first retry of a throttled request. Doubles per retry.
pub(crate) const THROTTLE_BACKOFF_START: Duration = Duration::from_millis(500);

/// Send a Textract request, retrying known-transient failures with doubling
/// backoff. Fluent request builders are cloneable, which is what lets us
/// re-send.
macro_rules! send_with_retry {
    ($limiter:expr, $op_name:expr, $builder:expr) => {{
        let mut delay = $crate::textract::THROTTLE_BACKOFF_START;
        let mut attempt = 0usize;
        loop {
            $limiter.acquire_one().await;
            match $builder.clone().send().await {
                Ok(output) => break Ok(output),
                Err(err)
                    if $crate::textract::is_known_transient(&err)
                        && attempt + 1 < $crate::textract::MAX_SEND_ATTEMPTS =>
                {
                    ::tracing::warn!(
                        operation = $op_name,
                        attempt,
                        "retrying transient Textract error: {}",
                        ::aws_sdk_textract::error::DisplayErrorContext(&err)
                    );
                    ::tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => {
                    break Err(::anyhow::anyhow!(
                        "{} failed: {}",
                        $op_name,
                        ::aws_sdk_textract::error::DisplayErrorContext(err)
                    ));
                }
            }
        }
    }};
}

// Export the macro within the crate as if it were a normal symbol.
pub(crate) use send_with_retry;

/// Is this error likely to resolve on retry?
///
/// We assume errors are fatal until they've been observed in the wild and
/// determined to be transient. That keeps us from burning retries with
/// backoff on errors that will never succeed.
pub(crate) fn is_known_transient<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => true,
        _ => matches!(
            err.code(),
            Some(
                "ThrottlingException"
                    | "ProvisionedThroughputExceededException"
                    | "InternalServerError"
                    | "LimitExceededException"
            )
        ),
    }
}

/// Feature types for the analysis operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextractFeature {
    /// Extract tables and cells.
    Tables,
    /// Extract form key-value pairs.
    Forms,
    /// Extract layout elements (headers, paragraphs, etc).
    Layout,
    /// Detect signatures.
    Signatures,
}

impl TextractFeature {
    fn to_feature_type(self) -> FeatureType {
        match self {
            TextractFeature::Tables => FeatureType::Tables,
            TextractFeature::Forms => FeatureType::Forms,
            TextractFeature::Layout => FeatureType::Layout,
            TextractFeature::Signatures => FeatureType::Signatures,
        }
    }
}

/// Client wrapping the AWS Textract API.
#[derive(Clone)]
pub struct TextractClient {
    /// AWS Textract client.
    client: aws_sdk_textract::Client,

    /// A rate limiter to avoid hitting API limits.
    rate_limiter: Arc<RateLimiter>,
}

impl TextractClient {
    /// Create a new client from loaded AWS configuration.
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        let rate_limiter = RateLimiter::builder()
            .initial(REQUESTS_PER_SECOND)
            .refill(REQUESTS_PER_SECOND)
            .max(REQUESTS_PER_SECOND)
            .interval(Duration::from_secs(1))
            .build();
        Self {
            client: aws_sdk_textract::Client::new(config),
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    /// Detect lines and words of text with the synchronous API.
    #[instrument(level = "debug", skip_all)]
    pub async fn detect_document_text(
        &self,
        input: &DocumentInput,
    ) -> Result<TextractResponse> {
        let builder = self
            .client
            .detect_document_text()
            .document(input.to_document());
        let output = send_with_retry!(self.rate_limiter, "DetectDocumentText", builder)?;
        Ok(TextractResponse::from(output))
    }

    /// Analyze document structure with the synchronous API.
    #[instrument(level = "debug", skip_all, fields(features = ?features))]
    pub async fn analyze_document(
        &self,
        input: &DocumentInput,
        features: &[TextractFeature],
    ) -> Result<TextractResponse> {
        let builder = self
            .client
            .analyze_document()
            .document(input.to_document())
            .set_feature_types(Some(
                features.iter().map(|f| f.to_feature_type()).collect(),
            ));
        let output = send_with_retry!(self.rate_limiter, "AnalyzeDocument", builder)?;
        Ok(TextractResponse::from(output))
    }

    /// Start an asynchronous text-detection job for a document in S3.
    #[instrument(level = "debug", skip_all, fields(location = %location))]
    pub async fn start_text_detection(&self, location: &S3Location) -> Result<String> {
        let builder = self
            .client
            .start_document_text_detection()
            .document_location(document_location(location))
            .client_request_token(Uuid::new_v4().to_string());
        let output =
            send_with_retry!(self.rate_limiter, "StartDocumentTextDetection", builder)?;
        job_id(output.job_id(), "StartDocumentTextDetection")
    }

    /// Start an asynchronous analysis job for a document in S3.
    #[instrument(level = "debug", skip_all, fields(location = %location, features = ?features))]
    pub async fn start_analysis(
        &self,
        location: &S3Location,
        features: &[TextractFeature],
    ) -> Result<String> {
        let builder = self
            .client
            .start_document_analysis()
            .document_location(document_location(location))
            .set_feature_types(Some(
                features.iter().map(|f| f.to_feature_type()).collect(),
            ))
            .client_request_token(Uuid::new_v4().to_string());
        let output =
            send_with_retry!(self.rate_limiter, "StartDocumentAnalysis", builder)?;
        job_id(output.job_id(), "StartDocumentAnalysis")
    }
}

fn document_location(location: &S3Location) -> DocumentLocation {
    DocumentLocation::builder()
        .s3_object(
            S3Object::builder()
                .bucket(location.bucket.clone())
                .name(location.key.clone())
                .build(),
        )
        .build()
}

fn job_id(job_id: Option<&str>, op_name: &str) -> Result<String> {
    job_id
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("{} returned no job id", op_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_value_names_match_the_service() {
        // The CLI takes the same SCREAMING_SNAKE_CASE names the service uses.
        let parsed =
            TextractFeature::from_str("TABLES", false).expect("TABLES should parse");
        assert_eq!(parsed, TextractFeature::Tables);
        assert_eq!(parsed.to_feature_type(), FeatureType::Tables);
        assert_eq!(
            TextractFeature::from_str("FORMS", false).unwrap().to_feature_type(),
            FeatureType::Forms
        );
        assert!(TextractFeature::from_str("tables", false).is_err());
    }
}
