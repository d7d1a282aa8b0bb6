//! Resolving a CLI input argument into something Textract can consume.

use aws_sdk_textract::{
    primitives::Blob,
    types::{Document, S3Object},
};

use crate::{prelude::*, s3::S3Location};

/// Document types the synchronous Textract APIs accept.
const SUPPORTED_SYNC_TYPES: &[&str] =
    &["image/png", "image/jpeg", "image/tiff", "application/pdf"];

/// The synchronous APIs reject documents larger than this.
const MAX_SYNC_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// A document input, either read from the local filesystem or already sitting
/// in S3.
#[derive(Debug)]
pub enum DocumentInput {
    /// A local file, loaded into memory.
    Local {
        path: PathBuf,
        bytes: Vec<u8>,
        mime_type: String,
    },
    /// An object in S3, passed through to the service by reference.
    S3(S3Location),
}

impl DocumentInput {
    /// Resolve a raw CLI argument. Anything starting with `s3://` is parsed as
    /// an S3 location; everything else is read as a local file.
    pub async fn resolve(raw: &str) -> Result<Self> {
        if raw.starts_with("s3://") {
            return Ok(Self::S3(raw.parse()?));
        }
        let path = PathBuf::from(raw);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read input file {}", path.display()))?;
        let mime_type = sniff_mime_type(&path, &bytes);
        debug!(path = %path.display(), mime_type, "resolved local input");
        Ok(Self::Local {
            path,
            bytes,
            mime_type,
        })
    }

    /// Fail fast on documents the synchronous APIs would reject, before we
    /// spend a network round trip finding out.
    ///
    /// S3 inputs are validated by the service itself, since we never download
    /// them.
    pub fn check_sync_limits(&self) -> Result<()> {
        let Self::Local {
            path,
            bytes,
            mime_type,
        } = self
        else {
            return Ok(());
        };
        if !SUPPORTED_SYNC_TYPES.contains(&mime_type.as_str()) {
            bail!(
                "{} has type {}, but synchronous Textract calls only accept PNG, JPEG, TIFF and single-page PDF",
                path.display(),
                mime_type,
            );
        }
        if bytes.len() > MAX_SYNC_DOCUMENT_BYTES {
            bail!(
                "{} is {} bytes, over the {} byte limit for synchronous Textract calls (use a start-* subcommand instead)",
                path.display(),
                bytes.len(),
                MAX_SYNC_DOCUMENT_BYTES,
            );
        }
        if mime_type == "application/pdf" && pdf_page_count(bytes) > 1 {
            bail!(
                "{} has multiple pages; synchronous Textract calls only accept single-page PDFs (use a start-* subcommand instead)",
                path.display(),
            );
        }
        Ok(())
    }

    /// Convert to the SDK's `Document` type for a synchronous call.
    pub fn to_document(&self) -> Document {
        match self {
            Self::Local { bytes, .. } => {
                Document::builder().bytes(Blob::new(bytes.clone())).build()
            }
            Self::S3(location) => Document::builder()
                .s3_object(
                    S3Object::builder()
                        .bucket(location.bucket.clone())
                        .name(location.key.clone())
                        .build(),
                )
                .build(),
        }
    }
}

/// Sniff a MIME type from magic bytes, falling back to the file extension.
fn sniff_mime_type(path: &Path, bytes: &[u8]) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_owned();
    }
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_owned()
}

/// Count page objects in a PDF by scanning for `/Type /Page` markers.
///
/// This is a cheap plausibility check, not a PDF parser. It only has to
/// distinguish "one page" from "more than one page" for the synchronous-call
/// guard above; anything it misses the service will reject anyway.
fn pdf_page_count(bytes: &[u8]) -> usize {
    let mut count = 0;
    for marker in [b"/Type /Page".as_slice(), b"/Type/Page".as_slice()] {
        if bytes.len() < marker.len() {
            continue;
        }
        for start in 0..=bytes.len() - marker.len() {
            let end = start + marker.len();
            // `/Type /Pages` is the page *tree*, not a page.
            if &bytes[start..end] == marker && bytes.get(end) != Some(&b's') {
                count += 1;
            }
        }
    }
    count
}
