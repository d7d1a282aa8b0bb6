//! S3 conveniences: `s3://` URI handling and the handful of object operations
//! we need around Textract calls.

use std::{fmt, str::FromStr};

use aws_sdk_s3::{error::DisplayErrorContext, primitives::ByteStream};

use crate::prelude::*;

/// A parsed `s3://bucket/key` location. The key may name an object or serve
/// as a prefix for [`S3Location::join`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct S3Location {
    /// The bucket name.
    pub bucket: String,
    /// The object key or key prefix, without a leading slash.
    pub key: String,
}

impl S3Location {
    /// Build a location for `name` underneath this one, treating our key as a
    /// prefix.
    pub fn join(&self, name: &str) -> S3Location {
        S3Location {
            bucket: self.bucket.clone(),
            key: format!("{}/{}", self.key.trim_end_matches('/'), name),
        }
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for S3Location {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |s: &str| -> Result<_> {
            let rest = s
                .strip_prefix("s3://")
                .ok_or_else(|| anyhow!("missing s3:// prefix"))?;
            let (bucket, key) = rest
                .split_once('/')
                .ok_or_else(|| anyhow!("expected s3://bucket/key"))?;
            if bucket.is_empty() || key.is_empty() {
                bail!("expected s3://bucket/key");
            }
            Ok(Self {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            })
        };
        parse(s).with_context(|| format!("failed to parse S3 location: {:?}", s))
    }
}

/// Upload a local file to S3.
#[instrument(level = "debug", skip(client))]
pub async fn upload_to_s3(
    client: &aws_sdk_s3::Client,
    location: &S3Location,
    path: &Path,
) -> Result<()> {
    let body = ByteStream::from_path(path)
        .await
        .with_context(|| format!("failed to read upload source {}", path.display()))?;
    client
        .put_object()
        .bucket(&location.bucket)
        .key(&location.key)
        .body(body)
        .send()
        .await
        .map_err(|err| {
            anyhow!(
                "failed to upload {} to {}: {}",
                path.display(),
                location,
                DisplayErrorContext(err)
            )
        })?;
    debug!(%location, "uploaded file to S3");
    Ok(())
}

/// Write a byte buffer to S3.
#[instrument(level = "debug", skip(client, bytes))]
pub async fn put_object_bytes(
    client: &aws_sdk_s3::Client,
    location: &S3Location,
    bytes: Vec<u8>,
    content_type: &str,
) -> Result<()> {
    client
        .put_object()
        .bucket(&location.bucket)
        .key(&location.key)
        .content_type(content_type)
        .body(ByteStream::from(bytes))
        .send()
        .await
        .map_err(|err| {
            anyhow!("failed to write {}: {}", location, DisplayErrorContext(err))
        })?;
    Ok(())
}

/// Delete an object from S3.
#[instrument(level = "debug", skip(client))]
pub async fn delete_from_s3(
    client: &aws_sdk_s3::Client,
    location: &S3Location,
) -> Result<()> {
    client
        .delete_object()
        .bucket(&location.bucket)
        .key(&location.key)
        .send()
        .await
        .map_err(|err| {
            anyhow!(
                "failed to delete {}: {}",
                location,
                DisplayErrorContext(err)
            )
        })?;
    Ok(())
}
