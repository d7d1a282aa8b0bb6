//! AWS-related code shared by different modules.

use aws_config::{BehaviorVersion, Region};

use crate::prelude::*;

/// Load the user's AWS configuration using standard conventions, optionally
/// selecting a shared-credentials profile and overriding the region.
pub async fn load_aws_config(
    profile: Option<&str>,
    region: Option<&str>,
) -> Result<aws_config::SdkConfig> {
    let mut loader = aws_config::defaults(BehaviorVersion::v2025_01_17());
    if let Some(profile) = profile {
        validate_profile_name(profile)?;
        loader = loader.profile_name(profile);
    }
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_owned()));
    }
    Ok(loader.load().await)
}

/// Reject profile names the credentials file could never contain, before we
/// hand them to the SDK and get a far less helpful error back.
fn validate_profile_name(profile: &str) -> Result<()> {
    let valid = !profile.is_empty()
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-+=.,@".contains(c));
    if !valid {
        bail!("invalid AWS profile name: {:?}", profile);
    }
    Ok(())
}
