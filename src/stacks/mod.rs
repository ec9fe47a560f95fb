//! Stack definitions for alcf_ceilometer.
//!
//! A stack here only holds the resolved configuration and the properties
//! handed to the provisioning framework; the framework owns every resource.

use aws_config::meta::region::{ProvideRegion, RegionProviderChain};
use aws_types::region::Region;
use serde::{Deserialize, Serialize};

use crate::config::{Error, Tags};
use crate::git::GitInfo;

pub mod application;
pub mod pipeline;

pub use application::AlcfCeilometerStack;
pub use pipeline::PipelineStack;

/// Account and region a stack is deployed into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployEnv {
    pub account: String,
    pub region: String,
}

impl DeployEnv {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    /// Use `region` when given, otherwise fall back to the AWS default
    /// region provider chain (env vars, profile, IMDS).
    pub async fn resolve(account: String, region: Option<String>) -> Result<Self, Error> {
        let region = resolve_region(region).await?;
        Ok(Self { account, region })
    }
}

/// `region` if given, otherwise whatever the AWS default region provider
/// chain finds.
pub async fn resolve_region(region: Option<String>) -> Result<String, Error> {
    resolve_region_with(region, RegionProviderChain::default_provider()).await
}

pub async fn resolve_region_with(
    region: Option<String>,
    fallback: impl ProvideRegion,
) -> Result<String, Error> {
    if let Some(region) = region {
        return Ok(region);
    }

    fallback
        .region()
        .await
        .map(|region: Region| region.as_ref().to_string())
        .ok_or_else(|| Error::InvalidConfig {
            path: String::from("<environment>"),
            message: String::from(
                "no region given and none found in the AWS default provider chain",
            ),
        })
}

/// Properties every stack hands to the provisioning framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackProps {
    pub id: String,
    pub stack_name: String,
    pub description: String,
    pub tags: Tags,
    pub env: DeployEnv,
}

/// What gets written to the output directory for one stack.
#[derive(Debug, Clone, Serialize)]
pub struct StackManifest {
    #[serde(flatten)]
    pub props: StackProps,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<pipeline::PipelinePlan>,
}

impl StackManifest {
    pub fn stack_name(&self) -> &str {
        &self.props.stack_name
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_region_with, DeployEnv};
    use crate::config::Error;
    use aws_types::region::Region;

    #[tokio::test]
    async fn given_region_wins() {
        let region = resolve_region_with(Some(String::from("eu-west-1")), Region::new("us-west-2"))
            .await
            .unwrap();

        assert_eq!(region, "eu-west-1");
    }

    #[tokio::test]
    async fn falls_back_to_provider() {
        let region = resolve_region_with(None, Region::new("us-west-2")).await.unwrap();

        assert_eq!(region, "us-west-2");
    }

    #[tokio::test]
    async fn no_region_anywhere_is_invalid_config() {
        let result = resolve_region_with(None, None::<Region>).await;

        match result.err().unwrap() {
            Error::InvalidConfig { message, .. } => assert!(message.contains("no region given")),
            other => panic!("Expected `InvalidConfig` error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn deploy_env_keeps_explicit_region() {
        let env = DeployEnv::resolve(String::from("123456789012"), Some(String::from("us-west-2")))
            .await
            .unwrap();

        assert_eq!(env, DeployEnv::new("123456789012", "us-west-2"));
    }
}
