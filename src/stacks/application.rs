use std::path::Path;

use super::{DeployEnv, StackManifest, StackProps};
use crate::config::{self, Error, ResolvedConfig};

pub const DESCRIPTION: &str = "Alerting resources (api)";

/// Stack deploying the alcf_ceilometer resources for one environment.
#[derive(Debug, Clone)]
pub struct AlcfCeilometerStack {
    pub config: ResolvedConfig,
    pub target_env: String,
    pub suffix: String,
    pub props: StackProps,
}

impl AlcfCeilometerStack {
    pub fn id_for(target_env: &str) -> String {
        format!("AlcfCeilometer{}", target_env)
    }

    pub fn new(
        config_path: &Path,
        target_env: &str,
        suffix: &str,
        use_git_info: bool,
        env: DeployEnv,
    ) -> Result<Self, Error> {
        let config = config::consolidate_config(config_path, target_env, use_git_info)?;
        Self::from_config(config, target_env, suffix, env)
    }

    pub fn from_config(
        config: ResolvedConfig,
        target_env: &str,
        suffix: &str,
        env: DeployEnv,
    ) -> Result<Self, Error> {
        let config = config.with_stack_name_suffix(suffix)?;
        let stack_name = config.settings()?.stack_name.unwrap_or_default();

        let props = StackProps {
            id: Self::id_for(target_env),
            stack_name,
            description: DESCRIPTION.to_string(),
            tags: config.resolve_tags(target_env),
            env,
        };

        Ok(Self {
            config,
            target_env: target_env.to_string(),
            suffix: suffix.to_string(),
            props,
        })
    }

    pub fn manifest(&self) -> StackManifest {
        StackManifest {
            props: self.props.clone(),
            git: self.config.git_info(),
            pipeline: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AlcfCeilometerStack;
    use crate::config::ResolvedConfig;
    use crate::stacks::DeployEnv;

    fn config(source: &str) -> ResolvedConfig {
        ResolvedConfig::new(serde_yaml::from_str(source).unwrap())
    }

    #[test]
    fn props_carry_suffixed_name_and_tags() {
        let stack = AlcfCeilometerStack::from_config(
            config("stack_name: AlcfCeilometer\nallow_multiple: true\ntags: {Team: core}"),
            "Dev",
            "feature-x",
            DeployEnv::new("123456789012", "us-west-2"),
        )
        .unwrap();

        assert_eq!(stack.props.id, "AlcfCeilometerDev");
        assert_eq!(stack.props.stack_name, "AlcfCeilometer-feature-x");
        assert_eq!(stack.props.description, "Alerting resources (api)");
        assert_eq!(stack.props.tags.get("Environment").unwrap(), "Dev");
        assert_eq!(stack.props.tags.get("Team").unwrap(), "core");
        assert_eq!(stack.config.stack_name(), Some("AlcfCeilometer-feature-x"));
    }

    #[test]
    fn manifest_without_git_info() {
        let stack = AlcfCeilometerStack::from_config(
            config("stack_name: AlcfCeilometer"),
            "Prod",
            "",
            DeployEnv::new("123456789012", "us-west-2"),
        )
        .unwrap();

        let manifest = serde_json::to_value(stack.manifest()).unwrap();

        assert_eq!(manifest["stack_name"], "AlcfCeilometer");
        assert_eq!(manifest["env"]["region"], "us-west-2");
        assert!(manifest.get("git").is_none());
        assert!(manifest.get("pipeline").is_none());
    }
}
