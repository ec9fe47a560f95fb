use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use validator::{Validate, ValidationError};

use super::{AlcfCeilometerStack, DeployEnv, StackManifest, StackProps};
use crate::config::{self, Error, ResolvedConfig};

pub const DESCRIPTION: &str = "Pipeline to deploy alcf_ceilometer";

/// Directory of the app synthesizing the pipeline, relative to the repository root.
pub const PIPELINE_APP_DIR: &str = "apps/pipeline";

pub const PRODUCTION: &str = "Prod";
pub const PRE_PRODUCTION: &str = "PreProd";

const CREDENTIAL_PLUGIN: &str = "cdk-assume-role-credential-plugin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub domain: String,
    pub domain_owner: String,
    pub region: String,
    pub repository: String,
}

/// Typed view over a resolved pipeline config.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_exec_buckets"))]
pub struct PipelineSettings {
    #[validate(length(min = 1))]
    pub stack_name: String,

    #[validate(length(min = 1))]
    pub target_regions: Vec<String>,

    #[serde(default)]
    pub exec_buckets: BTreeMap<String, String>,

    pub codestar_connection_parameter: String,

    pub repository: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    pub stage_env: DeployEnv,

    pub codeartifact: CodeArtifact,

    pub docs_bucket_suffix: String,
}

fn default_branch() -> String {
    String::from("master")
}

fn validate_exec_buckets(settings: &PipelineSettings) -> Result<(), ValidationError> {
    if settings
        .target_regions
        .iter()
        .all(|region| settings.exec_buckets.contains_key(region))
    {
        return Ok(());
    }

    Err(ValidationError::new(
        "Every target region needs an entry in `exec_buckets`",
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, BTreeMap<String, String>>,
}

impl PolicyStatement {
    fn new(actions: &[&str], resources: Vec<String>) -> Self {
        Self {
            actions: actions.iter().map(|action| action.to_string()).collect(),
            resources,
            conditions: BTreeMap::new(),
        }
    }

    fn with_condition(mut self, operator: &str, key: &str, value: &str) -> Self {
        self.conditions
            .entry(operator.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildStep {
    pub name: String,
    pub install_commands: Vec<String>,
    pub commands: Vec<String>,
    pub role_policy_statements: Vec<PolicyStatement>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_output_directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    ManualApproval { name: String },
    Build(BuildStep),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage {
    pub id: String,
    pub target_env: String,
    pub stack_id: String,
    pub env: DeployEnv,
    pub pre: Vec<Step>,
    pub post: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceConnection {
    pub repository: String,
    pub branch: String,
    pub connection_arn_parameter: String,
}

/// Declared shape of the delivery pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelinePlan {
    pub cross_region_replication_buckets: BTreeMap<String, String>,
    pub source: SourceConnection,
    pub self_mutation_install_commands: Vec<String>,
    pub synth: BuildStep,
    pub docker_enabled_for_synth: bool,
    pub stages: Vec<Stage>,
}

/// Self-mutating pipeline deploying alcf_ceilometer for one environment.
#[derive(Debug, Clone)]
pub struct PipelineStack {
    pub config: ResolvedConfig,
    pub settings: PipelineSettings,
    pub target_env: String,
    pub props: StackProps,
    pub plan: PipelinePlan,
}

impl PipelineStack {
    pub fn new(config_path: &Path, target_env: &str, env: DeployEnv) -> Result<Self, Error> {
        let config = config::consolidate_config(config_path, target_env, false)?;
        Self::from_config(config, target_env, env)
    }

    pub fn from_config(
        config: ResolvedConfig,
        target_env: &str,
        env: DeployEnv,
    ) -> Result<Self, Error> {
        let settings: PipelineSettings = config.deserialize()?;
        settings
            .validate()
            .map_err(|error| Error::ValidationError(error.to_string()))?;

        // The construct id must match the deployed stack name or the
        // pipeline cannot update itself.
        let props = StackProps {
            id: settings.stack_name.clone(),
            stack_name: settings.stack_name.clone(),
            description: DESCRIPTION.to_string(),
            tags: config.resolve_tags(target_env),
            env,
        };
        let plan = plan(&settings, target_env, &props.env.account);

        Ok(Self {
            config,
            settings,
            target_env: target_env.to_string(),
            props,
            plan,
        })
    }

    pub fn manifest(&self) -> StackManifest {
        StackManifest {
            props: self.props.clone(),
            git: None,
            pipeline: Some(self.plan.clone()),
        }
    }
}

fn plan(settings: &PipelineSettings, target_env: &str, account: &str) -> PipelinePlan {
    let cross_region_replication_buckets = settings
        .target_regions
        .iter()
        .filter_map(|region| {
            settings
                .exec_buckets
                .get(region)
                .map(|bucket| (region.clone(), format!("arn:aws:s3:::{}", bucket)))
        })
        .collect();

    let source = SourceConnection {
        repository: settings.repository.clone(),
        branch: settings.branch.clone(),
        connection_arn_parameter: settings.codestar_connection_parameter.clone(),
    };

    let mut synth_policies = vec![PolicyStatement::new(
        &["sts:AssumeRole"],
        vec![format!("arn:aws:iam::{}:role/CDKReadRole", account)],
    )];
    synth_policies.extend(codeartifact_policies(&settings.codeartifact, account));

    let synth = BuildStep {
        name: String::from("Synth"),
        install_commands: vec![
            String::from("npm install -g aws-cdk"),
            format!("npm install -g {}", CREDENTIAL_PLUGIN),
            codeartifact_login(&settings.codeartifact),
            String::from("pip install --upgrade pip"),
            format!("pip install -q -r {}/requirements.txt", PIPELINE_APP_DIR),
        ],
        commands: vec![format!("cd {}", PIPELINE_APP_DIR), String::from("cdk synth")],
        role_policy_statements: synth_policies,
        primary_output_directory: Some(format!("{}/cdk.out", PIPELINE_APP_DIR)),
    };

    let stage = |env_name: &str, pre: Vec<Step>, post: Vec<Step>| Stage {
        id: format!("AlcfCeilometerApplicationStage{}", env_name),
        target_env: env_name.to_string(),
        stack_id: AlcfCeilometerStack::id_for(env_name),
        env: settings.stage_env.clone(),
        pre,
        post,
    };

    let prod = target_env == PRODUCTION;
    let docs = Step::Build(docs_build_step(
        &format!("{}-AlcfCeilometer-Docs", target_env),
        settings,
        account,
        prod,
    ));

    let stages = if prod {
        vec![
            stage(PRE_PRODUCTION, vec![], vec![]),
            stage(
                target_env,
                vec![Step::ManualApproval {
                    name: String::from("ApprovalBeforeDeployingProduction"),
                }],
                vec![docs],
            ),
        ]
    } else {
        vec![stage(target_env, vec![], vec![docs])]
    };

    PipelinePlan {
        cross_region_replication_buckets,
        source,
        self_mutation_install_commands: vec![format!("npm install -g {}", CREDENTIAL_PLUGIN)],
        synth,
        docker_enabled_for_synth: true,
        stages,
    }
}

fn docs_build_step(
    name: &str,
    settings: &PipelineSettings,
    account: &str,
    prod: bool,
) -> BuildStep {
    let docs_buckets = format!("arn:aws:s3:::*{}", settings.docs_bucket_suffix);

    let mut policies = codeartifact_policies(&settings.codeartifact, account);
    policies.push(PolicyStatement::new(&["ssm:GetParameter"], vec![String::from("*")]));
    policies.push(PolicyStatement::new(
        &["s3:GetObject", "s3:PutObject", "s3:ListBucket"],
        vec![docs_buckets.clone(), format!("{}/*", docs_buckets)],
    ));

    BuildStep {
        name: name.to_string(),
        install_commands: vec![
            codeartifact_login(&settings.codeartifact),
            String::from("pip install --upgrade pip"),
            String::from("pip install -q -r docs/requirements-docs.txt"),
            String::from("for file in apps/**/requirements.txt; do pip install -q -r $file; done"),
            String::from(
                "for file in lambdas/**/**/requirements.txt; do pip install -q -r $file; done",
            ),
        ],
        commands: vec![
            String::from("make -C docs/ gen_all"),
            format!(
                "make -C docs/ publish IS_COMMIT_TAGGED={}",
                if prod { "True" } else { "False" }
            ),
        ],
        role_policy_statements: policies,
        primary_output_directory: None,
    }
}

fn codeartifact_login(codeartifact: &CodeArtifact) -> String {
    format!(
        "aws codeartifact --region {} login --domain {} --domain-owner {} --tool pip \
         --repository {}",
        codeartifact.region, codeartifact.domain, codeartifact.domain_owner, codeartifact.repository
    )
}

fn codeartifact_policies(codeartifact: &CodeArtifact, account: &str) -> Vec<PolicyStatement> {
    let domain = &codeartifact.domain;
    vec![
        PolicyStatement::new(
            &[
                "codeartifact:GetAuthorizationToken",
                "codeartifact:GetRepositoryEndpoint",
                "codeartifact:ReadFromRepository",
            ],
            vec![
                format!("arn:aws:codeartifact:*:{}:domain/{}", account, domain),
                format!("arn:aws:codeartifact:*:{}:package/{}/*/*/*/*", account, domain),
                format!("arn:aws:codeartifact:*:{}:repository/{}/fr*", account, domain),
            ],
        ),
        PolicyStatement::new(&["sts:GetServiceBearerToken"], vec![String::from("*")])
            .with_condition(
                "StringEquals",
                "sts:AWSServiceName",
                "codeartifact.amazonaws.com",
            ),
    ]
}
