use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::{fs, io, path::Path};
use validator::Validate;

use crate::git::{self, GitCli, VersionControl};
use crate::merge::{self, MergeConflict};

/// Section holding the defaults shared by every environment.
pub const COMMON_SECTION: &str = "Common";

/// Sibling document holding the tags applied to every stack.
pub const TAGS_FILE: &str = "tags.yaml";

/// Tag that always carries the target environment.
pub const ENVIRONMENT_TAG: &str = "Environment";

pub type Tags = BTreeMap<String, String>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Unable to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Parsing error in {path}: {message}")]
    ParsingError { path: String, message: String },

    #[error("Invalid configuration in {path}: {message}")]
    InvalidConfig { path: String, message: String },

    #[error("Environment `{environment}` in {path} must be a mapping")]
    InvalidEnvironment { path: String, environment: String },

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error(transparent)]
    MergeConflict(#[from] MergeConflict),

    #[error(transparent)]
    VersionControl(#[from] git::Error),
}

/// Broad family an [`Error`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    VersionControl,
    MergeConflict,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MergeConflict(_) => ErrorKind::MergeConflict,
            Error::VersionControl(_) => ErrorKind::VersionControl,
            _ => ErrorKind::Configuration,
        }
    }
}

/// Typed view over the keys of a resolved config with defined semantics.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct StackSettings {
    #[validate(required, length(min = 1))]
    pub stack_name: Option<String>,

    #[serde(default)]
    pub allow_multiple: bool,
}

/// `Common` merged with one environment's overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    values: Mapping,
    stack_name_resolved: bool,
}

impl ResolvedConfig {
    pub fn new(values: Mapping) -> Self {
        Self {
            values,
            stack_name_resolved: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.values
    }

    pub fn into_mapping(self) -> Mapping {
        self.values
    }

    pub fn stack_name(&self) -> Option<&str> {
        self.values.get("stack_name").and_then(Value::as_str)
    }

    pub fn allow_multiple(&self) -> bool {
        self.values
            .get("allow_multiple")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Provenance recorded under `git`, if it has the expected shape.
    pub fn git_info(&self) -> Option<git::GitInfo> {
        let value = self.values.get("git")?.clone();
        match serde_yaml::from_value(value) {
            Ok(info) => Some(info),
            Err(error) => {
                tracing::warn!(%error, "Ignoring `git` entry that is not tag/branch/commit");
                None
            }
        }
    }

    pub fn settings(&self) -> Result<StackSettings, Error> {
        let settings: StackSettings = self.deserialize()?;
        settings
            .validate()
            .map_err(|error| Error::ValidationError(error.to_string()))?;
        Ok(settings)
    }

    /// Deserialize the whole resolved mapping into a typed view.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        serde_yaml::from_value(Value::Mapping(self.values.clone()))
            .map_err(|error| Error::ValidationError(error.to_string()))
    }

    /// Append `-{suffix}` to the stack name when multiple copies of the stack
    /// are allowed and a suffix is given.
    ///
    /// The name is resolved once: calling this again on the returned value
    /// leaves it untouched.
    pub fn with_stack_name_suffix(mut self, suffix: &str) -> Result<Self, Error> {
        let settings = self.settings()?;

        if self.stack_name_resolved {
            tracing::debug!(suffix, "Stack name already resolved, ignoring suffix");
            return Ok(self);
        }
        self.stack_name_resolved = true;

        if settings.allow_multiple && !suffix.is_empty() {
            let stack_name = format!("{}-{}", settings.stack_name.unwrap_or_default(), suffix);
            tracing::debug!(%stack_name, "Suffixed stack name");
            self.values.insert(Value::from("stack_name"), Value::from(stack_name));
        }

        Ok(self)
    }

    pub fn resolve_tags(&self, environment: &str) -> Tags {
        resolve_tags(&self.values, environment)
    }
}

/// Load `Common` from `config_path`, inject the sibling tags document and
/// overlay the section named after `environment`.
///
/// A missing environment section is not an error: the result is `Common`
/// with its tags. With `use_git_info` the tag, branch and short commit of the
/// current checkout are recorded under `git`.
pub fn consolidate_config(
    config_path: &Path,
    environment: &str,
    use_git_info: bool,
) -> Result<ResolvedConfig, Error> {
    let git = GitCli::new();
    let version_control: Option<&dyn VersionControl> = if use_git_info {
        Some(&git)
    } else {
        None
    };
    consolidate_config_with(config_path, environment, version_control)
}

/// [`consolidate_config`] with an injected provenance source.
pub fn consolidate_config_with(
    config_path: &Path,
    environment: &str,
    version_control: Option<&dyn VersionControl>,
) -> Result<ResolvedConfig, Error> {
    let display_path = config_path.display().to_string();
    let document = as_mapping(load_yaml(config_path)?, &display_path)?;

    let tags_path = config_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(TAGS_FILE);
    let tags = match load_yaml(&tags_path)? {
        Value::Null => Value::Mapping(Mapping::new()),
        Value::Mapping(tags) => Value::Mapping(tags),
        _ => {
            return Err(Error::InvalidConfig {
                path: tags_path.display().to_string(),
                message: String::from("tags must be a mapping of name to value"),
            })
        }
    };

    let mut common = match document.get(COMMON_SECTION) {
        Some(Value::Mapping(common)) => common.clone(),
        Some(_) => {
            return Err(Error::InvalidConfig {
                path: display_path,
                message: format!("`{}` must be a mapping", COMMON_SECTION),
            })
        }
        None => {
            return Err(Error::InvalidConfig {
                path: display_path,
                message: format!("missing `{}` section", COMMON_SECTION),
            })
        }
    };
    common.insert(Value::from("tags"), tags);

    let overrides = match document.get(environment) {
        None | Some(Value::Null) => {
            tracing::debug!(
                environment,
                path = %display_path,
                "No environment section, using Common only"
            );
            Mapping::new()
        }
        Some(Value::Mapping(overrides)) => overrides.clone(),
        Some(_) => {
            return Err(Error::InvalidEnvironment {
                path: display_path,
                environment: environment.to_string(),
            })
        }
    };

    let mut values = match merge::deep_merge(Value::Mapping(common), Value::Mapping(overrides))? {
        Value::Mapping(values) => values,
        _ => Mapping::new(),
    };

    if let Some(version_control) = version_control {
        let info = version_control.describe_repo()?;
        let info = serde_yaml::to_value(info).map_err(|error| Error::InvalidConfig {
            path: display_path.clone(),
            message: error.to_string(),
        })?;
        values.insert(Value::from("git"), info);
    }

    tracing::info!(path = %display_path, environment, "Consolidated configuration");

    Ok(ResolvedConfig::new(values))
}

/// The `tags` of `config` (empty when absent) with `Environment` set to
/// `environment`.
pub fn resolve_tags(config: &Mapping, environment: &str) -> Tags {
    let mut tags = Tags::new();

    if let Some(Value::Mapping(source)) = config.get("tags") {
        for (key, value) in source {
            let (Some(key), Some(value)) = (scalar_to_string(key), scalar_to_string(value)) else {
                tracing::warn!(?key, "Skipping tag with a non-scalar name or value");
                continue;
            };
            tags.insert(key, value);
        }
    }

    tags.insert(ENVIRONMENT_TAG.to_string(), environment.to_string());
    tags
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn load_yaml(path: &Path) -> Result<Value, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Io {
                path: path.display().to_string(),
                message: error.to_string(),
            }),
        },
    }?;

    serde_yaml::from_str(&contents).map_err(|error| Error::ParsingError {
        path: path.display().to_string(),
        message: error.to_string(),
    })
}

fn as_mapping(value: Value, path: &str) -> Result<Mapping, Error> {
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(Error::InvalidConfig {
            path: path.to_string(),
            message: String::from("document root must be a mapping"),
        }),
    }
}
