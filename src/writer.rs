use std::fs;
use std::path::{Path, PathBuf};

use crate::outputs::OutputsByEnvironment;
use crate::stacks::StackManifest;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unable to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to serialize {0}: {1}")]
    Serialization(String, serde_json::Error),
}

/// Write `manifest` to `{out_dir}/{stack_name}.json`, returning the path.
pub fn write_manifest(out_dir: &Path, manifest: &StackManifest) -> Result<PathBuf, Error> {
    fs::create_dir_all(out_dir).map_err(|source| Error::Io {
        path: out_dir.display().to_string(),
        source,
    })?;

    let path = out_dir.join(format!("{}.json", manifest.stack_name()));
    let contents = serde_json::to_string_pretty(manifest)
        .map_err(|error| Error::Serialization(manifest.stack_name().to_string(), error))?;
    write(&path, contents)?;

    tracing::info!(path = %path.display(), "Wrote stack manifest");
    Ok(path)
}

/// Write the outputs of every environment to a single JSON file at `path`.
pub fn write_outputs(path: &Path, outputs: &OutputsByEnvironment) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| Error::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let contents = serde_json::to_string_pretty(outputs)
        .map_err(|error| Error::Serialization(path.display().to_string(), error))?;
    write(path, contents)
}

fn write(path: &Path, contents: String) -> Result<(), Error> {
    fs::write(path, contents).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{write_manifest, write_outputs};
    use crate::outputs::{Outputs, OutputsByEnvironment};
    use crate::stacks::{DeployEnv, StackManifest, StackProps};
    use tempfile::tempdir;

    #[test]
    fn writes_manifest_named_after_stack() {
        let dir = tempdir().unwrap();
        let out_dir = dir.path().join("cdk.out");
        let manifest = StackManifest {
            props: StackProps {
                id: String::from("AlcfCeilometerDev"),
                stack_name: String::from("AlcfCeilometer-pr-12"),
                description: String::from("Alerting resources (api)"),
                tags: [(String::from("Environment"), String::from("Dev"))].into(),
                env: DeployEnv::new("123456789012", "us-west-2"),
            },
            git: None,
            pipeline: None,
        };

        let path = write_manifest(&out_dir, &manifest).unwrap();

        assert_eq!(path, out_dir.join("AlcfCeilometer-pr-12.json"));
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["tags"]["Environment"], "Dev");
        assert_eq!(written["id"], "AlcfCeilometerDev");
    }

    #[test]
    fn writes_outputs_of_every_environment_to_one_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deployed").join("outputs.json");
        let dev: Outputs = [(String::from("ApiUrl"), String::from("https://dev"))].into();
        let prod: Outputs = [(String::from("ApiUrl"), String::from("https://prod"))].into();
        let outputs: OutputsByEnvironment =
            [(String::from("Dev"), dev), (String::from("Prod"), prod)].into();

        write_outputs(&path, &outputs).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["Dev"]["ApiUrl"], "https://dev");
        assert_eq!(written["Prod"]["ApiUrl"], "https://prod");
    }
}
