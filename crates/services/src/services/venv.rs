//! Python virtual environments managed by the site's `create_venv` /
//! `delete_venv` scripts.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use utils::validate::{self, ValidationError};

use super::{
    cluster::{Cluster, ClusterError},
    table::ParseError,
};

/// Module loads and pip installs take far longer than a query.
const CREATE_TIMEOUT: Duration = Duration::from_secs(600);

/// `module` is a shell function, so creation needs a login-style shell.
/// `$1` gcc module, `$2` python module, `$3` env name, `$4` description.
const CREATE_SCRIPT: &str =
    r#"source /etc/profile && module load "$1" "$2" && create_venv "$3" -d "$4""#;

#[derive(Debug, Error)]
pub enum VenvError {
    #[error("no virtual environment metadata found; create an environment first")]
    NoMetadata,
    #[error("virtual environment metadata is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("could not read virtual environment metadata: {0}")]
    Io(#[from] std::io::Error),
    #[error("{python} with {gcc} is not an available toolchain")]
    UnknownToolchain { python: String, gcc: String },
    #[error("missing required parameters: {0}")]
    MissingParameters(String),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl From<ValidationError> for VenvError {
    fn from(err: ValidationError) -> Self {
        VenvError::Cluster(err.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub python: String,
    pub gcc: String,
}

/// Python modules in the order `toolchains` lists them, each with the GCC
/// module it was built against. Serialized as a `{python: gcc}` object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolchains(Vec<Toolchain>);

impl Toolchains {
    pub fn contains(&self, python: &str, gcc: &str) -> bool {
        self.0.iter().any(|t| t.python == python && t.gcc == gcc)
    }
}

impl Serialize for Toolchains {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|t| (&t.python, &t.gcc)))
    }
}

/// Python lines of `toolchains`: the first is the column header, then
/// column 7 is the Python module and column 3 the GCC module. The listing
/// repeats itself per architecture, so it stops at the first repeat.
pub fn parse_toolchains(text: &str) -> Result<Toolchains, ParseError> {
    let mut toolchains: Vec<Toolchain> = Vec::new();
    for line in text.lines().filter(|line| line.contains("Python")).skip(1) {
        let cells: Vec<&str> = line.split_whitespace().collect();
        if cells.len() < 7 {
            continue;
        }
        if toolchains.iter().any(|t| t.python == cells[6]) {
            break;
        }
        toolchains.push(Toolchain {
            python: cells[6].to_string(),
            gcc: cells[2].to_string(),
        });
    }
    Ok(Toolchains(toolchains))
}

#[derive(Debug, Clone, Default)]
pub struct CreateVenv {
    pub env_name: Option<String>,
    pub description: Option<String>,
    pub python: Option<String>,
    pub gcc: Option<String>,
}

#[derive(Clone)]
pub struct VenvService {
    cluster: Cluster,
    scratch: PathBuf,
}

impl VenvService {
    pub fn new(cluster: Cluster, scratch: PathBuf) -> Self {
        Self { cluster, scratch }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.scratch.join("virtual_envs").join("metadata.json")
    }

    /// The metadata file written by `create_venv`, passed through untouched.
    pub async fn environments(&self) -> Result<Value, VenvError> {
        read_metadata(&self.metadata_path()).await
    }

    pub async fn delete(&self, name: &str) -> Result<String, VenvError> {
        let name = validate::env_name(name)?;
        let invocation = self
            .cluster
            .command("delete_venv")
            .arg(name)
            .env("SCRATCH", self.scratch.to_string_lossy());
        let trace = self.cluster.capture(invocation).await?;
        Ok(trace.stdout.trim().to_string())
    }

    pub async fn toolchains(&self) -> Result<Toolchains, VenvError> {
        let fetched = self
            .cluster
            .fetch(self.cluster.command("toolchains"), parse_toolchains)
            .await?;
        Ok(fetched.data)
    }

    pub async fn create(&self, request: CreateVenv) -> Result<String, VenvError> {
        let env_name = required(&request.env_name);
        let python = required(&request.python);
        let gcc = required(&request.gcc);
        let (Some(env_name), Some(python), Some(gcc)) = (env_name, python, gcc) else {
            let missing: Vec<&str> = [("envName", env_name), ("pyVersion", python), ("GCCversion", gcc)]
                .into_iter()
                .filter(|(_, value)| value.is_none())
                .map(|(field, _)| field)
                .collect();
            return Err(VenvError::MissingParameters(missing.join(", ")));
        };

        let env_name = validate::env_name(env_name)?;
        let python = validate::module_name(python)?;
        let gcc = validate::module_name(gcc)?;

        if !self.toolchains().await?.contains(python, gcc) {
            return Err(VenvError::UnknownToolchain {
                python: python.to_string(),
                gcc: gcc.to_string(),
            });
        }

        let invocation = self
            .cluster
            .script(CREATE_SCRIPT)
            .args([gcc, python, env_name, request.description.as_deref().unwrap_or_default()])
            .env("SCRATCH", self.scratch.to_string_lossy())
            .timeout(CREATE_TIMEOUT);
        self.cluster.capture(invocation).await?;
        tracing::info!(env = %env_name, %python, %gcc, "virtual environment created");
        Ok(format!("{env_name} was successfully created!"))
    }
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

async fn read_metadata(path: &Path) -> Result<Value, VenvError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(VenvError::NoMetadata),
        Err(err) => return Err(err.into()),
    };
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use utils::process::{CommandInvocation, ScriptedRunner};

    use super::*;
    use crate::services::cluster::testing;

    const TOOLCHAINS: &str = "\
  Toolchain  Compiler    GCCcore         MPI      BLAS       FFTW   Python
  2023a      GCC/12.3.0  GCCcore/12.3.0  OpenMPI  FlexiBLAS  FFTW   Python/3.11.3
  2022b      GCC/12.2.0  GCCcore/12.2.0  OpenMPI  FlexiBLAS  FFTW   Python/3.10.8
  2023a      GCC/12.3.0  GCCcore/12.3.0  OpenMPI  FlexiBLAS  FFTW   Python/3.11.3
  2021a      GCC/10.3.0  GCCcore/10.3.0  OpenMPI  FlexiBLAS  FFTW   Python/3.9.5
";

    fn service(runner: ScriptedRunner, scratch: &Path) -> (VenvService, Arc<ScriptedRunner>) {
        let (cluster, runner) = testing::cluster(runner);
        (VenvService::new(cluster, scratch.to_path_buf()), runner)
    }

    #[test]
    fn toolchains_stop_at_the_first_repeat() {
        let toolchains = parse_toolchains(TOOLCHAINS).unwrap();
        assert_eq!(
            serde_json::to_string(&toolchains).unwrap(),
            r#"{"Python/3.11.3":"GCCcore/12.3.0","Python/3.10.8":"GCCcore/12.2.0"}"#
        );
        assert!(toolchains.contains("Python/3.10.8", "GCCcore/12.2.0"));
        assert!(!toolchains.contains("Python/3.9.5", "GCCcore/10.3.0"));
    }

    #[tokio::test]
    async fn missing_metadata_is_reported_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let (venvs, _) = service(ScriptedRunner::new(), dir.path());
        assert!(matches!(venvs.environments().await, Err(VenvError::NoMetadata)));
    }

    #[tokio::test]
    async fn corrupt_metadata_is_not_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("virtual_envs")).unwrap();
        std::fs::write(dir.path().join("virtual_envs/metadata.json"), "{not json").unwrap();
        let (venvs, _) = service(ScriptedRunner::new(), dir.path());
        assert!(matches!(venvs.environments().await, Err(VenvError::Corrupt(_))));
    }

    #[tokio::test]
    async fn metadata_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("virtual_envs")).unwrap();
        let metadata = json!({"environments": [{"name": "ml", "GCCcore_version": "12.3.0"}]});
        std::fs::write(
            dir.path().join("virtual_envs/metadata.json"),
            metadata.to_string(),
        )
        .unwrap();
        let (venvs, _) = service(ScriptedRunner::new(), dir.path());
        assert_eq!(venvs.environments().await.unwrap(), metadata);
    }

    #[tokio::test]
    async fn create_rejects_unlisted_toolchains_before_running_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let (venvs, runner) = service(ScriptedRunner::new().on("toolchains", TOOLCHAINS), dir.path());
        let err = venvs
            .create(CreateVenv {
                env_name: Some("ml".into()),
                description: None,
                python: Some("Python/3.9.5".into()),
                gcc: Some("GCCcore/10.3.0".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VenvError::UnknownToolchain { .. }));
        assert_eq!(runner.calls(), vec!["toolchains".to_string()]);
    }

    #[tokio::test]
    async fn create_reports_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let (venvs, runner) = service(ScriptedRunner::new(), dir.path());
        let err = venvs
            .create(CreateVenv {
                env_name: Some(" ".into()),
                python: Some("Python/3.11.3".into()),
                ..CreateVenv::default()
            })
            .await
            .unwrap_err();
        let VenvError::MissingParameters(fields) = err else {
            panic!("expected missing parameters");
        };
        assert_eq!(fields, "envName, GCCversion");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn description_reaches_the_script_as_a_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let probe = CommandInvocation::shell(CREATE_SCRIPT).args([
            "GCCcore/12.3.0",
            "Python/3.11.3",
            "ml",
            "it's $(whoami)",
        ]);
        let (venvs, runner) = service(
            ScriptedRunner::new()
                .on("toolchains", TOOLCHAINS)
                .on(probe.command_line(), "created\n"),
            dir.path(),
        );
        let message = venvs
            .create(CreateVenv {
                env_name: Some("ml".into()),
                description: Some("it's $(whoami)".into()),
                python: Some("Python/3.11.3".into()),
                gcc: Some("GCCcore/12.3.0".into()),
            })
            .await
            .unwrap();
        assert_eq!(message, "ml was successfully created!");
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn delete_validates_the_name() {
        let dir = tempfile::tempdir().unwrap();
        let (venvs, runner) = service(ScriptedRunner::new(), dir.path());
        assert!(venvs.delete("../other").await.is_err());
        assert!(runner.calls().is_empty());
    }
}
