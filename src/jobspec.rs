//! Batch job specifications.
//!
//! A `JobSpec` is an owned value. Every builder step consumes it and returns
//! the updated spec, so two specs derived from one base never share state:
//!
//! ```
//! use slurm_relay::JobSpec;
//!
//! let base = JobSpec::new("train.sh").nodes(2);
//! let small = base.clone().ntasks(4);
//! let large = base.ntasks(16).exclusive();
//! assert_ne!(small, large);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SlurmError;
use crate::serde::flag_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    After,
    AfterOk,
    AfterNotOk,
    AfterAny,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DependencyKind::After => "after",
            DependencyKind::AfterOk => "afterok",
            DependencyKind::AfterNotOk => "afternotok",
            DependencyKind::AfterAny => "afterany",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub job_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Batch script or executable handed to sbatch.
    exec: String,
    /// Flags rendered as `--key=value`, or `--key` when the value is absent.
    #[serde(default, deserialize_with = "flag_map")]
    args: BTreeMap<String, Option<String>>,
    /// Kept in declaration order of their kinds.
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

impl JobSpec {
    pub fn new(exec: impl Into<String>) -> Self {
        Self {
            exec: exec.into(),
            args: BTreeMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Load a spec from a YAML file:
    ///
    /// ```yaml
    /// exec: train.sh
    /// args:
    ///   nodes: 2
    ///   exclusive: ~
    /// dependencies:
    ///   - kind: afterok
    ///     job_ids: ["41"]
    /// ```
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SlurmError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            SlurmError::InvalidJobSpec(format!("cannot open {}: {}", path.display(), e))
        })?;
        let spec: JobSpec = serde_yaml::from_reader(file)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn exec(&self) -> &str {
        &self.exec
    }

    pub fn args(&self) -> &BTreeMap<String, Option<String>> {
        &self.args
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Rejects specs that would render into a broken command line.
    pub fn validate(&self) -> Result<(), SlurmError> {
        if self.exec.trim().is_empty() {
            return Err(SlurmError::InvalidJobSpec("empty executable".to_string()));
        }
        for key in self.args.keys() {
            if key.is_empty()
                || key.starts_with('-')
                || key.chars().any(|c| c.is_whitespace() || c == '=')
            {
                return Err(SlurmError::InvalidJobSpec(format!("bad flag name '{}'", key)));
            }
        }
        for dependency in &self.dependencies {
            if dependency.job_ids.is_empty() {
                return Err(SlurmError::InvalidJobSpec(format!(
                    "{} dependency without job ids",
                    dependency.kind
                )));
            }
        }
        Ok(())
    }

    /// Flags in render order, with the synthesized `dependency` flag last.
    pub fn construct_args(&self) -> Vec<(String, Option<String>)> {
        let mut args: Vec<_> = self
            .args
            .iter()
            .filter(|(key, _)| key.as_str() != "dependency")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let deps: Vec<String> = self
            .dependencies
            .iter()
            .map(|d| format!("{}:{}", d.kind, d.job_ids.join(":")))
            .collect();
        if !deps.is_empty() {
            args.push(("dependency".to_string(), Some(deps.join(","))));
        } else if let Some(raw) = self.args.get("dependency") {
            args.push(("dependency".to_string(), raw.clone()));
        }
        args
    }

    #[must_use]
    pub fn with_exec(mut self, exec: impl Into<String>) -> Self {
        self.exec = exec.into();
        self
    }

    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.insert(key.into(), Some(value.to_string()));
        self
    }

    #[must_use]
    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.args.insert(key.into(), None);
        self
    }

    #[must_use]
    pub fn depends_on(mut self, kind: DependencyKind, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        match self.dependencies.iter_mut().find(|d| d.kind == kind) {
            Some(dependency) => dependency.job_ids.push(job_id),
            None => self.dependencies.push(Dependency {
                kind,
                job_ids: vec![job_id],
            }),
        }
        self
    }

    #[must_use]
    pub fn after(self, job_id: impl Into<String>) -> Self {
        self.depends_on(DependencyKind::After, job_id)
    }

    #[must_use]
    pub fn after_ok(self, job_id: impl Into<String>) -> Self {
        self.depends_on(DependencyKind::AfterOk, job_id)
    }

    #[must_use]
    pub fn after_not_ok(self, job_id: impl Into<String>) -> Self {
        self.depends_on(DependencyKind::AfterNotOk, job_id)
    }

    #[must_use]
    pub fn after_any(self, job_id: impl Into<String>) -> Self {
        self.depends_on(DependencyKind::AfterAny, job_id)
    }

    #[must_use]
    pub fn exclusive(self) -> Self {
        self.flag("exclusive")
    }

    #[must_use]
    pub fn nodes(self, n: u32) -> Self {
        self.arg("nodes", n)
    }

    #[must_use]
    pub fn ntasks(self, n: u32) -> Self {
        self.arg("ntasks", n)
    }

    #[must_use]
    pub fn ntasks_per_node(self, n: u32) -> Self {
        self.arg("ntasks-per-node", n)
    }

    #[must_use]
    pub fn cpus_per_task(self, n: u32) -> Self {
        self.arg("cpus-per-task", n)
    }

    /// Memory per CPU in any unit sbatch accepts (`4G`, `500M`, ...).
    #[must_use]
    pub fn mem_per_cpu(self, mem: impl ToString) -> Self {
        self.arg("mem-per-cpu", mem)
    }

    #[must_use]
    pub fn job_name(self, name: impl ToString) -> Self {
        self.arg("job-name", name)
    }

    #[must_use]
    pub fn output(self, path: impl ToString) -> Self {
        self.arg("output", path)
    }

    #[must_use]
    pub fn partition(self, partition: impl ToString) -> Self {
        self.arg("partition", partition)
    }

    #[must_use]
    pub fn account(self, account: impl ToString) -> Self {
        self.arg("account", account)
    }

    #[must_use]
    pub fn time(self, limit: impl ToString) -> Self {
        self.arg("time", limit)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_builder_steps_do_not_alias() {
        let base = JobSpec::new("run.sh").after_ok("1");
        let a = base.clone().after_ok("2");
        let b = base.clone().after_any("3");
        assert_eq!(base.dependencies()[0].job_ids, vec!["1"]);
        assert_eq!(a.dependencies()[0].job_ids, vec!["1", "2"]);
        assert_eq!(b.dependencies().len(), 2);
    }

    #[test]
    fn test_construct_args_joins_dependencies() {
        let spec = JobSpec::new("run.sh")
            .after_ok("1")
            .after_any("5")
            .after_ok("2");
        let args = spec.construct_args();
        assert_eq!(
            args,
            vec![(
                "dependency".to_string(),
                Some("afterok:1:2,afterany:5".to_string())
            )]
        );
    }

    #[test]
    fn test_construct_args_keeps_bare_flags() {
        let spec = JobSpec::new("run.sh").exclusive().ntasks_per_node(8);
        assert_eq!(
            spec.construct_args(),
            vec![
                ("exclusive".to_string(), None),
                ("ntasks-per-node".to_string(), Some("8".to_string())),
            ]
        );
    }

    #[test]
    fn test_raw_dependency_arg_passes_through() {
        let spec = JobSpec::new("run.sh").arg("dependency", "singleton");
        assert_eq!(
            spec.construct_args(),
            vec![("dependency".to_string(), Some("singleton".to_string()))]
        );
    }

    #[test]
    fn test_validate_rejects_bad_flags() {
        assert!(JobSpec::new("run.sh").flag("bad flag").validate().is_err());
        assert!(JobSpec::new("run.sh").flag("--nodes").validate().is_err());
        assert!(JobSpec::new("  ").validate().is_err());
        assert!(JobSpec::new("run.sh").nodes(1).validate().is_ok());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
exec: train.sh
args:
  nodes: 2
  mem-per-cpu: 4G
  exclusive: ~
  requeue: true
dependencies:
  - kind: afterok
    job_ids: ["41", "42"]
"#
        )
        .unwrap();
        let spec = JobSpec::from_yaml_file(file.path()).unwrap();
        assert_eq!(spec.exec(), "train.sh");
        assert_eq!(spec.args()["nodes"], Some("2".to_string()));
        assert_eq!(spec.args()["mem-per-cpu"], Some("4G".to_string()));
        assert_eq!(spec.args()["exclusive"], None);
        assert_eq!(spec.args()["requeue"], Some("true".to_string()));
        let built = JobSpec::new("train.sh")
            .nodes(2)
            .mem_per_cpu("4G")
            .exclusive()
            .arg("requeue", true)
            .after_ok("41")
            .after_ok("42");
        assert_eq!(spec, built);
    }

    #[test]
    fn test_from_yaml_file_rejects_nested_values() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "exec: train.sh\nargs:\n  nodes: [1, 2]\n").unwrap();
        assert!(matches!(
            JobSpec::from_yaml_file(file.path()),
            Err(SlurmError::JobSpecFile(_))
        ));
    }
}
