//! Sweep of one benchmark over several versions of a dependency.
//!
//! For every version the dependency is pinned by an [`Installer`], then a fresh process runs the
//! single-backend sweep through a [`BenchmarkExecutor`]. The child prints a [`SweepRecord`] as
//! its last line, which is decoded strictly. The first failure aborts the whole sweep.

use crate::common::VersionSweepConfig;
use crate::error::{Error, Result};
use crate::report::{SweepRecord, VersionRecord};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Pins a version of the swept dependency.
pub trait Installer {
    fn install(&mut self, version: &str) -> Result<()>;
}

/// Runs one sweep out of process and returns its standard output.
pub trait BenchmarkExecutor {
    fn execute(&mut self, version: &str) -> Result<String>;
}

fn substitute(template: &[String], version: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace("{version}", version))
        .collect()
}

/// Runs `argv` to completion and returns its stdout. A non-zero exit status is an error.
fn run_command(argv: &[String]) -> Result<String> {
    let command = argv.join(" ");
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Validation("empty command".into()))?;
    debug!(%command, "spawning");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| Error::Spawn {
            command: command.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(Error::CommandFailed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Installs by running an argv template, `{version}` is replaced in every argument.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    pub template: Vec<String>,
}

impl CommandInstaller {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }
}

impl Installer for CommandInstaller {
    fn install(&mut self, version: &str) -> Result<()> {
        run_command(&substitute(&self.template, version)).map(|_| ())
    }
}

/// Runs the sweep command and captures its stdout.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    pub command: Vec<String>,
}

impl CommandExecutor {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Executor for the configured bench command, asking the child to skip the
    /// `drop_last_proportions` largest scale factors. The child reads the same settings file
    /// as the parent.
    pub fn from_config(config: &VersionSweepConfig, settings_path: Option<&Path>) -> Self {
        let mut command = config.bench_command.clone();
        if let Some(path) = settings_path {
            command.push("--config".into());
            command.push(path.display().to_string());
        }
        if config.drop_last_proportions > 0 {
            command.push("--drop-last".into());
            command.push(config.drop_last_proportions.to_string());
        }
        Self { command }
    }
}

impl BenchmarkExecutor for CommandExecutor {
    fn execute(&mut self, version: &str) -> Result<String> {
        run_command(&substitute(&self.command, version))
    }
}

/// Installs and benchmarks every version in order, one record per version.
pub fn run_version_sweep<I, E>(
    versions: &[String],
    installer: &mut I,
    executor: &mut E,
) -> Result<Vec<VersionRecord>>
where
    I: Installer + ?Sized,
    E: BenchmarkExecutor + ?Sized,
{
    let mut records = Vec::with_capacity(versions.len());
    for version in versions {
        info!(%version, "installing");
        installer.install(version)?;
        info!(%version, "benchmarking");
        let output = executor.execute(version)?;
        let record = SweepRecord::from_output(&output)?;
        records.push(VersionRecord {
            version: version.clone(),
            times: record.times,
            sizes: record.sizes,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RECORD_SEPARATOR;

    #[derive(Default)]
    struct RecordingInstaller {
        installed: Vec<String>,
    }

    impl Installer for RecordingInstaller {
        fn install(&mut self, version: &str) -> Result<()> {
            self.installed.push(version.to_string());
            Ok(())
        }
    }

    struct FixedExecutor(String);

    impl BenchmarkExecutor for FixedExecutor {
        fn execute(&mut self, _version: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn records_follow_the_version_list() {
        let versions: Vec<String> = vec!["0.11.0".into(), "0.11.2".into(), "0.11.1".into()];
        let mut installer = RecordingInstaller::default();
        let mut executor = FixedExecutor(format!(
            "{RECORD_SEPARATOR}\n{{\"backend\":\"cpu\",\"times\":[0.5],\"sizes\":[\"(15, 19)\"]}}\n"
        ));
        let records = run_version_sweep(&versions, &mut installer, &mut executor).unwrap();
        assert_eq!(installer.installed, versions);
        let got: Vec<_> = records.iter().map(|r| r.version.clone()).collect();
        assert_eq!(got, versions);
        assert_eq!(records[1].sizes, vec!["(15, 19)".to_string()]);
    }

    #[test]
    fn malformed_output_aborts_the_sweep() {
        let versions: Vec<String> = vec!["a".into(), "b".into()];
        let mut installer = RecordingInstaller::default();
        let mut executor = FixedExecutor("__import__('os').system('true')".into());
        let err = run_version_sweep(&versions, &mut installer, &mut executor).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
        assert_eq!(installer.installed, vec!["a".to_string()]);
    }

    #[test]
    fn templates_substitute_version() {
        let template: Vec<String> = ["cargo", "update", "-p", "sprs", "--precise", "{version}"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(substitute(&template, "0.11.1")[5], "0.11.1");
    }

    #[test]
    fn executor_appends_drop_last() {
        let config = VersionSweepConfig::default();
        let executor = CommandExecutor::from_config(&config, None);
        let n = executor.command.len();
        assert_eq!(&executor.command[n - 2..], &["--drop-last".to_string(), "4".to_string()]);
        assert!(!executor.command.contains(&"--config".to_string()));
    }

    #[test]
    fn executor_forwards_settings_file() {
        let config = VersionSweepConfig {
            drop_last_proportions: 0,
            ..VersionSweepConfig::default()
        };
        let executor = CommandExecutor::from_config(&config, Some(Path::new("bench.toml")));
        let n = executor.command.len();
        assert_eq!(
            &executor.command[n - 2..],
            &["--config".to_string(), "bench.toml".to_string()]
        );
        assert_eq!(&executor.command[..n - 2], config.bench_command.as_slice());
    }

    #[cfg(unix)]
    #[test]
    fn child_receives_the_settings_path() {
        let config = VersionSweepConfig {
            bench_command: vec!["echo".into(), "sweep".into()],
            drop_last_proportions: 2,
            ..VersionSweepConfig::default()
        };
        let mut executor = CommandExecutor::from_config(&config, Some(Path::new("/tmp/bench.toml")));
        let output = executor.execute("0.11.0").unwrap();
        assert_eq!(output.trim(), "sweep --config /tmp/bench.toml --drop-last 2");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_reported() {
        let mut installer = CommandInstaller::new(vec!["false".into()]);
        assert!(matches!(
            installer.install("1.0"),
            Err(Error::CommandFailed { .. })
        ));
        let mut missing = CommandInstaller::new(vec!["/nonexistent/installer-binary".into()]);
        assert!(matches!(missing.install("1.0"), Err(Error::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn command_executor_captures_stdout() {
        let mut executor = CommandExecutor::new(vec!["echo".into(), "{version}".into()]);
        assert_eq!(executor.execute("0.11.2").unwrap().trim(), "0.11.2");
    }
}
