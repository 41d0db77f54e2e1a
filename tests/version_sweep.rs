use spectral_bench::report::{SweepRecord, RECORD_SEPARATOR};
use spectral_bench::versions::{run_version_sweep, BenchmarkExecutor, Installer};
use spectral_bench::{Error, Result};

struct NoopInstaller;

impl Installer for NoopInstaller {
    fn install(&mut self, _version: &str) -> Result<()> {
        Ok(())
    }
}

/// Prints what a child sweep prints: progress noise, the separator and one record.
struct LiteralExecutor {
    calls: Vec<String>,
}

impl BenchmarkExecutor for LiteralExecutor {
    fn execute(&mut self, version: &str) -> Result<String> {
        self.calls.push(version.to_string());
        let record = SweepRecord {
            backend: "cpu".into(),
            times: vec![0.01, 0.02, 0.04],
            sizes: vec!["(15, 19)".into(), "(30, 38)".into(), "(61, 77)".into()],
        };
        Ok(format!("warming up\n{RECORD_SEPARATOR}\n{}\n", record.to_line()?))
    }
}

struct FailingInstaller;

impl Installer for FailingInstaller {
    fn install(&mut self, version: &str) -> Result<()> {
        Err(Error::Validation(format!("no such version {version}")))
    }
}

#[test]
fn version_field_matches_input_verbatim() {
    let versions: Vec<String> = ["0.11.0", " 0.11.1-rc ", "0.11.2"]
        .into_iter()
        .map(String::from)
        .collect();
    let mut executor = LiteralExecutor { calls: Vec::new() };
    let records = run_version_sweep(&versions, &mut NoopInstaller, &mut executor).unwrap();
    assert_eq!(
        records.iter().map(|r| r.version.as_str()).collect::<Vec<_>>(),
        versions.iter().map(String::as_str).collect::<Vec<_>>()
    );
    assert_eq!(executor.calls, versions);
    assert!(records.iter().all(|r| r.sizes[2] == "(61, 77)"));
}

#[test]
fn failed_install_aborts_without_partial_results() {
    let versions = vec!["0.11.0".to_string()];
    let mut executor = LiteralExecutor { calls: Vec::new() };
    let err = run_version_sweep(&versions, &mut FailingInstaller, &mut executor).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(executor.calls.is_empty());
}

#[test]
fn empty_version_list_gives_no_records() {
    let mut executor = LiteralExecutor { calls: Vec::new() };
    let records = run_version_sweep(&[], &mut NoopInstaller, &mut executor).unwrap();
    assert!(records.is_empty());
}
