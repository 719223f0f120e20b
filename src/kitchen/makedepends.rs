// src/kitchen/makedepends.rs

//! Build-time dependency installation
//!
//! The host package manager is an external, shared resource. The engine only
//! asks it two things: which dependencies are missing, and to install some
//! packages if absent. It never removes anything.

use crate::config::DependencySection;
use crate::error::{Error, Result, Stage};
use crate::kitchen::runner::{CommandRunner, CommandSpec};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A build dependency, possibly version-qualified (`"meson >= 1.2"`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: String,
    /// Operator and version with whitespace removed (`">=1.2"`)
    pub constraint: Option<String>,
}

impl DependencySpec {
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        match spec.find(['<', '>', '=']) {
            Some(idx) => {
                let constraint: String = spec[idx..].split_whitespace().collect();
                Self {
                    name: spec[..idx].trim().to_string(),
                    constraint: (!constraint.is_empty()).then_some(constraint),
                }
            }
            None => Self {
                name: spec.to_string(),
                constraint: None,
            },
        }
    }

    /// Compact form understood by pacman-style tools (`meson>=1.2`)
    pub fn to_compact(&self) -> String {
        match &self.constraint {
            Some(c) => format!("{}{}", self.name, c),
            None => self.name.clone(),
        }
    }
}

/// Result of an install request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatus {
    Installed,
    /// Another process holds the package database lock
    Locked(String),
}

/// Host package manager capability
///
/// Implementations must treat already-installed packages as success.
pub trait PackageManager: Send + Sync {
    /// Subset of `deps` that is not currently satisfied, in input order
    fn check_missing(&self, deps: &[String], runner: &CommandRunner) -> Result<Vec<String>>;

    /// Install `deps` if absent
    fn install(&self, deps: &[String], runner: &CommandRunner) -> Result<InstallStatus>;
}

/// Assumes every dependency is present (pre-provisioned build hosts)
pub struct NoopPackageManager;

impl PackageManager for NoopPackageManager {
    fn check_missing(&self, _deps: &[String], _runner: &CommandRunner) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn install(&self, _deps: &[String], _runner: &CommandRunner) -> Result<InstallStatus> {
        Ok(InstallStatus::Installed)
    }
}

/// Drives the host package manager through configurable command lines
#[derive(Debug, Clone)]
pub struct HostPackageManager {
    query_command: Vec<String>,
    install_command: Vec<String>,
    lock_patterns: Vec<String>,
}

impl HostPackageManager {
    pub fn new(config: &DependencySection) -> Self {
        Self {
            query_command: config.query_command.clone(),
            install_command: config.install_command.clone(),
            lock_patterns: config.lock_patterns.clone(),
        }
    }

    fn command(argv: &[String], what: &str) -> Result<CommandSpec> {
        CommandSpec::from_argv(argv).ok_or_else(|| Error::DependencyInstall {
            unresolved: Vec::new(),
            reason: format!("no {} command configured", what),
        })
    }

    pub fn is_lock_error(&self, output: &str) -> bool {
        self.lock_patterns
            .iter()
            .any(|pattern| output.contains(pattern.as_str()))
    }
}

impl PackageManager for HostPackageManager {
    fn check_missing(&self, deps: &[String], runner: &CommandRunner) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for dep in deps {
            let spec = Self::command(&self.query_command, "query")?
                .arg(DependencySpec::parse(dep).to_compact());
            let output = runner.run(&spec, Stage::Dependencies)?;
            if !output.success {
                debug!("{} is not installed", dep);
                missing.push(dep.clone());
            }
        }
        Ok(missing)
    }

    fn install(&self, deps: &[String], runner: &CommandRunner) -> Result<InstallStatus> {
        let spec = Self::command(&self.install_command, "install")?
            .args(deps.iter().map(|d| DependencySpec::parse(d).to_compact()));
        let output = runner.run(&spec, Stage::Dependencies)?;
        if output.success {
            return Ok(InstallStatus::Installed);
        }

        let combined = output.combined();
        if self.is_lock_error(&combined) {
            return Ok(InstallStatus::Locked(output.tail(3)));
        }
        Err(Error::DependencyInstall {
            unresolved: deps.to_vec(),
            reason: output.tail(10),
        })
    }
}

/// What the installer did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DependencyReport {
    pub already_installed: Vec<String>,
    pub newly_installed: Vec<String>,
}

/// Ensures build dependencies are present before any build step runs
pub struct DependencyInstaller<'a> {
    manager: &'a dyn PackageManager,
    runner: &'a CommandRunner,
    lock_retries: u32,
    lock_retry_delay: Duration,
}

impl<'a> DependencyInstaller<'a> {
    pub fn new(
        manager: &'a dyn PackageManager,
        runner: &'a CommandRunner,
        config: &DependencySection,
    ) -> Self {
        Self {
            manager,
            runner,
            lock_retries: config.lock_retries,
            lock_retry_delay: Duration::from_millis(config.lock_retry_delay_ms),
        }
    }

    /// Make sure every dependency is installed
    ///
    /// Fails with [`Error::DependencyInstall`] naming whatever is still
    /// missing afterwards.
    pub fn ensure_installed(&self, deps: &[String]) -> Result<DependencyReport> {
        if deps.is_empty() {
            debug!("No build dependencies declared");
            return Ok(DependencyReport::default());
        }
        info!("Checking build dependencies: {}", deps.join(", "));

        let missing = self.manager.check_missing(deps, self.runner)?;
        let already_installed: Vec<String> = deps
            .iter()
            .filter(|d| !missing.contains(d))
            .cloned()
            .collect();
        if missing.is_empty() {
            info!("All build dependencies are already installed");
            return Ok(DependencyReport {
                already_installed,
                newly_installed: Vec::new(),
            });
        }

        info!("Installing missing build dependencies: {}", missing.join(", "));
        self.install_with_retry(&missing)?;

        let unresolved = self.manager.check_missing(&missing, self.runner)?;
        if !unresolved.is_empty() {
            return Err(Error::DependencyInstall {
                unresolved,
                reason: "still missing after installation".to_string(),
            });
        }

        Ok(DependencyReport {
            already_installed,
            newly_installed: missing,
        })
    }

    fn install_with_retry(&self, missing: &[String]) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.manager.install(missing, self.runner)? {
                InstallStatus::Installed => return Ok(()),
                InstallStatus::Locked(detail) if attempt <= self.lock_retries => {
                    let delay = self.lock_retry_delay * attempt;
                    warn!(
                        "Package database locked (attempt {}), retrying in {:?}: {}",
                        attempt, delay, detail
                    );
                    self.sleep(delay)?;
                }
                InstallStatus::Locked(detail) => {
                    return Err(Error::DependencyInstall {
                        unresolved: missing.to_vec(),
                        reason: format!(
                            "package database still locked after {} attempts: {}",
                            attempt, detail
                        ),
                    });
                }
            }
        }
    }

    /// Sleep without overrunning the pipeline deadline
    fn sleep(&self, delay: Duration) -> Result<()> {
        let deadline = self.runner.deadline();
        let delay = deadline.remaining().map_or(Duration::ZERO, |left| left.min(delay));
        std::thread::sleep(delay);
        deadline.check(Stage::Dependencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kitchen::runner::{CancelFlag, Deadline};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory package database
    struct MockPackageManager {
        installed: Mutex<HashSet<String>>,
        available: HashSet<String>,
        locked_attempts: Mutex<u32>,
        install_calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockPackageManager {
        fn new(installed: &[&str], available: &[&str]) -> Self {
            Self {
                installed: Mutex::new(installed.iter().map(|s| s.to_string()).collect()),
                available: available.iter().map(|s| s.to_string()).collect(),
                locked_attempts: Mutex::new(0),
                install_calls: Mutex::new(Vec::new()),
            }
        }

        fn locked_for(self, attempts: u32) -> Self {
            *self.locked_attempts.lock().unwrap() = attempts;
            self
        }
    }

    impl PackageManager for MockPackageManager {
        fn check_missing(&self, deps: &[String], _runner: &CommandRunner) -> Result<Vec<String>> {
            let installed = self.installed.lock().unwrap();
            Ok(deps
                .iter()
                .filter(|d| !installed.contains(&DependencySpec::parse(d).name))
                .cloned()
                .collect())
        }

        fn install(&self, deps: &[String], _runner: &CommandRunner) -> Result<InstallStatus> {
            self.install_calls.lock().unwrap().push(deps.to_vec());
            let mut locked = self.locked_attempts.lock().unwrap();
            if *locked > 0 {
                *locked -= 1;
                return Ok(InstallStatus::Locked("database is locked".into()));
            }
            let mut installed = self.installed.lock().unwrap();
            for dep in deps {
                let name = DependencySpec::parse(dep).name;
                if self.available.contains(&name) {
                    installed.insert(name);
                }
            }
            Ok(InstallStatus::Installed)
        }
    }

    fn runner() -> CommandRunner {
        CommandRunner::new(Deadline::new(Duration::from_secs(30), CancelFlag::new()))
    }

    fn config() -> DependencySection {
        DependencySection {
            lock_retries: 2,
            lock_retry_delay_ms: 1,
            ..DependencySection::default()
        }
    }

    fn deps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_dependency_spec() {
        let spec = DependencySpec::parse("meson >= 1.2");
        assert_eq!(spec.name, "meson");
        assert_eq!(spec.constraint.as_deref(), Some(">=1.2"));
        assert_eq!(spec.to_compact(), "meson>=1.2");

        let plain = DependencySpec::parse(" ninja ");
        assert_eq!(plain.name, "ninja");
        assert_eq!(plain.constraint, None);
    }

    #[test]
    fn test_all_installed_is_noop() {
        let pm = MockPackageManager::new(&["gcc", "make"], &[]);
        let runner = runner();
        let report = DependencyInstaller::new(&pm, &runner, &config())
            .ensure_installed(&deps(&["gcc", "make >= 4.0"]))
            .unwrap();
        assert_eq!(report.already_installed.len(), 2);
        assert!(report.newly_installed.is_empty());
        assert!(pm.install_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_installs_only_missing() {
        let pm = MockPackageManager::new(&["gcc"], &["meson", "ninja"]);
        let runner = runner();
        let report = DependencyInstaller::new(&pm, &runner, &config())
            .ensure_installed(&deps(&["gcc", "meson", "ninja"]))
            .unwrap();
        assert_eq!(report.already_installed, deps(&["gcc"]));
        assert_eq!(report.newly_installed, deps(&["meson", "ninja"]));
        assert_eq!(
            *pm.install_calls.lock().unwrap(),
            vec![deps(&["meson", "ninja"])]
        );
    }

    #[test]
    fn test_unresolvable_names_listed() {
        let pm = MockPackageManager::new(&[], &["meson"]);
        let runner = runner();
        let err = DependencyInstaller::new(&pm, &runner, &config())
            .ensure_installed(&deps(&["meson", "libdoesnotexist"]))
            .unwrap_err();
        match err {
            Error::DependencyInstall { unresolved, .. } => {
                assert_eq!(unresolved, deps(&["libdoesnotexist"]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lock_retried_then_succeeds() {
        let pm = MockPackageManager::new(&[], &["cmake"]).locked_for(2);
        let runner = runner();
        let report = DependencyInstaller::new(&pm, &runner, &config())
            .ensure_installed(&deps(&["cmake"]))
            .unwrap();
        assert_eq!(report.newly_installed, deps(&["cmake"]));
        assert_eq!(pm.install_calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_lock_retries_bounded() {
        let pm = MockPackageManager::new(&[], &["cmake"]).locked_for(10);
        let runner = runner();
        let err = DependencyInstaller::new(&pm, &runner, &config())
            .ensure_installed(&deps(&["cmake"]))
            .unwrap_err();
        assert!(err.to_string().contains("locked"));
        assert_eq!(pm.install_calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_host_package_manager_commands() {
        let config = DependencySection {
            query_command: deps(&["sh", "-c", "test \"$0\" = present"]),
            install_command: deps(&["sh", "-c", "echo 'error: unable to lock database' >&2; exit 1"]),
            ..DependencySection::default()
        };
        let pm = HostPackageManager::new(&config);
        let runner = runner();

        let missing = pm
            .check_missing(&deps(&["present", "absent"]), &runner)
            .unwrap();
        assert_eq!(missing, deps(&["absent"]));

        let status = pm.install(&deps(&["absent"]), &runner).unwrap();
        assert!(matches!(status, InstallStatus::Locked(_)));
    }

    #[test]
    fn test_host_package_manager_failure() {
        let config = DependencySection {
            install_command: deps(&["sh", "-c", "echo 'target not found: nope' >&2; exit 1"]),
            ..DependencySection::default()
        };
        let pm = HostPackageManager::new(&config);
        let err = pm.install(&deps(&["nope"]), &runner()).unwrap_err();
        assert!(matches!(err, Error::DependencyInstall { .. }));
        assert!(err.to_string().contains("target not found"));
    }
}
