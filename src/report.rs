use std::path::Path;

use anyhow::{Context, Error};
use log::{error, info};
use serde::Serialize;
use strum_macros::IntoStaticStr;

use grubscript::{CheckError, DiffResult, ScanResult};

/// When during a check run a script was fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    /// Before the boot scripts were regenerated.
    Before,

    /// After the boot scripts were regenerated.
    After,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.into())
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "check", rename_all = "kebab-case")]
pub enum CheckOutcome {
    Scan(ScanResult),
    Diff(DiffResult),

    /// The scripts could not be compared at all.
    Malformed { message: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub phase: Phase,
    pub source: String,
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

impl ReportEntry {
    /// The failure recorded by this entry, if any.
    pub fn failure(&self) -> Option<String> {
        match &self.outcome {
            CheckOutcome::Scan(result) => result.check().err().map(|e| e.to_string()),
            CheckOutcome::Diff(result) => result.check().err().map(|e| e.to_string()),
            CheckOutcome::Malformed { message } => Some(message.clone()),
        }
    }
}

/// Results of all checks of one run, in the order they ran.
#[derive(Debug, Default, Serialize)]
pub struct CheckReport {
    pub entries: Vec<ReportEntry>,
}

impl CheckReport {
    pub fn push_scan(&mut self, phase: Phase, source: &str, result: ScanResult) {
        if result.passed() {
            info!("[{phase}] {source}: no unexpected root assignments");
        } else {
            error!("[{phase}] {source}: scan failed: {:?}", result.outcome);
        }
        self.push(phase, source, CheckOutcome::Scan(result));
    }

    pub fn push_diff(&mut self, source: &str, result: Result<DiffResult, CheckError>) {
        let outcome = match result {
            Ok(result) if result.is_empty() => {
                info!("[{}] {source}: identical to the original", Phase::After);
                CheckOutcome::Diff(result)
            }
            Ok(result) => {
                error!(
                    "[{}] {source}: differs from the original:\n{}",
                    Phase::After,
                    result.unified
                );
                CheckOutcome::Diff(result)
            }
            Err(e) => {
                error!("[{}] {source}: could not compare: {e}", Phase::After);
                CheckOutcome::Malformed {
                    message: e.to_string(),
                }
            }
        };
        self.push(Phase::After, source, outcome);
    }

    fn push(&mut self, phase: Phase, source: &str, outcome: CheckOutcome) {
        self.entries.push(ReportEntry {
            phase,
            source: source.into(),
            outcome,
        });
    }

    pub fn passed(&self) -> bool {
        self.entries.iter().all(|entry| entry.failure().is_none())
    }

    pub fn failures(&self) -> Vec<String> {
        self.entries.iter().filter_map(ReportEntry::failure).collect()
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).context("Failed to serialize check report")
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        std::fs::write(path.as_ref(), self.to_yaml()?).with_context(|| {
            format!(
                "Failed to write check report to '{}'",
                path.as_ref().display()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use grubscript::{ConfigScript, NormalizationProfile, Normalizer, ScanRules, Scanner};

    use super::*;

    fn scan(text: &str) -> ScanResult {
        Scanner::new(&ScanRules::default())
            .unwrap()
            .scan(&ConfigScript::parse("grub.cfg", text))
    }

    #[test]
    fn test_report() {
        let mut report = CheckReport::default();
        assert!(report.passed());

        report.push_scan(Phase::Before, "live-main", scan("mender_check_and_restore_env\n"));
        assert!(report.passed());

        report.push_scan(Phase::After, "live-main", scan("root=/dev/sda1\n"));
        assert!(!report.passed());

        let normalizer = Normalizer::for_profile(NormalizationProfile::Main);
        report.push_diff(
            "live-main",
            grubscript::diff(
                &ConfigScript::parse("a", "x\n"),
                &ConfigScript::parse("b", "### BEGIN /etc/grub.d/30_uefi-firmware ###\n"),
                &normalizer,
            ),
        );

        assert_eq!(
            report.failures(),
            vec![
                "Found unexpected occurrence of `root=` in 'grub.cfg'\n1:root=/dev/sda1".to_string(),
                "Block '30_uefi-firmware' opened on line 1 of 'b' is never closed".to_string(),
            ]
        );

        let yaml = report.to_yaml().unwrap();
        assert!(yaml.contains("phase: before"));
        assert!(yaml.contains("check: scan"));
        assert!(yaml.contains("result: violation"));
        assert!(yaml.contains("check: malformed"));
    }

    #[test]
    fn test_write() {
        let mut report = CheckReport::default();
        report.push_diff(
            "live-efi",
            grubscript::diff(
                &ConfigScript::parse("a", "x\n"),
                &ConfigScript::parse("b", "x\n"),
                &Normalizer::for_profile(NormalizationProfile::Efi),
            ),
        );
        assert!(report.passed());

        let tmp = tempfile::NamedTempFile::new().unwrap();
        report.write(tmp.path()).unwrap();
        let written = std::fs::read_to_string(tmp.path()).unwrap();
        assert!(written.contains("source: live-efi"));
        assert!(written.contains("check: diff"));
    }
}
