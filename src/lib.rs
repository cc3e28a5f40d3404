use std::path::Path;

use anyhow::{Context, Error};
use log::{error, info};

use grubscript::{ConfigScript, NormalizationProfile, Normalizer, ScanRules, Scanner};

pub mod cli;
pub mod config;
pub mod orchestrate;
pub mod report;
pub mod sources;

pub use config::CheckPlan;
pub use orchestrate::Checker;
pub use report::CheckReport;

/// grubcheck version as provided by cargo.
pub const GRUBCHECK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Whether the checked boot scripts are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    fn from_passed(passed: bool) -> Self {
        if passed {
            Self::Passed
        } else {
            Self::Failed
        }
    }
}

/// Read a boot script from a local file, naming it after the path.
pub fn read_script(path: impl AsRef<Path>) -> Result<ConfigScript, Error> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read file '{}'", path.as_ref().display()))?;
    Ok(ConfigScript::parse(path.as_ref().display().to_string(), &text))
}

/// Scan every file, reporting all files that fail.
pub fn scan_files(files: &[impl AsRef<Path>], rules: &ScanRules) -> Result<Verdict, Error> {
    let scanner = Scanner::new(rules).context("Invalid scan rules")?;

    let mut passed = true;
    for file in files {
        let result = scanner.scan(&read_script(file)?);
        match result.check() {
            Ok(()) => info!("{}: OK", result.script),
            Err(e) => {
                error!("{e}");
                passed = false;
            }
        }
    }

    Ok(Verdict::from_passed(passed))
}

/// Print the unified diff between two normalized files.
pub fn diff_files(
    baseline: impl AsRef<Path>,
    candidate: impl AsRef<Path>,
    profile: NormalizationProfile,
) -> Result<Verdict, Error> {
    let baseline = read_script(baseline)?;
    let candidate = read_script(candidate)?;

    match grubscript::diff(&baseline, &candidate, &Normalizer::for_profile(profile)) {
        Ok(result) if result.is_empty() => {
            info!(
                "'{}' and '{}' are equivalent",
                result.baseline, result.candidate
            );
            Ok(Verdict::Passed)
        }
        Ok(result) => {
            print!("{}", result.unified);
            Ok(Verdict::Failed)
        }
        Err(e) if e.is_validation_failure() => {
            error!("{e}");
            Ok(Verdict::Failed)
        }
        Err(e) => Err(e.into()),
    }
}

/// Print a file after normalization.
pub fn normalize_file(file: impl AsRef<Path>, profile: NormalizationProfile) -> Result<(), Error> {
    let script = read_script(file)?;
    let normalized = Normalizer::for_profile(profile)
        .normalize(&script)
        .with_context(|| format!("Failed to normalize '{}'", script.name()))?;
    print!("{normalized}");
    Ok(())
}

/// Run the check plan at `plan`, optionally writing the report to `report`.
pub fn check(plan: impl AsRef<Path>, report: Option<&Path>) -> Result<Verdict, Error> {
    let plan = CheckPlan::load(plan)?;
    let result = Checker::new(&plan)?.run()?;

    if let Some(path) = report {
        result.write(path)?;
        info!("Check report written to '{}'", path.display());
    }

    let failures = result.failures();
    if failures.is_empty() {
        info!("All {} check(s) passed", result.entries.len());
    } else {
        error!(
            "{} of {} check(s) failed",
            failures.len(),
            result.entries.len()
        );
    }

    Ok(Verdict::from_passed(result.passed()))
}

/// Print the default check plan as YAML.
pub fn print_default_plan(image: Option<&Path>) -> Result<(), Error> {
    let plan = CheckPlan::default_for_image(image);
    print!(
        "{}",
        serde_yaml::to_string(&plan).context("Failed to serialize check plan")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use indoc::{formatdoc, indoc};

    use super::*;

    #[test]
    fn test_scan_files() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("good.cfg");
        let bad = tmp.path().join("bad.cfg");
        fs::write(&good, "mender_check_and_restore_env\n").unwrap();
        fs::write(&bad, "root=/dev/sda1\nmender_check_and_restore_env\n").unwrap();

        let rules = ScanRules::default();
        assert_eq!(scan_files(&[&good], &rules).unwrap(), Verdict::Passed);
        assert_eq!(scan_files(&[&good, &bad], &rules).unwrap(), Verdict::Failed);
        scan_files(&[tmp.path().join("missing.cfg")], &rules).unwrap_err();
    }

    #[test]
    fn test_diff_files() {
        let tmp = tempfile::tempdir().unwrap();
        let offline = tmp.path().join("offline.cfg");
        let runtime = tmp.path().join("runtime.cfg");
        let unterminated = tmp.path().join("unterminated.cfg");
        fs::write(&offline, "search --fs-uuid ABCD\n").unwrap();
        fs::write(
            &runtime,
            indoc! {r#"
                search --hint-bios=hd0 --hint-efi=hd0 --fs-uuid ABCD
                set root='hd0,gpt1'
            "#},
        )
        .unwrap();
        fs::write(
            &unterminated,
            "### BEGIN /etc/grub.d/30_uefi-firmware ###\n",
        )
        .unwrap();

        assert_eq!(
            diff_files(&offline, &runtime, NormalizationProfile::Full).unwrap(),
            Verdict::Passed
        );
        assert_eq!(
            diff_files(&offline, &runtime, NormalizationProfile::Efi).unwrap(),
            Verdict::Failed
        );
        assert_eq!(
            diff_files(&offline, &unterminated, NormalizationProfile::Main).unwrap(),
            Verdict::Failed
        );
    }

    #[test]
    fn test_check() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("grub.cfg");
        let plan_path = tmp.path().join("plan.yaml");
        let report_path = tmp.path().join("report.yaml");
        fs::write(&live, "mender_check_and_restore_env\n").unwrap();
        fs::write(
            &plan_path,
            formatdoc! {r#"
                    regenerate: "true"
                    sources:
                      - name: live-main
                        source:
                          kind: live-path
                          path: {}
                        compare: full
                "#,
                live.display()
            },
        )
        .unwrap();

        assert_eq!(
            check(&plan_path, Some(report_path.as_path())).unwrap(),
            Verdict::Passed
        );
        let report = fs::read_to_string(&report_path).unwrap();
        assert!(report.contains("source: live-main"));

        check(tmp.path().join("missing.yaml"), None).unwrap_err();
    }
}
