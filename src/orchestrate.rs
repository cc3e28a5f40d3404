use std::{fs, path::PathBuf};

use anyhow::{ensure, Context, Error};
use log::{debug, error, info, warn};

use grubscript::{ConfigScript, NormalizationProfile, Normalizer, Scanner};
use osutils::dependencies::Dependency;

use crate::{
    config::{CheckPlan, SourceSpec},
    report::{CheckReport, Phase},
};

/// Run the shell command that regenerates the boot scripts.
pub fn regenerate(command: &str) -> Result<(), Error> {
    info!("Regenerating boot scripts with '{command}'");
    Dependency::Sh
        .cmd()
        .with_arg("-c")
        .with_arg(command)
        .run_and_check()
        .with_context(|| format!("Failed to regenerate boot scripts with '{command}'"))
}

/// Exact contents of a live file before regeneration.
struct Snapshot {
    path: PathBuf,
    contents: Vec<u8>,
}

impl Snapshot {
    fn take(path: PathBuf) -> Result<Self, Error> {
        let contents = fs::read(&path)
            .with_context(|| format!("Failed to back up '{}'", path.display()))?;
        Ok(Self { path, contents })
    }

    fn restore(&self) -> Result<(), Error> {
        debug!("Restoring '{}'", self.path.display());
        fs::write(&self.path, &self.contents)
            .with_context(|| format!("Failed to restore '{}'", self.path.display()))
    }
}

/// Write every snapshot back, even when some of them fail.
fn restore_all(snapshots: &[Snapshot]) -> Result<(), Error> {
    if snapshots.is_empty() {
        return Ok(());
    }

    info!("Restoring {} boot script(s)", snapshots.len());
    let mut failed = 0;
    for snapshot in snapshots {
        if let Err(e) = snapshot.restore() {
            error!("{e:?}");
            failed += 1;
        }
    }
    ensure!(failed == 0, "Failed to restore {failed} boot script(s)");
    Ok(())
}

/// Runs a [`CheckPlan`]: scan and snapshot every source, regenerate the boot
/// scripts, then scan the live sources again and compare them with their
/// snapshots. Live files are put back afterwards unless the plan opts out.
pub struct Checker<'a> {
    plan: &'a CheckPlan,
    scanner: Scanner,
}

struct Baseline<'a> {
    spec: &'a SourceSpec,
    profile: NormalizationProfile,
    script: ConfigScript,
}

impl<'a> Checker<'a> {
    pub fn new(plan: &'a CheckPlan) -> Result<Self, Error> {
        plan.validate().context("Invalid check plan")?;
        let scanner = Scanner::new(&plan.scan).context("Invalid scan rules")?;
        Ok(Self { plan, scanner })
    }

    fn fetch(spec: &SourceSpec, phase: Phase) -> Result<ConfigScript, Error> {
        debug!("[{phase}] Fetching '{}'", spec.name);
        spec.source.fetch(&format!("{} ({phase})", spec.name))
    }

    /// Fetch failures and regeneration failures abort the run; validation
    /// failures are recorded in the returned report.
    pub fn run(&self) -> Result<CheckReport, Error> {
        let mut report = CheckReport::default();
        let mut snapshots = Vec::new();
        let baselines = self.before(&mut report, &mut snapshots)?;

        let after = self.after(&mut report, &baselines);
        match (after, restore_all(&snapshots)) {
            (Err(e), Err(restore_err)) => {
                error!("{restore_err:?}");
                Err(e)
            }
            (after, restored) => after.and(restored).map(|()| report),
        }
    }

    fn before(
        &self,
        report: &mut CheckReport,
        snapshots: &mut Vec<Snapshot>,
    ) -> Result<Vec<Baseline<'a>>, Error> {
        let plan = self.plan;
        let mut baselines = Vec::new();

        info!("Checking {} boot script(s)", plan.sources.len());
        for spec in &plan.sources {
            let script = Self::fetch(spec, Phase::Before)?;
            if plan.restore {
                let live_file = spec
                    .source
                    .live_file()
                    .with_context(|| format!("Failed to locate '{}'", spec.name))?;
                snapshots.extend(live_file.map(Snapshot::take).transpose()?);
            }
            if spec.scan {
                report.push_scan(Phase::Before, &spec.name, self.scanner.scan(&script));
            }
            if let Some(profile) = spec.compare {
                baselines.push(Baseline {
                    spec,
                    profile,
                    script,
                });
            }
        }

        Ok(baselines)
    }

    fn after(&self, report: &mut CheckReport, baselines: &[Baseline]) -> Result<(), Error> {
        match &self.plan.regenerate {
            Some(command) => regenerate(command)?,
            None => {
                warn!("No regenerate command configured, live boot scripts are checked as they are");
            }
        }

        for spec in self.plan.sources.iter().filter(|spec| spec.source.is_live()) {
            let script = Self::fetch(spec, Phase::After)?;
            if spec.scan {
                report.push_scan(Phase::After, &spec.name, self.scanner.scan(&script));
            }
            if let Some(baseline) = baselines
                .iter()
                .find(|baseline| baseline.spec.name == spec.name)
            {
                let normalizer = Normalizer::for_profile(baseline.profile);
                debug!(
                    "Comparing '{}' using rules {:?}",
                    spec.name,
                    normalizer.rule_names()
                );
                report.push_diff(
                    &spec.name,
                    grubscript::diff(&baseline.script, &script, &normalizer),
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use indoc::indoc;

    use grubscript::ScanRules;

    use super::*;
    use crate::{report::CheckOutcome, sources::ConfigSource};

    const OFFLINE_MAIN: &str = indoc! {r#"
        ### BEGIN /etc/grub.d/00_header ###
        set root='hd0,gpt1'
        ### END /etc/grub.d/00_header ###
        ### BEGIN /etc/grub.d/05_mender ###
        function mender_check_and_restore_env {
            true
        }
        mender_check_and_restore_env
        root="${mender_grub_storage_device},gpt${mender_boot_part}"
        ### END /etc/grub.d/05_mender ###
        search --no-floppy --fs-uuid --set=root ABCD
        ### BEGIN /etc/grub.d/30_uefi-firmware ###
        ### END /etc/grub.d/30_uefi-firmware ###
    "#};

    const RUNTIME_MAIN: &str = indoc! {r#"
        ### BEGIN /etc/grub.d/00_header ###
        set root='hd0,gpt1'
        ### END /etc/grub.d/00_header ###
        ### BEGIN /etc/grub.d/05_mender ###
        function mender_check_and_restore_env {
            true
        }
        mender_check_and_restore_env
        root="${mender_grub_storage_device},gpt${mender_boot_part}"
        ### END /etc/grub.d/05_mender ###
        search --no-floppy --fs-uuid --set=root --hint-bios=hd0,gpt1 --hint-efi=hd0,gpt1 ABCD
        ### BEGIN /etc/grub.d/30_uefi-firmware ###
        menuentry 'UEFI Firmware Settings' {
            fwsetup
        }
        ### END /etc/grub.d/30_uefi-firmware ###
    "#};

    /// A plan for a single live file at `live`, regenerated by copying
    /// `regenerated` over it.
    fn plan_for(live: &Path, regenerated: &Path) -> CheckPlan {
        CheckPlan {
            regenerate: Some(format!(
                "cp '{}' '{}'",
                regenerated.display(),
                live.display()
            )),
            restore: true,
            scan: ScanRules::default(),
            sources: vec![SourceSpec {
                name: "live-main".into(),
                source: ConfigSource::LivePath {
                    path: live.display().to_string(),
                    exclude: vec![],
                },
                scan: true,
                compare: Some(NormalizationProfile::Main),
            }],
        }
    }

    #[test]
    fn test_regenerate() {
        regenerate("true").unwrap();
        let err = regenerate("exit 1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to regenerate boot scripts with 'exit 1'"
        );
    }

    #[test]
    fn test_run_passes_with_known_differences() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("grub.cfg");
        let regenerated = tmp.path().join("regenerated.cfg");
        fs::write(&live, OFFLINE_MAIN).unwrap();
        fs::write(&regenerated, RUNTIME_MAIN).unwrap();

        let plan = plan_for(&live, &regenerated);
        let report = Checker::new(&plan).unwrap().run().unwrap();

        assert!(report.passed(), "{:?}", report.failures());
        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.entries[0].phase, Phase::Before);
        assert_eq!(report.entries[1].phase, Phase::After);
        assert!(matches!(
            report.entries[2].outcome,
            CheckOutcome::Diff(ref result) if result.is_empty()
        ));

        // Regeneration happened, then the original was put back
        assert_eq!(fs::read_to_string(&live).unwrap(), OFFLINE_MAIN);
    }

    #[test]
    fn test_run_without_restore() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("grub.cfg");
        let regenerated = tmp.path().join("regenerated.cfg");
        fs::write(&live, OFFLINE_MAIN).unwrap();
        fs::write(&regenerated, RUNTIME_MAIN).unwrap();

        let mut plan = plan_for(&live, &regenerated);
        plan.restore = false;
        let report = Checker::new(&plan).unwrap().run().unwrap();

        assert!(report.passed(), "{:?}", report.failures());
        assert_eq!(fs::read_to_string(&live).unwrap(), RUNTIME_MAIN);
    }

    #[test]
    fn test_run_restores_after_failed_phase() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("grub.cfg");
        fs::write(&live, OFFLINE_MAIN).unwrap();

        // Regeneration removes the live file, so it cannot be fetched again
        let mut plan = plan_for(&live, &live);
        plan.regenerate = Some(format!("rm '{}'", live.display()));
        let err = Checker::new(&plan).unwrap().run().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to fetch boot script 'live-main (after)'"
        );
        assert_eq!(fs::read_to_string(&live).unwrap(), OFFLINE_MAIN);

        // Regeneration writes the file and then fails
        let regenerated = tmp.path().join("regenerated.cfg");
        fs::write(&regenerated, RUNTIME_MAIN).unwrap();
        plan.regenerate = Some(format!(
            "cp '{}' '{}' && exit 1",
            regenerated.display(),
            live.display()
        ));
        let err = Checker::new(&plan).unwrap().run().unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Failed to regenerate boot scripts with 'cp "));
        assert_eq!(fs::read_to_string(&live).unwrap(), OFFLINE_MAIN);
    }

    #[test]
    fn test_run_reports_regenerated_violation() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("grub.cfg");
        let regenerated = tmp.path().join("regenerated.cfg");
        fs::write(&live, OFFLINE_MAIN).unwrap();
        fs::write(
            &regenerated,
            format!("{OFFLINE_MAIN}set root='hd1,gpt2'\n"),
        )
        .unwrap();

        let plan = plan_for(&live, &regenerated);
        let report = Checker::new(&plan).unwrap().run().unwrap();

        assert!(!report.passed());
        let failures = report.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(
            failures[0],
            "Found unexpected occurrence of `root=` in 'live-main (after)'\n14:set root='hd1,gpt2'"
        );
        assert!(failures[1].starts_with(
            "'live-main (before)' and 'live-main (after)' differ after normalization:\n"
        ));
        assert!(failures[1].contains("+set root='hd1,gpt2'"));
    }

    #[test]
    fn test_run_without_regenerate() {
        let plan = CheckPlan {
            regenerate: None,
            restore: true,
            scan: ScanRules::default(),
            sources: vec![SourceSpec {
                name: "remote-main".into(),
                source: ConfigSource::Command {
                    command: "echo mender_check_and_restore_env".into(),
                },
                scan: true,
                compare: None,
            }],
        };
        let report = Checker::new(&plan).unwrap().run().unwrap();
        assert!(report.passed());
        // Live sources are scanned in both phases
        assert_eq!(report.entries.len(), 2);
    }

    #[test]
    fn test_run_aborts_on_fetch_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let live = tmp.path().join("missing.cfg");
        let plan = plan_for(&live, &live);
        let err = Checker::new(&plan).unwrap().run().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to fetch boot script 'live-main (before)'"
        );
    }

    #[test]
    fn test_invalid_plan() {
        let mut plan = CheckPlan::default_for_image(None);
        plan.scan.allowed_pattern = "(".into();
        assert_eq!(
            Checker::new(&plan).err().unwrap().to_string(),
            "Invalid scan rules"
        );
    }
}
