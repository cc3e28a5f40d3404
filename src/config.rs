use std::{collections::HashSet, path::Path};

use anyhow::{bail, ensure, Context, Error};
use serde::{Deserialize, Serialize};

use grubscript::{NormalizationProfile, ScanRules};

use crate::sources::{ConfigSource, PartitionFilesystem};

/// Command regenerating the boot scripts on the running system.
pub const DEFAULT_REGENERATE_COMMAND: &str = "grub-install && update-grub";

/// One boot script to check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SourceSpec {
    /// Name used in logs and the report.
    pub name: String,

    pub source: ConfigSource,

    /// Scan for uncontrolled root assignments.
    #[serde(default = "default_true")]
    pub scan: bool,

    /// Compare the script before and after regeneration, ignoring the
    /// differences known for this profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare: Option<NormalizationProfile>,
}

fn default_true() -> bool {
    true
}

/// Everything `grubcheck check` needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckPlan {
    /// Shell command regenerating the boot scripts between the two phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regenerate: Option<String>,

    /// Write the live files back as they were before regeneration once the
    /// run is over.
    #[serde(default = "default_true")]
    pub restore: bool,

    #[serde(default)]
    pub scan: ScanRules,

    pub sources: Vec<SourceSpec>,
}

impl CheckPlan {
    /// Load and validate a check plan from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read file: {}", path.as_ref().display()))?;
        let plan: Self = serde_yaml::from_str(&contents).with_context(|| {
            format!(
                "Failed to parse check plan YAML file: {}",
                path.as_ref().display()
            )
        })?;
        plan.validate()
            .with_context(|| format!("Invalid check plan: {}", path.as_ref().display()))?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<(), Error> {
        ensure!(!self.sources.is_empty(), "No sources configured");

        let mut names = HashSet::new();
        for spec in &self.sources {
            if !names.insert(spec.name.as_str()) {
                bail!("Duplicate source name '{}'", spec.name);
            }

            if spec.compare.is_some() && !spec.source.is_live() {
                bail!(
                    "Source '{}' cannot be compared, disk images are not regenerated",
                    spec.name
                );
            }

            if !spec.scan && spec.compare.is_none() {
                bail!("Source '{}' is neither scanned nor compared", spec.name);
            }
        }

        if self.regenerate.is_none() && self.sources.iter().any(|s| s.compare.is_some()) {
            bail!("Comparing sources requires a regenerate command");
        }

        Ok(())
    }

    /// The checks the update agent's GRUB integration must pass: offline
    /// scripts in `image` (if given) and the scripts of the running system,
    /// before and after regenerating them.
    pub fn default_for_image(image: Option<&Path>) -> Self {
        let mut sources = Vec::new();

        if let Some(image) = image {
            sources.push(SourceSpec {
                name: "image-boot".into(),
                source: ConfigSource::ImagePartition {
                    image: image.to_owned(),
                    partition: 1,
                    filesystem: PartitionFilesystem::Vfat,
                    path: "/grub-mender-grubenv/grub.cfg".into(),
                },
                scan: true,
                compare: None,
            });
            sources.push(SourceSpec {
                name: "image-root".into(),
                source: ConfigSource::ImagePartition {
                    image: image.to_owned(),
                    partition: 2,
                    filesystem: PartitionFilesystem::Ext4,
                    path: "/boot/grub-mender-grubenv.cfg".into(),
                },
                scan: true,
                compare: None,
            });
        }

        sources.extend([
            SourceSpec {
                name: "live-main".into(),
                source: ConfigSource::LivePath {
                    path: "/boot/grub/grub.cfg".into(),
                    exclude: vec![],
                },
                scan: true,
                compare: Some(NormalizationProfile::Main),
            },
            SourceSpec {
                name: "live-grubenv".into(),
                source: ConfigSource::LivePath {
                    path: "/boot/grub-mender-grubenv.cfg".into(),
                    exclude: vec![],
                },
                scan: true,
                compare: Some(NormalizationProfile::Main),
            },
            SourceSpec {
                name: "live-efi".into(),
                source: ConfigSource::LivePath {
                    path: "/boot/efi/EFI/*/grub.cfg".into(),
                    exclude: vec!["/EFI/BOOT/".into()],
                },
                scan: false,
                compare: Some(NormalizationProfile::Efi),
            },
        ]);

        Self {
            regenerate: Some(DEFAULT_REGENERATE_COMMAND.into()),
            restore: true,
            scan: ScanRules::default(),
            sources,
        }
    }
}
