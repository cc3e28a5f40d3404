use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use serde::Deserialize;

use crate::dependencies::Dependency;

#[derive(Debug, PartialEq, Deserialize)]
struct SfdiskOutput {
    partitiontable: SfDisk,
}

/// Partition table of a disk or disk image, as reported by `sfdisk -J`.
#[derive(Debug, PartialEq, Deserialize)]
pub struct SfDisk {
    /// Disk label type
    pub label: SfDiskLabel,

    /// Disk device or image path
    pub device: PathBuf,

    /// Disk size unit (always "sectors")
    pub unit: SfDiskUnit,

    /// Sector size
    #[serde(default = "SfDisk::default_sectorsize")]
    pub sectorsize: u64,

    /// List of partitions
    #[serde(default)]
    pub partitions: Vec<SfPartition>,
}

impl SfDisk {
    fn default_sectorsize() -> u64 {
        512
    }
}

#[derive(Debug, PartialEq, Eq, Deserialize, Clone)]
pub struct SfPartition {
    /// Partition node, e.g. `/dev/sda1` or `disk.img2` for images
    pub node: PathBuf,

    /// Partition start offset in sectors
    pub start: u64,

    /// Partition size in sectors
    #[serde(rename = "size")]
    pub size_sectors: u64,

    /// Partition name
    pub name: Option<String>,

    /// Partition size in bytes
    #[serde(skip)]
    pub size: u64,

    /// Partition number in the partition table
    #[serde(skip)]
    pub number: usize,
}

#[derive(Debug, PartialEq, Deserialize)]
pub enum SfDiskLabel {
    #[serde(rename = "gpt")]
    Gpt,

    /// Master Boot Record
    #[serde(rename = "mbr", alias = "dos")]
    Mbr,
}

#[derive(Debug, PartialEq, Deserialize)]
pub enum SfDiskUnit {
    #[serde(rename = "sectors")]
    Sectors,
}

impl SfDisk {
    /// Read the partition table of a block device or disk image.
    pub fn get_info<S>(disk: S) -> Result<Self, Error>
    where
        S: AsRef<Path>,
    {
        let sfdisk_output_json = Dependency::Sfdisk
            .cmd()
            .arg("-J")
            .arg(disk.as_ref())
            .output_and_check()
            .context(format!(
                "Failed to fetch partition table of {}",
                disk.as_ref().display()
            ))?;

        SfDisk::parse_sfdisk_output(&sfdisk_output_json).context(format!(
            "Failed to extract partition table of {}",
            disk.as_ref().display()
        ))
    }

    fn parse_sfdisk_output(output: &str) -> Result<Self, Error> {
        let mut disk = serde_json::from_str::<SfdiskOutput>(output)
            .context("Failed to parse partition table")?
            .partitiontable;

        let sectorsize = disk.sectorsize;
        disk.partitions.iter_mut().try_for_each(|part| {
            part.size = part.size_sectors * sectorsize;
            part.number = part
                .node
                .as_os_str()
                .to_string_lossy()
                .rsplit_once(|c: char| !c.is_ascii_digit())
                .map(|(_, n)| n)
                .context(format!(
                    "Failed to extract partition number from {}",
                    part.node.display()
                ))?
                .parse()
                .context(format!(
                    "Failed to parse partition number from {}",
                    part.node.display()
                ))?;
            Ok::<(), Error>(())
        })?;

        Ok(disk)
    }

    /// Find a partition by its number in the partition table.
    pub fn partition(&self, number: usize) -> Result<&SfPartition, Error> {
        self.partitions
            .iter()
            .find(|part| part.number == number)
            .context(format!(
                "Partition {number} not found in {}",
                self.device.display()
            ))
    }
}
