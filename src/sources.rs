use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Error};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use grubscript::ConfigScript;
use osutils::{debugfs, dependencies::Dependency, mcopy, partition};

/// Filesystem of a disk image partition, which decides the tool used to read
/// files from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionFilesystem {
    #[serde(alias = "fat", alias = "fat32")]
    Vfat,

    #[serde(alias = "ext2", alias = "ext3")]
    Ext4,
}

/// Where the text of a boot script comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum ConfigSource {
    /// A file inside a partition of a disk image, as generated offline.
    ImagePartition {
        image: PathBuf,
        partition: usize,
        filesystem: PartitionFilesystem,
        path: String,
    },

    /// A file on the running system. `path` is a glob pattern that must match
    /// exactly one file once paths containing any of `exclude` are removed.
    LivePath {
        path: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude: Vec<String>,
    },

    /// Standard output of a shell command, e.g. `ssh device cat /boot/grub/grub.cfg`.
    Command { command: String },
}

impl ConfigSource {
    /// Whether the source reflects the running system, and so changes when
    /// the boot scripts are regenerated.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::ImagePartition { .. })
    }

    /// Fetch the current text of the source as a script called `name`.
    pub fn fetch(&self, name: &str) -> Result<ConfigScript, Error> {
        let text = match self {
            Self::ImagePartition {
                image,
                partition,
                filesystem,
                path,
            } => read_from_image(image, *partition, *filesystem, path),
            Self::LivePath { path, exclude } => read_live_path(path, exclude),
            Self::Command { command } => run_command(command),
        }
        .with_context(|| format!("Failed to fetch boot script '{name}'"))?;

        trace!("Fetched '{name}':\n{text}");
        Ok(ConfigScript::parse(name, &text))
    }

    /// The file on the running system this source reads, if it reads one.
    pub fn live_file(&self) -> Result<Option<PathBuf>, Error> {
        match self {
            Self::LivePath { path, exclude } => resolve_live_path(path, exclude).map(Some),
            Self::ImagePartition { .. } | Self::Command { .. } => Ok(None),
        }
    }
}

fn read_from_image(
    image: &Path,
    number: usize,
    filesystem: PartitionFilesystem,
    path: &str,
) -> Result<String, Error> {
    let workdir = tempfile::tempdir().context("Failed to create temporary directory")?;
    let fs_image = partition::extract(image, number, workdir.path())?;
    let dest = workdir.path().join("boot-script.cfg");

    match filesystem {
        PartitionFilesystem::Vfat => mcopy::copy_out(&fs_image, path, &dest)?,
        PartitionFilesystem::Ext4 => debugfs::dump(&fs_image, path, &dest)?,
    }

    fs::read_to_string(&dest).with_context(|| {
        format!(
            "Failed to read '{path}' extracted from partition {number} of '{}'",
            image.display()
        )
    })
}

fn read_live_path(pattern: &str, exclude: &[String]) -> Result<String, Error> {
    let path = resolve_live_path(pattern, exclude)?;
    debug!("Reading '{}'", path.display());
    fs::read_to_string(&path).with_context(|| format!("Failed to read file '{}'", path.display()))
}

fn resolve_live_path(pattern: &str, exclude: &[String]) -> Result<PathBuf, Error> {
    let matches = glob::glob(pattern)
        .with_context(|| format!("Invalid path pattern '{pattern}'"))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to expand path pattern '{pattern}'"))?
        .into_iter()
        .filter(|path| {
            let path = path.to_string_lossy();
            !exclude.iter().any(|excluded| path.contains(excluded.as_str()))
        })
        .collect::<Vec<_>>();

    match matches.as_slice() {
        [path] => Ok(path.clone()),
        [] => bail!("No file matches '{pattern}'"),
        paths => bail!(
            "Expected exactly one file matching '{pattern}', found: {}",
            paths
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn run_command(command: &str) -> Result<String, Error> {
    Dependency::Sh
        .cmd()
        .with_arg("-c")
        .with_arg(command)
        .output_and_check()
        .with_context(|| format!("Failed to run '{command}'"))
}
