use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use log::debug;

use crate::{
    dependencies::{Command, Dependency},
    sfdisk::{SfDisk, SfPartition},
};

/// Copy partition `number` of the disk image at `image` into a new file
/// `partN.fs` inside `dest_dir`. Returns the path of the new file.
pub fn extract(
    image: impl AsRef<Path>,
    number: usize,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf, Error> {
    let image = image.as_ref();
    let disk = SfDisk::get_info(image)?;
    let partition = disk.partition(number)?;
    let dest = dest_dir.as_ref().join(format!("part{number}.fs"));

    debug!(
        "Extracting partition {number} of '{}' ({} bytes) to '{}'",
        image.display(),
        partition.size,
        dest.display()
    );

    dd_command(image, partition, disk.sectorsize, &dest)
        .run_and_check()
        .context(format!(
            "Failed to extract partition {number} of '{}'",
            image.display()
        ))?;

    Ok(dest)
}

fn dd_command(
    image: &Path,
    partition: &SfPartition,
    sectorsize: u64,
    dest: &Path,
) -> Command {
    let mut cmd = Dependency::Dd.cmd();
    cmd.args([
        format!("if={}", image.display()),
        format!("of={}", dest.display()),
        format!("bs={sectorsize}"),
        format!("skip={}", partition.start),
        format!("count={}", partition.size_sectors),
        "status=none".into(),
    ]);
    cmd
}
