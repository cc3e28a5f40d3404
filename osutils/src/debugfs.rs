use std::path::Path;

use anyhow::{bail, Context, Error};
use log::debug;

use crate::dependencies::{Command, Dependency};

/// Dump `path` out of the ext2/3/4 filesystem image `fs_image` into `dest`,
/// preserving its permissions.
pub fn dump(fs_image: impl AsRef<Path>, path: &str, dest: impl AsRef<Path>) -> Result<(), Error> {
    let fs_image = fs_image.as_ref();
    let dest = dest.as_ref();
    debug!("Dumping '{path}' out of ext image '{}'", fs_image.display());

    dump_command(fs_image, path, dest)
        .run_and_check()
        .context(format!(
            "Failed to dump '{path}' out of '{}'",
            fs_image.display()
        ))?;

    // debugfs reports request failures on stderr but still exits with 0
    if !dest.exists() {
        bail!(
            "debugfs did not produce '{}' from '{path}' in '{}'",
            dest.display(),
            fs_image.display()
        );
    }

    Ok(())
}

fn dump_command(fs_image: &Path, path: &str, dest: &Path) -> Command {
    Dependency::Debugfs
        .cmd()
        .with_arg("-R")
        .with_arg(format!("dump -p {path} {}", dest.display()))
        .with_arg(fs_image)
}
