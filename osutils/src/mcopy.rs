use std::path::Path;

use anyhow::{Context, Error};
use log::debug;

use crate::dependencies::{Command, Dependency};

/// Copy `path` out of the FAT filesystem image `fs_image` into `dest`,
/// overwriting it if it exists.
pub fn copy_out(
    fs_image: impl AsRef<Path>,
    path: &str,
    dest: impl AsRef<Path>,
) -> Result<(), Error> {
    debug!(
        "Copying '{path}' out of FAT image '{}'",
        fs_image.as_ref().display()
    );
    copy_out_command(fs_image.as_ref(), path, dest.as_ref())
        .run_and_check()
        .context(format!(
            "Failed to copy '{path}' out of '{}'",
            fs_image.as_ref().display()
        ))
}

fn copy_out_command(fs_image: &Path, path: &str, dest: &Path) -> Command {
    Dependency::Mcopy
        .cmd()
        .with_arg("-n")
        .with_arg("-i")
        .with_arg(fs_image)
        .with_arg(format!("::{}", path.trim_start_matches('/')))
        .with_arg(dest)
}
