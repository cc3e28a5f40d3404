pub mod debugfs;
pub mod dependencies;
pub mod mcopy;
pub mod partition;
pub mod sfdisk;
