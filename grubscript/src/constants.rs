/// grub-mkconfig script whose output may assign `root`, because the update
/// agent's own block overrides it later.
pub const EXEMPT_HEADER_BLOCK: &str = "00_header";

/// grub-mkconfig script that is emitted depending on firmware support on the
/// generating host.
pub const FIRMWARE_SETUP_BLOCK: &str = "30_uefi-firmware";

/// Function defined and called by the update agent's GRUB integration. Every
/// generated script must reference it.
pub const REQUIRED_MARKER: &str = "mender_check_and_restore_env";

/// The only form in which the update agent assigns `root` itself.
pub const ALLOWED_ROOT_PATTERN: &str = r#"^\s*root="\$\{mender_grub_storage_device\}"#;

/// Any assignment of the `root` variable, with or without `set`.
pub const ROOT_ASSIGNMENT_PATTERN: &str = r"^\s*(set +)?root=";

/// Root assignment emitted by runtime generation only.
pub const PLACEHOLDER_ROOT_LINE: &str = "set root='hd0,gpt1'";
