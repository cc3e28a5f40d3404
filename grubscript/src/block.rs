/// A region of a generated script emitted by one `/etc/grub.d` script,
/// delimited by the begin and end markers grub-mkconfig writes around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    name: String,
    begin: String,
    end: String,
}

impl HeaderBlock {
    /// Block produced by `/etc/grub.d/<name>`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use grubscript::HeaderBlock;
    ///
    /// let block = HeaderBlock::grub_d("00_header");
    ///
    /// assert!(block.is_begin("### BEGIN /etc/grub.d/00_header ###"));
    /// assert!(block.is_end("  ### END /etc/grub.d/00_header ###  "));
    /// ```
    pub fn grub_d(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            begin: format!("### BEGIN /etc/grub.d/{name} ###"),
            end: format!("### END /etc/grub.d/{name} ###"),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marker lines match after trimming surrounding white space.
    pub fn is_begin(&self, line: &str) -> bool {
        line.trim() == self.begin
    }

    pub fn is_end(&self, line: &str) -> bool {
        line.trim() == self.end
    }
}

/// Position of a line-by-line pass relative to a [`HeaderBlock`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockState {
    #[default]
    Normal,

    /// Inside the block, which was opened on `begin_line` (1-based).
    InsideExemptBlock { begin_line: usize },
}

impl BlockState {
    /// Compute the state after `line`. Only marker lines cause a transition;
    /// a second begin marker keeps the original begin line.
    pub fn step(self, block: &HeaderBlock, line_number: usize, line: &str) -> Self {
        match self {
            Self::Normal if block.is_begin(line) => Self::InsideExemptBlock {
                begin_line: line_number,
            },
            Self::InsideExemptBlock { .. } if block.is_end(line) => Self::Normal,
            state => state,
        }
    }

    pub fn is_inside(&self) -> bool {
        matches!(self, Self::InsideExemptBlock { .. })
    }

    /// Line on which the currently open block began, if any.
    pub fn open_since(&self) -> Option<usize> {
        match self {
            Self::Normal => None,
            Self::InsideExemptBlock { begin_line } => Some(*begin_line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers() {
        let block = HeaderBlock::grub_d("30_uefi-firmware");
        assert_eq!(block.name(), "30_uefi-firmware");
        assert!(block.is_begin("### BEGIN /etc/grub.d/30_uefi-firmware ###"));
        assert!(block.is_end("### END /etc/grub.d/30_uefi-firmware ###\t"));
        assert!(!block.is_begin("### BEGIN /etc/grub.d/00_header ###"));
        assert!(!block.is_begin("# ### BEGIN /etc/grub.d/30_uefi-firmware ###"));
    }

    #[test]
    fn test_step() {
        let block = HeaderBlock::grub_d("00_header");

        let state = BlockState::default();
        assert_eq!(state, BlockState::Normal);

        let state = state.step(&block, 1, "set default=0");
        assert_eq!(state, BlockState::Normal);

        let state = state.step(&block, 2, "### BEGIN /etc/grub.d/00_header ###");
        assert_eq!(state, BlockState::InsideExemptBlock { begin_line: 2 });
        assert!(state.is_inside());
        assert_eq!(state.open_since(), Some(2));

        // Nested begin does not reset the begin line
        let state = state.step(&block, 5, "### BEGIN /etc/grub.d/00_header ###");
        assert_eq!(state.open_since(), Some(2));

        let state = state.step(&block, 9, "### END /etc/grub.d/00_header ###");
        assert_eq!(state, BlockState::Normal);

        // A stray end marker is ignored
        let state = state.step(&block, 10, "### END /etc/grub.d/00_header ###");
        assert_eq!(state, BlockState::Normal);
        assert_eq!(state.open_since(), None);
    }
}
