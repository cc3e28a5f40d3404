use std::fmt::{Display, Formatter, Result as FmtResult};

/// One boot configuration file captured at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigScript {
    name: String,
    lines: Vec<String>,
}

impl ConfigScript {
    /// Split `text` into lines. Line terminators (`\n` or `\r\n`) are not
    /// kept.
    pub fn parse(name: impl Into<String>, text: &str) -> Self {
        Self {
            name: name.into(),
            lines: text.lines().map(str::to_owned).collect(),
        }
    }

    pub fn from_lines(name: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            name: name.into(),
            lines,
        }
    }

    /// Where this script came from, used in reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Iterate lines together with their 1-based line numbers.
    pub fn numbered_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines
            .iter()
            .enumerate()
            .map(|(index, line)| (index + 1, line.as_str()))
    }

    /// Render the script back to text, every line newline-terminated.
    pub fn render(&self) -> String {
        self.lines.iter().map(|line| format!("{line}\n")).collect()
    }
}

impl Display for ConfigScript {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let script = ConfigScript::parse("grub.cfg", "set timeout=5\r\ninsmod part_gpt\n\nfoo");
        assert_eq!(script.name(), "grub.cfg");
        assert_eq!(
            script.lines(),
            ["set timeout=5", "insmod part_gpt", "", "foo"]
        );
        assert_eq!(script.render(), "set timeout=5\ninsmod part_gpt\n\nfoo\n");
    }

    #[test]
    fn test_numbered_lines() {
        let script = ConfigScript::parse("grub.cfg", "a\nb\n");
        assert_eq!(
            script.numbered_lines().collect::<Vec<_>>(),
            vec![(1, "a"), (2, "b")]
        );
    }

    #[test]
    fn test_empty() {
        let script = ConfigScript::parse("empty", "");
        assert!(script.lines().is_empty());
        assert_eq!(script.render(), "");
    }
}
