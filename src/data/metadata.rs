use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

/// File name of the per-run metadata store.
pub const METADATA_FILE: &str = "Experiment_data.txt";

// ---------------------------------------------------------------------------
// MetadataStore – ordered key=value lines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Entry { key: String, value: String },
    /// Anything without a `=` is kept verbatim.
    Other(String),
}

/// Plain-text `key=value` store, one entry per line. Line order is stable:
/// updates replace a line in place and new keys are appended.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataStore {
    path: PathBuf,
    lines: Vec<Line>,
}

impl MetadataStore {
    /// Read the store of a run directory.
    pub fn load(run_dir: &Path) -> Result<Self> {
        let path = run_dir.join(METADATA_FILE);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading metadata store {}", path.display()))?;
        Ok(Self::parse(path, &text))
    }

    /// Build a store from text, to be persisted at `path`.
    pub fn parse(path: PathBuf, text: &str) -> Self {
        let lines = text
            .lines()
            .map(|line| match line.split_once('=') {
                Some((key, value)) => Line::Entry {
                    key: key.to_string(),
                    value: value.trim().to_string(),
                },
                None => Line::Other(line.to_string()),
            })
            .collect();
        Self { path, lines }
    }

    /// Value of `key`; with duplicate keys the last line wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).and_then(|i| match &self.lines[i] {
            Line::Entry { value, .. } => Some(value.as_str()),
            Line::Other(_) => None,
        })
    }

    /// Parse the value of a required key.
    pub fn get_parsed<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw = self
            .get(key)
            .with_context(|| format!("metadata key '{key}' is missing"))?;
        raw.parse::<T>()
            .with_context(|| format!("metadata key '{key}': cannot parse '{raw}'"))
    }

    /// Replace the value of `key` in place, or append it if absent.
    pub fn upsert(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(key) {
            Some(i) => {
                self.lines[i] = Line::Entry {
                    key: key.to_string(),
                    value,
                }
            }
            None => self.lines.push(Line::Entry {
                key: key.to_string(),
                value,
            }),
        }
    }

    /// Render the store as it will be written.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
                Line::Other(text) => out.push_str(text),
            }
            out.push('\n');
        }
        out
    }

    /// Write the store back to its file.
    pub fn persist(&self) -> Result<()> {
        std::fs::write(&self.path, self.render())
            .with_context(|| format!("writing metadata store {}", self.path.display()))
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.lines
            .iter()
            .rposition(|line| matches!(line, Line::Entry { key: k, .. } if k == key))
    }
}

/// Format a slice the way list-valued keys are stored: `[a, b, c]`.
pub fn format_list(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(text: &str) -> MetadataStore {
        MetadataStore::parse(PathBuf::from(METADATA_FILE), text)
    }

    #[test]
    fn lookup_trims_values() {
        let s = store("PMT_Serial=FA0042 \nChopper_Frequency(Hz)=1920\n");
        assert_eq!(s.get("PMT_Serial"), Some("FA0042"));
        assert_eq!(s.get_parsed::<u32>("Chopper_Frequency(Hz)").unwrap(), 1920);
        assert!(s.get("missing").is_none());
        assert!(s.get_parsed::<u32>("missing").is_err());
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut s = store("a=1\nb=2\nc=3\n");
        s.upsert("b", "20");
        assert_eq!(s.render(), "a=1\nb=20\nc=3\n");
    }

    #[test]
    fn upsert_appends_new_key() {
        let mut s = store("a=1\n# operator note\n");
        s.upsert("z", "9");
        assert_eq!(s.render(), "a=1\n# operator note\nz=9\n");
    }

    #[test]
    fn duplicate_keys_resolve_to_last_line() {
        let mut s = store("k=1\nk=2\n");
        assert_eq!(s.get("k"), Some("2"));
        s.upsert("k", "3");
        assert_eq!(s.render(), "k=1\nk=3\n");
    }

    #[test]
    fn values_may_contain_equals_signs() {
        let s = store("expr=a=b\n");
        assert_eq!(s.get("expr"), Some("a=b"));
    }

    #[test]
    fn persist_and_reload() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), "x=1\n").unwrap();
        let mut s = MetadataStore::load(dir.path()).unwrap();
        s.upsert("Y-Asymmetry", format_list(&[0.1, 0.25]));
        s.persist().unwrap();

        let again = MetadataStore::load(dir.path()).unwrap();
        assert_eq!(again.get("x"), Some("1"));
        assert_eq!(again.get("Y-Asymmetry"), Some("[0.1, 0.25]"));
    }
}
