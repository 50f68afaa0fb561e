use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Host facts: a flat string-to-string map gathered outside the engine and
/// queried by template rendering.
///
/// The on-disk format is one `key=value` pair per line. Keys are sorted on
/// write so that write-then-read round-trips byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facts(BTreeMap<String, String>);

impl Facts {
    pub fn new() -> Self {
        Facts(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse one `key=value` line, stripping a trailing newline from the
    /// value. Lines without `=` are ignored; returns whether a fact was set.
    pub fn parse_line(&mut self, line: &str) -> bool {
        let line = line.strip_suffix('\n').unwrap_or(line);
        match line.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                self.set(key, value);
                true
            }
            _ => false,
        }
    }

    /// Read facts from `r`, merging into `self`. Values already present are
    /// overridden by what is read.
    pub fn read_from(&mut self, r: impl BufRead) -> io::Result<()> {
        for line in r.lines() {
            self.parse_line(&line?);
        }
        Ok(())
    }

    /// Write all facts as `key=value` lines, in key order.
    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        for (key, value) in &self.0 {
            writeln!(w, "{}={}", key, value)?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> io::Result<Facts> {
        let file = std::fs::File::open(path)?;
        let mut facts = Facts::new();
        facts.read_from(io::BufReader::new(file))?;
        Ok(facts)
    }
}

impl FromIterator<(String, String)> for Facts {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Facts(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_a_single_fact_line() {
        let mut facts = Facts::new();
        assert!(facts.parse_line("sys.kernel.version=2.6.32-194.distro5-generic\n"));
        assert_eq!(facts.get("sys.kernel.version"), Some("2.6.32-194.distro5-generic"));
    }

    #[test]
    fn skips_lines_without_separator() {
        let mut facts = Facts::new();
        assert!(!facts.parse_line("no separator here"));
        assert!(facts.is_empty());
    }

    #[test]
    fn read_merges_and_overrides() {
        let mut facts = Facts::new();
        facts.set("test.fact1", "OVERRIDE ME");
        facts.set("test.fact2", "OVERRIDE ME");

        let input = "test.fact1=fact1\ntest.fact2=fact2\ntest.multi.level.fact=multilevel fact\n";
        facts.read_from(Cursor::new(input)).unwrap();

        assert_eq!(facts.get("test.fact1"), Some("fact1"));
        assert_eq!(facts.get("test.fact2"), Some("fact2"));
        assert_eq!(facts.get("test.multi.level.fact"), Some("multilevel fact"));
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut facts = Facts::new();
        facts.set("test.os", "Ubuntu");
        facts.set("test.kernel", "2.6");
        facts.set("sys.test", "test-mode");

        let mut buf = Vec::new();
        facts.write_to(&mut buf).unwrap();

        let mut reread = Facts::new();
        reread.read_from(Cursor::new(buf)).unwrap();
        assert_eq!(reread, facts);
    }
}
