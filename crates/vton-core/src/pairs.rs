//! Pair manifest: the plain-text list of (person, cloth) filenames the
//! driver consumes.
//!
//! One line per sample, two whitespace-separated filenames with real
//! extensions. Each request writes its own manifest at a unique path and
//! passes it explicitly to the driver; nothing in the pipeline shares a
//! manifest between sessions.

use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// One (person image, cloth image) pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairEntry {
    pub person: String,
    pub cloth: String,
}

impl PairEntry {
    pub fn new(person: impl Into<String>, cloth: impl Into<String>) -> Self {
        Self {
            person: person.into(),
            cloth: cloth.into(),
        }
    }

    /// File stem of the person image, which names the output file.
    pub fn person_stem(&self) -> &str {
        stem_of(&self.person)
    }

    pub fn cloth_stem(&self) -> &str {
        stem_of(&self.cloth)
    }
}

fn stem_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Parse a pair manifest. Blank lines are skipped; anything that is not
/// exactly two tokens is an error naming the offending line.
pub fn read_pairs(path: &Path) -> Result<Vec<PairEntry>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let mut pairs = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(person), Some(cloth), None) => {
                pairs.push(PairEntry::new(person, cloth));
            }
            _ => {
                return Err(Error::PairManifest {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    reason: "expected exactly two filenames".into(),
                });
            }
        }
    }

    Ok(pairs)
}

/// Write a pair manifest, creating parent directories as needed.
pub fn write_pairs(path: &Path, pairs: &[PairEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let mut text = String::new();
    for pair in pairs {
        text.push_str(&pair.person);
        text.push(' ');
        text.push_str(&pair.cloth);
        text.push('\n');
    }
    fs::write(path, text).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs").join("session.txt");

        let pairs = vec![
            PairEntry::new("person_a.jpg", "cloth_a.jpg"),
            PairEntry::new("person_b.jpg", "cloth_b.jpg"),
        ];
        write_pairs(&path, &pairs).unwrap();

        let back = read_pairs(&path).unwrap();
        assert_eq!(back, pairs);
    }

    #[test]
    fn skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.txt");
        std::fs::write(&path, "\nperson.jpg cloth.jpg\n\n").unwrap();

        let pairs = read_pairs(&path).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].person_stem(), "person");
    }

    #[test]
    fn rejects_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.txt");
        std::fs::write(&path, "person.jpg\n").unwrap();

        let err = read_pairs(&path).unwrap_err();
        assert!(matches!(err, Error::PairManifest { line: 1, .. }));
    }

    #[test]
    fn stem_strips_only_last_extension() {
        let entry = PairEntry::new("person_00.keep.jpg", "cloth");
        assert_eq!(entry.person_stem(), "person_00.keep");
        assert_eq!(entry.cloth_stem(), "cloth");
    }
}
