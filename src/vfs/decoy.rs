//! Decoy presets served instead of real container content.

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Named placeholder tree. A session mounted with one is always read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoyProfile {
    /// A single dummy file.
    Minimal,
    /// A small tree that looks like a working project.
    Adaptive,
}

const MINIMAL: &[(&str, &str)] = &[("dummy.txt", "lorem ipsum")];

const ADAPTIVE: &[(&str, &str)] = &[
    ("readme.md", "adaptive-decoy"),
    ("docs/guide.txt", "quick-start"),
    ("img/banner.png", "PLACEHOLDER"),
    ("img/icon.png", "PLACEHOLDER"),
    ("notes/todo.txt", "1. stay awesome"),
    ("logs/decoy.log", "INIT"),
];

impl DecoyProfile {
    pub const ALL: [DecoyProfile; 2] = [DecoyProfile::Minimal, DecoyProfile::Adaptive];

    pub fn name(&self) -> &'static str {
        match self {
            DecoyProfile::Minimal => "minimal",
            DecoyProfile::Adaptive => "adaptive",
        }
    }

    /// Relative path and content of every file in the preset.
    pub fn files(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            DecoyProfile::Minimal => MINIMAL,
            DecoyProfile::Adaptive => ADAPTIVE,
        }
    }

    /// Write the preset tree under `root`.
    pub fn populate(&self, root: &Path) -> Result<()> {
        for (rel, content) in self.files() {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, content)?;
        }
        Ok(())
    }
}

impl FromStr for DecoyProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| Error::UnknownDecoyProfile(s.to_string()))
    }
}

impl fmt::Display for DecoyProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
