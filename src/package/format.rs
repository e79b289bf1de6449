use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::package::sendstream::Sendstream;
use crate::subvol::SubvolumeOnDisk;

/// a way of serializing a subvolume into a portable artifact
pub trait Format: Send + Sync {
    /// the `--format` value selecting this strategy
    fn name(&self) -> &'static str;

    /// one-line summary for help output
    fn description(&self) -> &'static str;

    /// write a complete, self-contained package to `output_path`
    ///
    /// `output_path` must not exist yet. the result may be a single file or
    /// a directory tree.
    fn package_full(&self, svod: &SubvolumeOnDisk, output_path: &Path) -> Result<()>;
}

/// name -> format table, built once at startup
pub struct FormatRegistry {
    formats: BTreeMap<&'static str, Box<dyn Format>>,
}

impl FormatRegistry {
    /// build a table from `formats`, refusing two formats with one name
    pub fn new(formats: Vec<Box<dyn Format>>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for format in formats {
            let name = format.name();
            if table.insert(name, format).is_some() {
                return Err(Error::DuplicateFormat(name));
            }
        }
        Ok(Self { formats: table })
    }

    /// every format this crate ships
    pub fn builtin(config: &Config) -> Result<Self> {
        Self::new(vec![Box::new(Sendstream::new(config.btrfs.clone()))])
    }

    pub fn get(&self, name: &str) -> Result<&dyn Format> {
        self.formats
            .get(name)
            .map(|format| format.as_ref())
            .ok_or_else(|| Error::UnknownFormat {
                name: name.to_string(),
                known: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.formats.keys().copied()
    }

    /// `"name" -- description` for every format
    pub fn describe(&self) -> String {
        self.formats
            .values()
            .map(|f| format!("\"{}\" -- {}", f.name(), f.description()))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
