//! Store handle for the engine's catalog workspace.
//!
//! A `Store` is an explicitly constructed handle to one data directory
//! holding `catalog.db` and the broker audit log. It is passed into every
//! engine operation — there is no module-level store singleton. `open`
//! owns the startup lifecycle: create the directory, initialize subsystem
//! tables, apply pending migrations.

use crate::core::{error, migration};
use crate::subsystems;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory.
    pub root: PathBuf,
}

impl Store {
    /// Open (creating if needed) the store at `root` and bring its schema
    /// up to date. This is the only construction path used by the CLI and
    /// tests; collaborators receive the handle by reference.
    pub fn open(root: &Path) -> Result<Self, error::EngineError> {
        fs::create_dir_all(root).map_err(error::EngineError::IoError)?;
        subsystems::initialize_all_dbs(root)?;
        migration::check_and_migrate(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}
