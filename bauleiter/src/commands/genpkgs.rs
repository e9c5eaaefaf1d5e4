//! `genpkgs`: write one reStructuredText page per binary package

use crate::config::Config;
use crate::pages::PageWriter;
use crate::pkgdb::{PackageDb, PkgDbError};
use std::path::{Path, PathBuf};

/// Configuration section of page generation settings
pub const PAGES_SECTION: &str = "pages";

/// Generate pages for every package in the database into `dest_dir`
pub fn execute(
    config: &Config,
    pkgdb: Option<PathBuf>,
    dest_dir: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pkgdb = pkgdb
        .or_else(|| {
            config
                .get(PAGES_SECTION, "pkgdb")
                .map(|value| PathBuf::from(value.as_text()))
        })
        .ok_or(PkgDbError::NotConfigured)?;

    let db = PackageDb::load(&pkgdb)?;
    PageWriter::new(config)?.write_all(&db, dest_dir)?;
    Ok(())
}
