pub mod elog;
pub mod formatters;
pub mod lock;

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

pub const AWS_CONFIG_FILE_ENV: &str = "AWS_CONFIG_FILE";
pub const AWS_SHARED_CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";

pub fn resolve_aws_dir() -> PathBuf {
    let home_dir = home::home_dir().unwrap_or_else(env::temp_dir);
    home_dir.join(".aws")
}

fn resolve_from_env(variable: &str, default_name: &str) -> PathBuf {
    env::var_os(variable)
        .filter(|value| !value.is_empty())
        .map_or_else(|| resolve_aws_dir().join(default_name), PathBuf::from)
}

pub fn resolve_config_file() -> PathBuf {
    resolve_from_env(AWS_CONFIG_FILE_ENV, "config")
}

pub fn resolve_credentials_file() -> PathBuf {
    resolve_from_env(AWS_SHARED_CREDENTIALS_FILE_ENV, "credentials")
}

/// Replaces `path` with `contents` through a temporary file in the same
/// directory, so readers see either the old or the new file, never a partial one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|err| Error::persistence(parent, err))?;

    let write = || -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|err| err.error)?;
        Ok(())
    };
    write().map_err(|err| Error::persistence(path, err))
}

#[cfg(unix)]
pub fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|err| Error::persistence(path, err))
}

#[cfg(not(unix))]
pub fn restrict_permissions(_: &Path) -> Result<()> {
    Ok(())
}

/// Reads `path`, treating a missing file as empty.
pub fn read_or_empty(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(Error::persistence(path, err)),
    }
}
