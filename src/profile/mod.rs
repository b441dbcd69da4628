pub mod ini;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Credentials;
use crate::utils::{
    lock::FileLockGuard, read_or_empty, resolve_config_file, resolve_credentials_file,
    restrict_permissions, write_atomic,
};
use ini::IniDocument;

pub const DEFAULT_PROFILE: &str = "default";

const LOGIN_URL_KEY: &str = "asa.login_url";
const ROLE_ARN_KEY: &str = "asa.role_arn";
const DURATION_KEY: &str = "asa.duration";
const ASK_ROLE_KEY: &str = "asa.ask_role";
const REGION_KEY: &str = "region";
const ACCOUNT_KEY: &str = "account";

/// Settings kept per profile in the AWS config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileConfig {
    pub login_url: Option<String>,
    pub role_arn: Option<String>,
    pub region: Option<String>,
    pub duration: Option<i32>,
    pub ask_role: Option<bool>,
    pub account: Option<String>,
}

impl ProfileConfig {
    /// Values set on `self` win, anything unset falls back to `stored`.
    pub fn merge(self, stored: ProfileConfig) -> ProfileConfig {
        ProfileConfig {
            login_url: self.login_url.or(stored.login_url),
            role_arn: self.role_arn.or(stored.role_arn),
            region: self.region.or(stored.region),
            duration: self.duration.or(stored.duration),
            ask_role: self.ask_role.or(stored.ask_role),
            account: self.account.or(stored.account),
        }
    }
}

/// `[default]` for the default profile, `[profile NAME]` otherwise. The credentials
/// file always uses the bare profile name.
pub fn config_section_name(profile: &str) -> String {
    if profile.eq_ignore_ascii_case(DEFAULT_PROFILE) {
        profile.to_string()
    } else {
        format!("profile {profile}")
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ProfilePersister {
    config_file: PathBuf,
    credentials_file: PathBuf,
}

impl ProfilePersister {
    pub fn new(config_file: impl Into<PathBuf>, credentials_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            credentials_file: credentials_file.into(),
        }
    }

    /// Locations from `AWS_CONFIG_FILE` / `AWS_SHARED_CREDENTIALS_FILE`, `~/.aws` otherwise.
    pub fn from_env() -> Self {
        Self::new(resolve_config_file(), resolve_credentials_file())
    }

    /// Directory holding the credentials file, where SAML assertions are cached.
    pub fn cache_dir(&self) -> PathBuf {
        match self.credentials_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn read_config(&self, profile: &str) -> Result<ProfileConfig> {
        let doc = IniDocument::parse(&read_or_empty(&self.config_file)?);
        let section = config_section_name(profile);
        if !doc.has_section(&section) {
            debug!(profile, "no stored configuration for profile");
            return Ok(ProfileConfig::default());
        }

        let text = |key: &str| {
            doc.get(&section, key)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        };
        let invalid = |key: &str, value: &str| {
            Error::InvalidConfig(format!(
                "{key} = {value} in [{section}] of {}",
                self.config_file.display()
            ))
        };

        let duration = match doc.get(&section, DURATION_KEY).filter(|v| !v.is_empty()) {
            Some(value) => Some(
                value
                    .parse::<i32>()
                    .map_err(|_| invalid(DURATION_KEY, value))?,
            ),
            None => None,
        };
        let ask_role = match doc.get(&section, ASK_ROLE_KEY).filter(|v| !v.is_empty()) {
            Some(value) => Some(parse_bool(value).ok_or_else(|| invalid(ASK_ROLE_KEY, value))?),
            None => None,
        };

        Ok(ProfileConfig {
            login_url: text(LOGIN_URL_KEY),
            role_arn: text(ROLE_ARN_KEY),
            region: text(REGION_KEY),
            duration,
            ask_role,
            account: text(ACCOUNT_KEY),
        })
    }

    /// Writes the set fields of `config` into the profile section; unset fields keep
    /// whatever the file already holds.
    pub fn write_config(&self, profile: &str, config: &ProfileConfig) -> Result<()> {
        let section = config_section_name(profile);
        update_ini(&self.config_file, |doc| {
            let mut set = |key: &str, value: Option<String>| {
                if let Some(value) = value {
                    doc.set(&section, key, &value);
                }
            };
            set(REGION_KEY, config.region.clone());
            set(ASK_ROLE_KEY, config.ask_role.map(|v| v.to_string()));
            set(DURATION_KEY, config.duration.map(|v| v.to_string()));
            set(LOGIN_URL_KEY, config.login_url.clone());
            set(ROLE_ARN_KEY, config.role_arn.clone());
            set(ACCOUNT_KEY, config.account.clone());
        })?;
        debug!(profile, path = %self.config_file.display(), "wrote profile configuration");
        Ok(())
    }

    pub fn write_credentials(&self, profile: &str, credentials: &Credentials) -> Result<()> {
        let expiration = credentials.expiration_rfc3339();
        update_ini(&self.credentials_file, |doc| {
            doc.set(profile, "aws_access_key_id", &credentials.access_key_id);
            doc.set(profile, "aws_secret_access_key", &credentials.secret_access_key);
            doc.set(profile, "aws_session_token", &credentials.session_token);
            doc.set(profile, "aws_security_token", &credentials.session_token);
            doc.set(profile, "aws_session_expiration", &expiration);
        })?;
        restrict_permissions(&self.credentials_file)?;
        debug!(profile, path = %self.credentials_file.display(), "wrote profile credentials");
        Ok(())
    }
}

/// Locked read-modify-write of an INI file.
fn update_ini(path: &Path, apply: impl FnOnce(&mut IniDocument)) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| Error::persistence(parent, err))?;
    }
    let _lock = FileLockGuard::acquire(path).map_err(|err| Error::persistence(path, err))?;

    let mut doc = IniDocument::parse(&read_or_empty(path)?);
    apply(&mut doc);
    write_atomic(path, doc.render().as_bytes())
}
