//! Effective settings for one run: command line and environment first, then the
//! stored profile, then built-in defaults.

use std::time::Duration;

use crate::broker::{BrokerInput, DurationPolicy, MAX_SESSION_DURATION, MIN_SESSION_DURATION};
use crate::cmd::Cli;
use crate::error::{Error, Result};
use crate::profile::ProfileConfig;
use crate::saml::listener::ListenerConfig;

pub const DEFAULT_REGION: &str = "us-east-1";
const ROLE_ARN_PREFIXES: [&str; 2] = ["arn:aws:iam::", "arn:aws-us-gov:iam::"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Summary on stderr, credentials in the profile.
    Summary,
    /// `export` lines on stdout in addition to the summary.
    PrintCreds,
    /// credential_process JSON on stdout.
    CredentialProcess,
}

#[derive(Debug, Clone)]
pub struct SamlAuthConfig {
    pub profile: String,
    pub login_url: String,
    pub region: String,
    pub role_arn: Option<String>,
    /// Role stored in the profile by the previous run; a preference, not a requirement.
    pub last_role_arn: Option<String>,
    pub account: Option<String>,
    pub ask_role: bool,
    pub duration: DurationPolicy,
    pub use_saml_cache: bool,
    pub resolve_aliases: bool,
    pub saml_assertion: Option<String>,
    pub listener: ListenerConfig,
    pub redirect_timeout: Duration,
    pub open_browser: bool,
    pub output: OutputMode,
    pub persist: bool,
    pub quiet: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Request paths always start with `/`, so the callback path must too.
fn normalize_callback_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

pub fn validate_role_arn(role_arn: &str) -> Result<()> {
    if ROLE_ARN_PREFIXES.iter().any(|prefix| role_arn.contains(prefix)) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "role ARN '{role_arn}' must contain {}",
            ROLE_ARN_PREFIXES.join(" or ")
        )))
    }
}

pub fn validate_duration(duration: i32) -> Result<()> {
    if (MIN_SESSION_DURATION..=MAX_SESSION_DURATION).contains(&duration) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "duration {duration} must be between {MIN_SESSION_DURATION} and \
             {MAX_SESSION_DURATION} seconds"
        )))
    }
}

impl SamlAuthConfig {
    pub fn resolve(cli: &Cli, mut stored: ProfileConfig) -> Result<Self> {
        let last_role_arn = non_empty(stored.role_arn.take());
        let explicit = ProfileConfig {
            login_url: non_empty(cli.login_url.clone()),
            role_arn: non_empty(cli.role_arn.clone()),
            region: non_empty(cli.region.clone()),
            duration: cli.duration,
            ask_role: if cli.ask_role {
                Some(true)
            } else {
                cli.no_ask_role.then_some(false)
            },
            account: non_empty(cli.account.clone()),
        };
        let merged = explicit.merge(stored);

        let login_url = non_empty(merged.login_url).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "no login URL for profile '{}'; pass --login-url or set ASA_LOGIN_URL",
                cli.profile
            ))
        })?;
        let role_arn = non_empty(merged.role_arn);
        if let Some(role_arn) = &role_arn {
            validate_role_arn(role_arn)?;
        }
        let duration = if cli.auto_duration {
            DurationPolicy::Auto
        } else {
            let duration = merged.duration.unwrap_or(MAX_SESSION_DURATION);
            validate_duration(duration)?;
            DurationPolicy::Fixed(duration)
        };
        let output = if cli.credential_process {
            OutputMode::CredentialProcess
        } else if cli.print_creds {
            OutputMode::PrintCreds
        } else {
            OutputMode::Summary
        };

        Ok(Self {
            profile: cli.profile.clone(),
            login_url,
            region: non_empty(merged.region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            role_arn,
            last_role_arn,
            account: non_empty(merged.account),
            ask_role: merged.ask_role.unwrap_or(true),
            duration,
            use_saml_cache: !cli.no_saml_cache,
            resolve_aliases: !cli.no_resolve_aliases,
            saml_assertion: non_empty(cli.saml_assertion.clone()),
            listener: ListenerConfig {
                address: cli.bind_address,
                port: cli.port,
                path: normalize_callback_path(&cli.callback_path),
            },
            redirect_timeout: Duration::from_secs(cli.redirect_timeout),
            open_browser: !cli.no_browser,
            output,
            persist: !cli.no_persist,
            quiet: cli.quiet || output == OutputMode::CredentialProcess,
        })
    }

    pub fn broker_input(&self) -> BrokerInput {
        BrokerInput {
            login_url: self.login_url.clone(),
            saml_assertion: self.saml_assertion.clone(),
            role_arn: self.role_arn.clone(),
            last_role_arn: self.last_role_arn.clone(),
            account: self.account.clone(),
            no_ask_role: !self.ask_role,
            duration: self.duration,
            use_saml_cache: self.use_saml_cache,
            resolve_aliases: self.resolve_aliases,
            listener: self.listener.clone(),
            redirect_timeout: self.redirect_timeout,
            open_browser: self.open_browser,
            quiet: self.quiet,
        }
    }

    /// What is written back to the profile once `role_arn` was assumed for `duration` seconds.
    pub fn to_profile(&self, role_arn: &str, duration: i32) -> ProfileConfig {
        ProfileConfig {
            login_url: Some(self.login_url.clone()),
            role_arn: Some(role_arn.to_string()),
            region: Some(self.region.clone()),
            duration: Some(duration),
            ask_role: Some(self.ask_role),
            account: self.account.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const LOGIN_URL: &str = "https://idp.example.com/saml";

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["aws-saml-auth", "--profile", "test"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn stored() -> ProfileConfig {
        ProfileConfig {
            login_url: Some(LOGIN_URL.to_string()),
            role_arn: Some("arn:aws:iam::111111111111:role/Stored".to_string()),
            region: Some("eu-west-1".to_string()),
            duration: Some(3600),
            ask_role: Some(true),
            account: None,
        }
    }

    #[test]
    fn test_stored_profile_fills_missing_arguments() {
        let config = SamlAuthConfig::resolve(&cli(&["--region", "us-west-2"]), stored()).unwrap();
        assert_eq!(config.login_url, LOGIN_URL);
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.role_arn, None);
        assert_eq!(
            config.last_role_arn.as_deref(),
            Some("arn:aws:iam::111111111111:role/Stored")
        );
        assert_eq!(config.duration, DurationPolicy::Fixed(3600));
        assert!(config.ask_role);
    }

    #[test]
    fn test_defaults_without_stored_profile() {
        let cli = cli(&["-u", LOGIN_URL, "-R", "us-east-1"]);
        let config = SamlAuthConfig::resolve(&cli, ProfileConfig::default()).unwrap();
        assert_eq!(config.duration, DurationPolicy::Fixed(43200));
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.output, OutputMode::Summary);
        assert!(config.use_saml_cache);
        assert!(config.persist);
    }

    #[test]
    fn test_login_url_is_required() {
        let mut stored = stored();
        stored.login_url = None;
        assert!(matches!(
            SamlAuthConfig::resolve(&cli(&[]), stored),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_duration_bounds() {
        for duration in ["899", "43201"] {
            assert!(matches!(
                SamlAuthConfig::resolve(&cli(&["-d", duration]), stored()),
                Err(Error::InvalidConfig(_))
            ));
        }
        let config = SamlAuthConfig::resolve(&cli(&["-d", "900"]), stored()).unwrap();
        assert_eq!(config.duration, DurationPolicy::Fixed(900));
        let config = SamlAuthConfig::resolve(&cli(&["-d", "99999", "-a"]), stored()).unwrap();
        assert_eq!(config.duration, DurationPolicy::Auto);
    }

    #[test]
    fn test_role_arn_validation() {
        assert!(validate_role_arn("arn:aws:iam::111111111111:role/Admin").is_ok());
        assert!(validate_role_arn("arn:aws-us-gov:iam::111111111111:role/Admin").is_ok());
        assert!(validate_role_arn("Admin").is_err());
        assert!(matches!(
            SamlAuthConfig::resolve(&cli(&["-r", "not-an-arn"]), stored()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_credential_process_is_quiet_and_no_ask_role_overrides_profile() {
        let cli = cli(&["--credential-process", "--no-ask-role"]);
        let config = SamlAuthConfig::resolve(&cli, stored()).unwrap();
        assert_eq!(config.output, OutputMode::CredentialProcess);
        assert!(config.quiet);
        assert!(!config.ask_role);
        assert!(config.broker_input().no_ask_role);
    }

    #[test]
    fn test_ask_role_overrides_stored_no_ask_role() {
        let mut stored = stored();
        stored.ask_role = Some(false);
        let config = SamlAuthConfig::resolve(&cli(&[]), stored.clone()).unwrap();
        assert!(!config.ask_role);

        let config = SamlAuthConfig::resolve(&cli(&["--ask-role"]), stored).unwrap();
        assert!(config.ask_role);
        assert!(!config.broker_input().no_ask_role);
        assert_eq!(config.to_profile("arn:aws:iam::1:role/A", 3600).ask_role, Some(true));
    }

    #[test]
    fn test_callback_path_gets_leading_slash() {
        let config = SamlAuthConfig::resolve(&cli(&["--callback-path", "saml"]), stored()).unwrap();
        assert_eq!(config.listener.path, "/saml");
        let config = SamlAuthConfig::resolve(&cli(&["--callback-path", ""]), stored()).unwrap();
        assert_eq!(config.listener.path, "/");
        let config = SamlAuthConfig::resolve(&cli(&["--callback-path", "/acs"]), stored()).unwrap();
        assert_eq!(config.listener.path, "/acs");
    }

    #[test]
    fn test_empty_account_means_no_filter() {
        let config = SamlAuthConfig::resolve(&cli(&["--account", ""]), stored()).unwrap();
        assert_eq!(config.account, None);
    }
}
