use clap::Parser;
use std::net::IpAddr;

use crate::profile::DEFAULT_PROFILE;
use crate::saml::listener::{DEFAULT_BIND_ADDRESS, DEFAULT_CALLBACK_PATH, DEFAULT_PORT};

const ARG_SHORT_LOGIN_URL: char = 'u';
const ARG_SHORT_REGION: char = 'R';
const ARG_SHORT_ROLE_ARN: char = 'r';
const ARG_SHORT_PROFILE: char = 'p';
const ARG_SHORT_DURATION: char = 'd';
const ARG_SHORT_AUTO_DURATION: char = 'a';
const ARG_SHORT_PRINT_CREDS: char = 'P';
const ARG_SHORT_QUIET: char = 'q';

pub const DEFAULT_REDIRECT_TIMEOUT_SECS: u64 = 300;

/// Acquire temporary AWS credentials through a SAML identity provider login
#[derive(Parser, Debug, Clone)]
#[command(about, version)]
pub struct Cli {
    /// Identity provider URL that starts the SAML login for AWS.
    #[arg(short = ARG_SHORT_LOGIN_URL, long, env = "ASA_LOGIN_URL")]
    pub login_url: Option<String>,

    /// AWS region used for STS and stored in the profile.
    #[arg(short = ARG_SHORT_REGION, long, env = "AWS_DEFAULT_REGION")]
    pub region: Option<String>,

    /// Role to assume. Must be one of the roles granted by the assertion.
    #[arg(short = ARG_SHORT_ROLE_ARN, long, env = "ASA_ROLE_ARN")]
    pub role_arn: Option<String>,

    /// AWS profile to read defaults from and write credentials to.
    #[arg(short = ARG_SHORT_PROFILE, long, env = "AWS_PROFILE", default_value = DEFAULT_PROFILE)]
    pub profile: String,

    /// Session duration in seconds (900-43200).
    #[arg(short = ARG_SHORT_DURATION, long, env = "ASA_DURATION")]
    pub duration: Option<i32>,

    /// Use the longest session duration the role allows. Takes precedence over --duration.
    #[arg(short = ARG_SHORT_AUTO_DURATION, long)]
    pub auto_duration: bool,

    /// Only consider roles of this account, given as id or alias.
    #[arg(long)]
    pub account: Option<String>,

    /// Prompt when several roles match, overriding a stored ask_role = false.
    #[arg(long, conflicts_with = "no_ask_role")]
    pub ask_role: bool,

    /// Fail instead of prompting when several roles match.
    #[arg(long)]
    pub no_ask_role: bool,

    /// Port of the local SAML redirect listener.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address the redirect listener binds to.
    #[arg(long, default_value_t = DEFAULT_BIND_ADDRESS)]
    pub bind_address: IpAddr,

    /// Path the identity provider posts the SAML response to.
    #[arg(long, default_value = DEFAULT_CALLBACK_PATH)]
    pub callback_path: String,

    /// Seconds to wait for the SAML redirect.
    #[arg(long, default_value_t = DEFAULT_REDIRECT_TIMEOUT_SECS)]
    pub redirect_timeout: u64,

    /// Do not reuse or store SAML assertions.
    #[arg(long, env = "ASA_NO_SAML_CACHE")]
    pub no_saml_cache: bool,

    /// Do not look up account aliases on the AWS sign-in page.
    #[arg(long, env = "ASA_NO_RESOLVE_ALIASES")]
    pub no_resolve_aliases: bool,

    /// Base64 SAML response to use instead of logging in.
    #[arg(long)]
    pub saml_assertion: Option<String>,

    /// Print the login URL without opening a browser.
    #[arg(long)]
    pub no_browser: bool,

    /// Print the credentials as shell export statements.
    #[arg(short = ARG_SHORT_PRINT_CREDS, long, conflicts_with = "credential_process")]
    pub print_creds: bool,

    /// Print credentials in the AWS credential_process JSON format.
    #[arg(long)]
    pub credential_process: bool,

    /// Do not write the AWS config or credentials files.
    #[arg(long)]
    pub no_persist: bool,

    /// Suppress progress messages on stderr.
    #[arg(short = ARG_SHORT_QUIET, long)]
    pub quiet: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "ASA_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}
