use std::io::{self, IsTerminal, Write};

use crate::broker::aliases::ResolveAccountAliases;
use crate::broker::sts::SamlFederation;
use crate::broker::{BrokerOutput, CredentialBroker};
use crate::config::{OutputMode, SamlAuthConfig};
use crate::elog;
use crate::error::{Error, Result};
use crate::profile::ProfilePersister;
use crate::saml::role::{ConsoleSelector, SelectRole};
use crate::types::CredentialProcessOutput;

/// Role prompt on the terminal. None when stdin is not a terminal or stdout carries
/// credential_process JSON.
pub fn build_selector(config: &SamlAuthConfig) -> Option<Box<dyn SelectRole>> {
    if config.output == OutputMode::CredentialProcess || !io::stdin().is_terminal() {
        return None;
    }
    Some(Box::new(ConsoleSelector::new(io::stdin().lock(), io::stderr())))
}

pub async fn exec_login<F, A>(
    broker: &mut CredentialBroker<F, A>,
    config: &SamlAuthConfig,
    persister: &ProfilePersister,
    out: &mut dyn Write,
) -> Result<BrokerOutput>
where
    F: SamlFederation,
    A: ResolveAccountAliases,
{
    let output = broker.obtain(&config.broker_input()).await?;

    if config.persist {
        persister.write_config(
            &config.profile,
            &config.to_profile(&output.role.role_arn, output.duration),
        )?;
        if config.output != OutputMode::CredentialProcess {
            persister.write_credentials(&config.profile, &output.credentials)?;
        }
    }

    write_output(config, &output, out).map_err(Error::Output)?;

    elog!(
        quiet = config.quiet,
        "Assumed {} in account {} until {} ({}s session){}",
        output.role.role_name(),
        output.role.account_label(),
        output.credentials.expiration_rfc3339(),
        output.duration,
        if config.persist {
            format!(", stored in profile '{}'", config.profile)
        } else {
            String::new()
        }
    );
    Ok(output)
}

fn write_output(
    config: &SamlAuthConfig,
    output: &BrokerOutput,
    out: &mut dyn Write,
) -> io::Result<()> {
    let credentials = &output.credentials;
    match config.output {
        OutputMode::CredentialProcess => {
            serde_json::to_writer(&mut *out, &CredentialProcessOutput::from(credentials))?;
            writeln!(out)?;
        }
        OutputMode::PrintCreds => {
            writeln!(out, "export AWS_ACCESS_KEY_ID='{}'", credentials.access_key_id)?;
            writeln!(out, "export AWS_SECRET_ACCESS_KEY='{}'", credentials.secret_access_key)?;
            writeln!(out, "export AWS_SESSION_TOKEN='{}'", credentials.session_token)?;
            writeln!(out, "export AWS_SECURITY_TOKEN='{}'", credentials.session_token)?;
            writeln!(out, "export AWS_DEFAULT_REGION='{}'", config.region)?;
            writeln!(
                out,
                "export AWS_SESSION_EXPIRATION='{}'",
                credentials.expiration_rfc3339()
            )?;
        }
        OutputMode::Summary => {}
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::sts::{FederationRequest, StsRejection};
    use crate::cache::AssertionStore;
    use crate::cmd::Cli;
    use crate::saml::fixtures::SamlFixture;
    use crate::types::Credentials;
    use chrono::{TimeZone, Utc};
    use clap::Parser;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;

    struct StaticFederation;

    impl SamlFederation for StaticFederation {
        async fn assume_role_with_saml(
            &self,
            request: &FederationRequest<'_>,
        ) -> std::result::Result<Credentials, StsRejection> {
            assert_eq!(request.duration_seconds, 3600);
            Ok(Credentials {
                access_key_id: "ASIAEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: "token".to_string(),
                expiration: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            })
        }
    }

    struct NoAliases;

    impl ResolveAccountAliases for NoAliases {
        type Error = io::Error;

        async fn resolve_aliases(
            &self,
            _: &str,
        ) -> std::result::Result<HashMap<String, String>, io::Error> {
            Ok(HashMap::new())
        }
    }

    const ROLE_A: &str = "arn:aws:iam::111111111111:role/A";
    const ROLE_B: &str = "arn:aws:iam::222222222222:role/B";

    /// One run against the config and credentials files in `dir`, reading the stored profile
    /// first as `main` does.
    async fn run_in(dir: &Path, roles: &[&str], extra: &[&str]) -> (BrokerOutput, String) {
        let assertion = SamlFixture::new(roles).encoded();
        let mut argv = vec![
            "aws-saml-auth",
            "-p",
            "work",
            "-u",
            "https://idp.example.com/saml",
            "-R",
            "eu-west-1",
            "-d",
            "3600",
            "--no-resolve-aliases",
            "--no-saml-cache",
            "--saml-assertion",
            assertion.as_str(),
        ];
        argv.extend_from_slice(extra);
        let persister = ProfilePersister::new(dir.join("config"), dir.join("credentials"));
        let stored = persister.read_config("work").unwrap();
        let config = SamlAuthConfig::resolve(&Cli::try_parse_from(argv).unwrap(), stored).unwrap();
        let store = AssertionStore::new(dir);
        let mut broker = CredentialBroker::new(StaticFederation, NoAliases, store, None);

        let mut out = Vec::new();
        let output = exec_login(&mut broker, &config, &persister, &mut out).await.unwrap();
        (output, String::from_utf8(out).unwrap())
    }

    async fn run(extra: &[&str]) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let (_, out) = run_in(dir.path(), &["arn:aws:iam::111111111111:role/Admin"], extra).await;
        (dir, out)
    }

    #[tokio::test]
    async fn test_login_persists_config_and_credentials() {
        let (dir, out) = run(&["--quiet"]).await;
        assert_eq!(out, "");

        let config = fs::read_to_string(dir.path().join("config")).unwrap();
        assert!(config.contains("[profile work]\n"));
        assert!(config.contains("asa.role_arn = arn:aws:iam::111111111111:role/Admin\n"));
        assert!(config.contains("asa.duration = 3600\n"));
        let credentials = fs::read_to_string(dir.path().join("credentials")).unwrap();
        assert!(credentials.contains("[work]\naws_access_key_id = ASIAEXAMPLE\n"));
    }

    #[tokio::test]
    async fn test_credential_process_prints_json_without_credentials_file() {
        let (dir, out) = run(&["--credential-process"]).await;
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["Version"], 1);
        assert_eq!(json["AccessKeyId"], "ASIAEXAMPLE");
        assert_eq!(json["Expiration"], "2030-01-01T00:00:00Z");

        assert!(dir.path().join("config").exists());
        assert!(!dir.path().join("credentials").exists());
    }

    #[tokio::test]
    async fn test_print_creds_without_persisting() {
        let (dir, out) = run(&["--print-creds", "--no-persist", "-q"]).await;
        assert!(out.contains("export AWS_ACCESS_KEY_ID='ASIAEXAMPLE'\n"));
        assert!(out.contains("export AWS_DEFAULT_REGION='eu-west-1'\n"));
        assert!(!dir.path().join("config").exists());
        assert!(!dir.path().join("credentials").exists());
    }

    #[tokio::test]
    async fn test_account_filter_wins_over_role_of_previous_run() {
        let dir = tempfile::tempdir().unwrap();

        let roles = [ROLE_A, ROLE_B];

        let (first, _) = run_in(dir.path(), &roles, &["-q", "--account", "111111111111"]).await;
        assert_eq!(first.role.role_arn, ROLE_A);

        let (second, _) = run_in(dir.path(), &roles, &["-q", "--account", "222222222222"]).await;
        assert_eq!(second.role.role_arn, ROLE_B);
        let config = fs::read_to_string(dir.path().join("config")).unwrap();
        assert!(config.contains(&format!("asa.role_arn = {ROLE_B}\n")));

        // Stored account and role carry over to the next run.
        let (third, _) = run_in(dir.path(), &roles, &["-q"]).await;
        assert_eq!(third.role.role_arn, ROLE_B);
    }
}
