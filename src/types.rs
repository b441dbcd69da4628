use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const CREDENTIAL_PROCESS_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl Credentials {
    pub fn expiration_rfc3339(&self) -> String {
        self.expiration.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// https://docs.aws.amazon.com/sdkref/latest/guide/feature-process-credentials.html
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CredentialProcessOutput<'a> {
    pub version: u8,
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: &'a str,
    pub expiration: String,
}

impl<'a> From<&'a Credentials> for CredentialProcessOutput<'a> {
    fn from(value: &'a Credentials) -> Self {
        Self {
            version: CREDENTIAL_PROCESS_VERSION,
            access_key_id: &value.access_key_id,
            secret_access_key: &value.secret_access_key,
            session_token: &value.session_token,
            expiration: value.expiration_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_credential_process_output_field_names() {
        let credentials = Credentials {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
        };
        let output = serde_json::to_value(CredentialProcessOutput::from(&credentials)).unwrap();
        assert_eq!(
            output,
            serde_json::json!({
                "Version": 1,
                "AccessKeyId": "AKIA",
                "SecretAccessKey": "secret",
                "SessionToken": "token",
                "Expiration": "2030-01-02T03:04:05Z",
            })
        );
    }
}
