use aws_config::{AppName, BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_sts::operation::assume_role_with_saml::AssumeRoleWithSAMLError;
use aws_sdk_sts::Client as StsClient;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use chrono::DateTime;
use tracing::{debug, info};

use crate::types::Credentials;

const STS_APP_NAME: &str = "aws-saml-auth";

/// Why STS refused an `AssumeRoleWithSAML` call, classified by what the caller can do about it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StsRejection {
    #[error("requested session duration exceeds the role maximum: {0}")]
    DurationTooLong(String),
    #[error("SAML assertion has expired: {0}")]
    ExpiredAssertion(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub struct FederationRequest<'a> {
    pub assertion: &'a str,
    pub role_arn: &'a str,
    pub principal_arn: &'a str,
    pub duration_seconds: i32,
}

pub trait SamlFederation {
    async fn assume_role_with_saml(
        &self,
        request: &FederationRequest<'_>,
    ) -> Result<Credentials, StsRejection>;
}

/// AWS STS client. `AssumeRoleWithSAML` is authenticated by the assertion itself,
/// so the client is built without any credentials provider.
pub struct StsFederation {
    client: StsClient,
}

impl StsFederation {
    pub fn new(region: impl Into<String>) -> Self {
        let mut builder = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.into()));
        if let Ok(app_name) = AppName::new(STS_APP_NAME) {
            builder = builder.app_name(app_name);
        }
        Self {
            client: StsClient::new(&builder.build()),
        }
    }
}

impl SamlFederation for StsFederation {
    async fn assume_role_with_saml(
        &self,
        request: &FederationRequest<'_>,
    ) -> Result<Credentials, StsRejection> {
        debug!(
            role_arn = request.role_arn,
            principal_arn = request.principal_arn,
            duration = request.duration_seconds,
            "calling AssumeRoleWithSAML"
        );
        let output = self
            .client
            .assume_role_with_saml()
            .role_arn(request.role_arn)
            .principal_arn(request.principal_arn)
            .saml_assertion(request.assertion)
            .duration_seconds(request.duration_seconds)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let sts_creds = output
            .credentials()
            .ok_or_else(|| StsRejection::Other("STS returned no credentials".to_string()))?;
        let expiration = sts_creds.expiration();
        let expiration = DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
            .ok_or_else(|| {
                StsRejection::Other(format!("STS returned an invalid expiration {expiration}"))
            })?;

        info!(role_arn = request.role_arn, %expiration, "obtained STS credentials");
        Ok(Credentials {
            access_key_id: sts_creds.access_key_id().to_string(),
            secret_access_key: sts_creds.secret_access_key().to_string(),
            session_token: sts_creds.session_token().to_string(),
            expiration,
        })
    }
}

fn classify_sdk_error(err: SdkError<AssumeRoleWithSAMLError, Response>) -> StsRejection {
    let context = DisplayErrorContext(&err).to_string();
    let service_error = match err {
        SdkError::ServiceError(service_error) => service_error.into_err(),
        _ => return StsRejection::Other(context),
    };
    let message = service_error
        .message()
        .map(ToString::to_string)
        .unwrap_or_else(|| context.clone());
    classify(
        service_error.code(),
        &message,
        service_error.is_expired_token_exception(),
    )
}

/// Maps an STS error code and message onto a [`StsRejection`].
fn classify(code: Option<&str>, message: &str, expired_token: bool) -> StsRejection {
    let message = message.to_string();
    if expired_token || code == Some("ExpiredTokenException") {
        StsRejection::ExpiredAssertion(message)
    } else if message.contains("DurationSeconds") {
        StsRejection::DurationTooLong(message)
    } else if code == Some("AccessDenied") {
        StsRejection::AccessDenied(message)
    } else {
        StsRejection::Other(match code {
            Some(code) => format!("{code}: {message}"),
            None => message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_duration_rejection() {
        let rejection = classify(
            Some("ValidationError"),
            "The requested DurationSeconds exceeds the MaxSessionDuration set for this role.",
            false,
        );
        assert!(matches!(rejection, StsRejection::DurationTooLong(_)));
    }

    #[test]
    fn test_classify_expired_and_denied() {
        assert!(matches!(
            classify(
                Some("ExpiredTokenException"),
                "Token must be redeemed within 5 minutes",
                false
            ),
            StsRejection::ExpiredAssertion(_)
        ));
        assert!(matches!(
            classify(None, "expired", true),
            StsRejection::ExpiredAssertion(_)
        ));
        assert!(matches!(
            classify(
                Some("AccessDenied"),
                "Not authorized to perform sts:AssumeRoleWithSAML",
                false
            ),
            StsRejection::AccessDenied(_)
        ));
    }

    #[test]
    fn test_classify_other_keeps_code() {
        assert_eq!(
            classify(Some("InvalidIdentityToken"), "bad issuer", false),
            StsRejection::Other("InvalidIdentityToken: bad issuer".to_string())
        );
    }
}
