use std::path::PathBuf;
use std::time::Duration;

use crate::broker::sts::StsRejection;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SAML assertion is malformed: {0}")]
    MalformedAssertion(String),
    #[error("SAML assertion does not contain any https://aws.amazon.com/SAML/Attributes/Role values")]
    NoRolesFound,
    #[error("Role {role_arn} is not available in the SAML assertion (available: {})", .available.join(", "))]
    RoleNotAvailable {
        role_arn: String,
        available: Vec<String>,
    },
    #[error("No role in the SAML assertion matches account filter '{account}'")]
    NoMatchingAccount { account: String },
    #[error("{candidates} roles match and no role can be chosen; pass --role-arn or --account to narrow it down")]
    AmbiguousRole { candidates: usize },
    #[error("No SAML response was received on the redirect listener within {}s", .0.as_secs())]
    RedirectTimeout(Duration),
    #[error("Another redirect listener is already active in this process")]
    ListenerBusy,
    #[error("Redirect listener failed: {0}")]
    ListenerIo(#[source] std::io::Error),
    #[error("STS rejected every session duration down to {floor}s")]
    DurationNegotiationFailed { floor: i32 },
    #[error("STS AssumeRoleWithSAML was rejected: {0}")]
    StsExchangeRejected(StsRejection),
    #[error("Failed to access {}: {source}", .path.display())]
    PersistenceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write output: {0}")]
    Output(#[source] std::io::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::PersistenceIo {
            path: path.into(),
            source,
        }
    }

    /// Failures of this machine (listener, files) rather than of the login itself.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            Error::RedirectTimeout(_)
                | Error::ListenerBusy
                | Error::ListenerIo(_)
                | Error::PersistenceIo { .. }
                | Error::Output(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
