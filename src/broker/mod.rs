//! Turns a SAML login into STS credentials: finds an assertion (supplied, cached or
//! captured from the browser), picks a role and exchanges the assertion with STS.

pub mod aliases;
pub mod sts;

use std::io::Write;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::AssertionStore;
use crate::error::{Error, Result};
use crate::saml::listener::{ListenerConfig, RedirectListener};
use crate::saml::role::{resolve_role, RoleFilter, SelectRole};
use crate::saml::{decode, DecodedAssertion, RoleAttribute};
use crate::types::Credentials;

use aliases::ResolveAccountAliases;
use sts::{FederationRequest, SamlFederation, StsRejection};

pub const MAX_SESSION_DURATION: i32 = 43200;
pub const MIN_SESSION_DURATION: i32 = 900;
const HOUR: i32 = 3600;
const MAX_DURATION_ATTEMPTS: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationPolicy {
    Fixed(i32),
    /// Longest duration STS accepts, probed from the top of the ladder down.
    Auto,
}

#[derive(Debug, Clone)]
pub struct BrokerInput {
    pub login_url: String,
    pub saml_assertion: Option<String>,
    pub role_arn: Option<String>,
    pub last_role_arn: Option<String>,
    pub account: Option<String>,
    pub no_ask_role: bool,
    pub duration: DurationPolicy,
    pub use_saml_cache: bool,
    pub resolve_aliases: bool,
    pub listener: ListenerConfig,
    pub redirect_timeout: Duration,
    pub open_browser: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub struct BrokerOutput {
    pub credentials: Credentials,
    pub role: RoleAttribute,
    pub duration: i32,
}

/// Durations tried under [`DurationPolicy::Auto`], longest first.
pub fn duration_ladder(start: i32) -> Vec<i32> {
    let start = start.clamp(MIN_SESSION_DURATION, MAX_SESSION_DURATION);
    let mut ladder = vec![start];
    let mut hours = (start - 1) / HOUR;
    while hours >= 1 {
        ladder.push(hours * HOUR);
        hours -= 1;
    }
    if start > MIN_SESSION_DURATION {
        ladder.push(MIN_SESSION_DURATION);
    }
    ladder.truncate(MAX_DURATION_ATTEMPTS);
    ladder
}

pub struct CredentialBroker<F, A> {
    federation: F,
    aliases: A,
    store: AssertionStore,
    selector: Option<Box<dyn SelectRole>>,
    prompt_writer: Box<dyn Write>,
}

impl<F, A> CredentialBroker<F, A>
where
    F: SamlFederation,
    A: ResolveAccountAliases,
{
    pub fn new(
        federation: F,
        aliases: A,
        store: AssertionStore,
        selector: Option<Box<dyn SelectRole>>,
    ) -> Self {
        Self {
            federation,
            aliases,
            store,
            selector,
            prompt_writer: Box::new(std::io::stderr()),
        }
    }

    /// Destination of the login URL prompt, stderr by default.
    pub fn with_prompt_writer(mut self, prompt_writer: Box<dyn Write>) -> Self {
        self.prompt_writer = prompt_writer;
        self
    }

    pub async fn obtain(&mut self, input: &BrokerInput) -> Result<BrokerOutput> {
        let mut assertion = self.acquire_assertion(input).await?;

        if input.use_saml_cache {
            if let Err(err) = self.store.cache_assertion(
                &input.login_url,
                &assertion.raw,
                assertion.expires_at,
            ) {
                warn!(error = %err, "failed to cache SAML assertion");
            }
        } else {
            self.store.evict(&input.login_url)?;
        }

        if input.resolve_aliases {
            self.annotate_aliases(&mut assertion).await;
        }

        let filter = RoleFilter {
            role_arn: input.role_arn.as_deref(),
            account: input.account.as_deref(),
            last_role_arn: input.last_role_arn.as_deref(),
            no_ask_role: input.no_ask_role,
        };
        let selector = self
            .selector
            .as_deref_mut()
            .map(|selector| selector as &mut dyn SelectRole);
        let role = resolve_role(&assertion.roles, &filter, selector)?;
        info!(role_arn = %role.role_arn, account = role.account_label(), "resolved role");

        let (credentials, duration) = self.exchange(&assertion, &role, input.duration).await?;
        Ok(BrokerOutput {
            credentials,
            role,
            duration,
        })
    }

    async fn acquire_assertion(&mut self, input: &BrokerInput) -> Result<DecodedAssertion> {
        if let Some(raw) = &input.saml_assertion {
            debug!("using SAML assertion supplied on the command line");
            return decode(raw);
        }
        if input.use_saml_cache {
            if let Some(assertion) = self.cached_assertion(&input.login_url)? {
                crate::elog!(
                    quiet = input.quiet,
                    "Using cached SAML assertion (valid until {})",
                    assertion.expires_at
                );
                return Ok(assertion);
            }
        }

        let listener = RedirectListener::bind(&input.listener).await?;
        debug!(
            addr = ?listener.local_addr().ok(),
            state = ?listener.state(),
            "redirect listener ready"
        );
        let browser_opened = input.open_browser
            && match webbrowser::open(&input.login_url) {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = %err, "failed to open browser");
                    false
                }
            };
        // Without a browser the URL is the only way to finish the login, even when quiet.
        if !input.quiet || !browser_opened {
            let _ = writeln!(
                self.prompt_writer,
                "Log in through your identity provider to continue:\n\n  {}\n",
                input.login_url
            );
            let _ = self.prompt_writer.flush();
        }
        let raw = listener.wait_for_assertion(input.redirect_timeout).await?;
        decode(&raw)
    }

    /// Cached assertion for `login_url` that still decodes and is valid now.
    /// Anything else found under that key is evicted.
    fn cached_assertion(&self, login_url: &str) -> Result<Option<DecodedAssertion>> {
        let now = Utc::now();
        let Some(entry) = self.store.resolve_cache_hit(login_url, now) else {
            return Ok(None);
        };
        match decode(&entry.assertion) {
            Ok(assertion) if assertion.is_valid_at(now) => Ok(Some(assertion)),
            Ok(_) => {
                debug!("cached SAML assertion is outside its validity window");
                self.store.evict(login_url)?;
                Ok(None)
            }
            Err(err) => {
                warn!(error = %err, "evicting undecodable cached SAML assertion");
                self.store.evict(login_url)?;
                Ok(None)
            }
        }
    }

    async fn annotate_aliases(&self, assertion: &mut DecodedAssertion) {
        match self.aliases.resolve_aliases(&assertion.raw).await {
            Ok(aliases) => {
                for role in &mut assertion.roles {
                    role.account_alias = aliases.get(&role.account_id).cloned();
                }
            }
            Err(err) => warn!(error = %err, "account alias lookup failed"),
        }
    }

    async fn exchange(
        &self,
        assertion: &DecodedAssertion,
        role: &RoleAttribute,
        policy: DurationPolicy,
    ) -> Result<(Credentials, i32)> {
        let request = |duration_seconds| FederationRequest {
            assertion: &assertion.raw,
            role_arn: &role.role_arn,
            principal_arn: &role.principal_arn,
            duration_seconds,
        };

        let ladder = match policy {
            DurationPolicy::Fixed(duration) => {
                return self
                    .federation
                    .assume_role_with_saml(&request(duration))
                    .await
                    .map(|credentials| (credentials, duration))
                    .map_err(Error::StsExchangeRejected);
            }
            DurationPolicy::Auto => duration_ladder(
                assertion
                    .session_duration
                    .unwrap_or(MAX_SESSION_DURATION)
                    .min(MAX_SESSION_DURATION),
            ),
        };

        let floor = ladder.last().copied().unwrap_or(MIN_SESSION_DURATION);
        for duration in ladder {
            match self.federation.assume_role_with_saml(&request(duration)).await {
                Ok(credentials) => {
                    info!(duration, "negotiated session duration");
                    return Ok((credentials, duration));
                }
                Err(StsRejection::DurationTooLong(message)) => {
                    debug!(duration, %message, "session duration rejected, trying shorter");
                }
                Err(rejection) => return Err(Error::StsExchangeRejected(rejection)),
            }
        }
        Err(Error::DurationNegotiationFailed { floor })
    }
}
