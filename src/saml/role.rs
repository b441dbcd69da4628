use std::io::{BufRead, Write};

use tracing::debug;

use crate::error::{Error, Result};
use crate::saml::RoleAttribute;
use crate::utils::formatters::{text::TextFormatter, TabularFormatter};

#[derive(Debug, Clone, Default)]
pub struct RoleFilter<'a> {
    pub role_arn: Option<&'a str>,
    /// Matches an exact account id or, ignoring case, an exact account alias.
    pub account: Option<&'a str>,
    /// Role used last time for this profile. Picked only when it is still among the
    /// candidates left by the account filter; otherwise selection proceeds as usual.
    pub last_role_arn: Option<&'a str>,
    pub no_ask_role: bool,
}

/// Picks one of several candidate roles. Implementations return an index into `candidates`.
pub trait SelectRole {
    fn select(&mut self, candidates: &[&RoleAttribute]) -> Result<usize>;
}

/// Numbered table on `output`, 1-based answer read line by line from `input`.
pub struct ConsoleSelector<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsoleSelector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> SelectRole for ConsoleSelector<R, W> {
    fn select(&mut self, candidates: &[&RoleAttribute]) -> Result<usize> {
        let rows = candidates
            .iter()
            .enumerate()
            .map(|(i, role)| {
                [
                    (i + 1).to_string(),
                    role.account_label().to_string(),
                    role.account_id.clone(),
                    role.role_name().to_string(),
                ]
            })
            .collect::<Vec<_>>();
        let table = TextFormatter::<String>::new(" | ")
            .format(&["#", "Account", "Account Id", "Role"], rows)
            .unwrap_or_default();
        let _ = writeln!(self.output, "{table}");

        loop {
            let _ = write!(self.output, "Select a role [1-{}]: ", candidates.len());
            let _ = self.output.flush();

            let mut answer = String::new();
            match self.input.read_line(&mut answer) {
                Ok(0) | Err(_) => {
                    return Err(Error::AmbiguousRole {
                        candidates: candidates.len(),
                    })
                }
                Ok(_) => {}
            }
            match answer.trim().parse::<usize>() {
                Ok(choice) if (1..=candidates.len()).contains(&choice) => return Ok(choice - 1),
                _ => {
                    let _ = writeln!(
                        self.output,
                        "'{}' is not a number between 1 and {}",
                        answer.trim(),
                        candidates.len()
                    );
                }
            }
        }
    }
}

fn matches_account(role: &RoleAttribute, account: &str) -> bool {
    role.account_id == account
        || role
            .account_alias
            .as_deref()
            .is_some_and(|alias| alias.eq_ignore_ascii_case(account))
}

pub fn resolve_role(
    roles: &[RoleAttribute],
    filter: &RoleFilter,
    selector: Option<&mut dyn SelectRole>,
) -> Result<RoleAttribute> {
    if let Some(role_arn) = filter.role_arn {
        return roles
            .iter()
            .find(|r| r.role_arn == role_arn)
            .cloned()
            .ok_or_else(|| Error::RoleNotAvailable {
                role_arn: role_arn.to_string(),
                available: roles.iter().map(|r| r.role_arn.clone()).collect(),
            });
    }

    let mut candidates: Vec<&RoleAttribute> = match filter.account {
        Some(account) => {
            let matching: Vec<_> = roles.iter().filter(|r| matches_account(r, account)).collect();
            if matching.is_empty() {
                return Err(Error::NoMatchingAccount {
                    account: account.to_string(),
                });
            }
            matching
        }
        None => roles.iter().collect(),
    };

    match candidates.len() {
        0 => return Err(Error::NoRolesFound),
        1 => return Ok(candidates[0].clone()),
        _ => {}
    }
    if let Some(last) = filter
        .last_role_arn
        .and_then(|arn| candidates.iter().find(|r| r.role_arn == arn))
    {
        debug!(role_arn = %last.role_arn, "reusing last role of profile");
        return Ok((*last).clone());
    }

    let ambiguous = Error::AmbiguousRole {
        candidates: candidates.len(),
    };
    if filter.no_ask_role {
        return Err(ambiguous);
    }
    let Some(selector) = selector else {
        return Err(ambiguous);
    };

    candidates.sort_by(|a, b| {
        a.account_label()
            .cmp(b.account_label())
            .then_with(|| a.role_name().cmp(b.role_name()))
    });
    debug!(candidates = candidates.len(), "prompting for role selection");
    let index = selector.select(&candidates)?;
    candidates
        .get(index)
        .map(|role| (*role).clone())
        .ok_or(ambiguous)
}
