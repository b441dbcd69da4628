use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};

use crate::error::{Error, Result};

pub const ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";
pub const SESSION_DURATION_ATTRIBUTE: &str =
    "https://aws.amazon.com/SAML/Attributes/SessionDuration";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAttribute {
    pub role_arn: String,
    pub principal_arn: String,
    pub account_id: String,
    pub account_alias: Option<String>,
}

impl RoleAttribute {
    /// Parses a `role_arn,principal_arn` attribute value. IdPs disagree on the
    /// order of the pair, so the element naming a `:role/` is taken as the role.
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(',').map(str::trim);
        let (first, second) = match (parts.next(), parts.next(), parts.next()) {
            (Some(first), Some(second), None) if !first.is_empty() && !second.is_empty() => {
                (first, second)
            }
            _ => {
                return Err(Error::MalformedAssertion(format!(
                    "role attribute value '{value}' is not a 'role_arn,principal_arn' pair"
                )))
            }
        };
        let (role_arn, principal_arn) = if second.contains(":role/") && !first.contains(":role/")
        {
            (second, first)
        } else {
            (first, second)
        };
        let account_id = role_arn
            .split(':')
            .nth(4)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                Error::MalformedAssertion(format!("'{role_arn}' is not a valid role ARN"))
            })?;

        Ok(Self {
            role_arn: role_arn.to_string(),
            principal_arn: principal_arn.to_string(),
            account_id: account_id.to_string(),
            account_alias: None,
        })
    }

    pub fn role_name(&self) -> &str {
        self.role_arn
            .rsplit_once('/')
            .map_or(self.role_arn.as_str(), |(_, name)| name)
    }

    /// Alias when known, account id otherwise.
    pub fn account_label(&self) -> &str {
        self.account_alias.as_deref().unwrap_or(&self.account_id)
    }
}

#[derive(Debug, Clone)]
pub struct DecodedAssertion {
    pub raw: String,
    pub roles: Vec<RoleAttribute>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub session_duration: Option<i32>,
}

impl DecodedAssertion {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|nb| nb <= now) && now < self.expires_at
    }
}

pub fn decode(raw: &str) -> Result<DecodedAssertion> {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| Error::MalformedAssertion(format!("invalid base64: {err}")))?;
    let xml = String::from_utf8(bytes)
        .map_err(|err| Error::MalformedAssertion(format!("decoded payload is not UTF-8: {err}")))?;
    let doc = Document::parse(&xml)
        .map_err(|err| Error::MalformedAssertion(format!("invalid XML: {err}")))?;

    if first_element(&doc, "Assertion").is_none() {
        return Err(Error::MalformedAssertion(
            "no Assertion element in SAML response".to_string(),
        ));
    }

    let mut roles: Vec<RoleAttribute> = Vec::new();
    for value in attribute_values(&doc, ROLE_ATTRIBUTE) {
        let role = RoleAttribute::parse(&value)?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    if roles.is_empty() {
        return Err(Error::NoRolesFound);
    }

    let not_before = timestamp(&doc, "Conditions", "NotBefore")?;
    let conditions_expiry = timestamp(&doc, "Conditions", "NotOnOrAfter")?;
    let session_expiry = timestamp(&doc, "AuthnStatement", "SessionNotOnOrAfter")?;
    let expires_at = match (conditions_expiry, session_expiry) {
        (Some(a), Some(b)) => a.min(b),
        (Some(at), None) | (None, Some(at)) => at,
        (None, None) => {
            return Err(Error::MalformedAssertion(
                "neither Conditions@NotOnOrAfter nor AuthnStatement@SessionNotOnOrAfter is present"
                    .to_string(),
            ))
        }
    };

    let session_duration = attribute_values(&doc, SESSION_DURATION_ATTRIBUTE)
        .first()
        .and_then(|v| v.parse::<i32>().ok());

    Ok(DecodedAssertion {
        raw: compact,
        roles,
        not_before,
        expires_at,
        session_duration,
    })
}

fn first_element<'a, 'input>(
    doc: &'a Document<'input>,
    local_name: &str,
) -> Option<Node<'a, 'input>> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == local_name)
}

fn attribute_values(doc: &Document, name: &str) -> Vec<String> {
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Attribute")
        .filter(|n| n.attribute("Name") == Some(name))
        .flat_map(|attribute| {
            attribute
                .children()
                .filter(|c| c.is_element() && c.tag_name().name() == "AttributeValue")
                .filter_map(|c| c.text())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn timestamp(doc: &Document, element: &str, attribute: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = first_element(doc, element).and_then(|n| n.attribute(attribute)) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(value)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|err| {
            Error::MalformedAssertion(format!("{element}@{attribute} '{value}' is invalid: {err}"))
        })
}
