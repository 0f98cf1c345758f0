//! Email addresses and address lists.

use crate::encoding::{decode_rfc2047, encode_rfc2047};
use crate::error::{Error, Result};
use std::fmt;

/// A single mailbox: optional display name plus address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmailAddress {
    /// Display name, already decoded.
    pub name: Option<String>,
    /// The `local@domain` address.
    pub email: String,
}

impl EmailAddress {
    /// Creates an address without a display name.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Creates an address with a display name. Blank names are dropped.
    #[must_use]
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        let name = name.into();
        let name = name.trim();
        Self {
            name: (!name.is_empty()).then(|| name.to_string()),
            email: email.into(),
        }
    }

    /// Parses one mailbox such as `"Doe, Jane" <jane@example.com>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address part is malformed.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let (name, email) = if let Some(open) = input.rfind('<') {
            let close = input[open..]
                .find('>')
                .ok_or_else(|| Error::InvalidAddress(input.to_string()))?;
            let email = input[open + 1..open + close].trim();
            (unquote(input[..open].trim()), email)
        } else if let Some(open) = input.find('(') {
            // addr-spec followed by a comment holding the name
            let email = input[..open].trim();
            let comment = input[open + 1..].trim_end().trim_end_matches(')');
            (comment.trim().to_string(), email)
        } else {
            (String::new(), input)
        };

        if !is_valid_email(email) {
            return Err(Error::InvalidAddress(input.to_string()));
        }

        Ok(Self::with_name(decode_rfc2047(&name), email))
    }

    /// Lowercased address, used as a lookup key.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.email.to_lowercase()
    }

    /// Domain part of the address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.email
            .rsplit_once('@')
            .map_or(self.email.as_str(), |(_, domain)| domain)
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            None => write!(f, "{}", self.email),
            Some(name) if !name.is_ascii() => {
                write!(f, "{} <{}>", encode_rfc2047(name), self.email)
            }
            Some(name) if name.contains(|c: char| "()<>[]:;@\\,.\"".contains(c)) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\" <{}>", self.email)
            }
            Some(name) => write!(f, "{name} <{}>", self.email),
        }
    }
}

/// An ordered list of mailboxes, as found in To/Cc/Bcc.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddressList(pub Vec<EmailAddress>);

impl AddressList {
    /// Parses a comma or semicolon separated list.
    ///
    /// Empty input yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] for the first malformed entry.
    pub fn parse(input: &str) -> Result<Self> {
        split_list(input)
            .into_iter()
            .map(EmailAddress::parse)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Parses a list, skipping entries that do not parse.
    #[must_use]
    pub fn parse_lenient(input: &str) -> Self {
        Self(
            split_list(input)
                .into_iter()
                .filter_map(|entry| EmailAddress::parse(entry).ok())
                .collect(),
        )
    }

    /// Returns true if the list has no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// First address, if any.
    #[must_use]
    pub fn first(&self) -> Option<&EmailAddress> {
        self.0.first()
    }

    /// Iterates over the addresses.
    pub fn iter(&self) -> std::slice::Iter<'_, EmailAddress> {
        self.0.iter()
    }

    /// Renders the list as a header value.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl<'a> IntoIterator for &'a AddressList {
    type Item = &'a EmailAddress;
    type IntoIter = std::slice::Iter<'a, EmailAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Splits on `,` and `;` outside quotes, angle brackets and comments.
fn split_list(input: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut angle = 0usize;
    let mut paren = 0usize;
    let mut start = 0;

    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => angle += 1,
            '>' if !in_quotes => angle = angle.saturating_sub(1),
            '(' if !in_quotes => paren += 1,
            ')' if !in_quotes => paren = paren.saturating_sub(1),
            ',' | ';' if !in_quotes && angle == 0 && paren == 0 => {
                entries.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&input[start..]);

    entries
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn unquote(name: &str) -> String {
    name.strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .map_or_else(
            || name.to_string(),
            |inner| inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        )
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.is_empty()
        && !local.contains('@')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
        && email
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && !"<>()[],;:\"\\".contains(c))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_plain_and_named() {
        let list = AddressList::parse(
            "alice@example.com, \"Doe, John\" <john@example.com>; Bob <bob@example.org>",
        )
        .unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.0[0], EmailAddress::new("alice@example.com"));
        assert_eq!(list.0[1].name.as_deref(), Some("Doe, John"));
        assert_eq!(list.0[1].email, "john@example.com");
        assert_eq!(list.0[2].name.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(AddressList::parse("").unwrap().is_empty());
        assert!(AddressList::parse("  , ;").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_invalid() {
        let err = AddressList::parse("ok@example.com, not-an-address").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(ref a) if a == "not-an-address"));
        assert!(AddressList::parse("Name <broken").is_err());
        assert!(AddressList::parse("a@.example.com").is_err());
        assert!(AddressList::parse("a b@example.com").is_err());
    }

    #[test]
    fn test_parse_lenient_skips_invalid() {
        let list = AddressList::parse_lenient("junk, eve@example.net");
        assert_eq!(list.len(), 1);
        assert_eq!(list.first().unwrap().email, "eve@example.net");
    }

    #[test]
    fn test_parse_comment_name_and_encoded_name() {
        let addr = EmailAddress::parse("carol@example.com (Carol)").unwrap();
        assert_eq!(addr.name.as_deref(), Some("Carol"));

        let addr = EmailAddress::parse("=?utf-8?B?SMOpbMOobmU=?= <h@example.com>").unwrap();
        assert_eq!(addr.name.as_deref(), Some("Hélène"));
    }

    #[test]
    fn test_display_quotes_and_encodes() {
        assert_eq!(
            EmailAddress::with_name("Doe, John", "j@example.com").to_string(),
            "\"Doe, John\" <j@example.com>"
        );
        assert_eq!(
            EmailAddress::with_name("Zoë", "z@example.com").to_string(),
            "=?utf-8?B?Wm/Dqw==?= <z@example.com>"
        );
        assert_eq!(
            EmailAddress::with_name("  ", "x@example.com").to_string(),
            "x@example.com"
        );
    }

    #[test]
    fn test_domain_and_normalized() {
        let addr = EmailAddress::new("User@Example.COM");
        assert_eq!(addr.domain(), "Example.COM");
        assert_eq!(addr.normalized(), "user@example.com");
    }

    proptest! {
        #[test]
        fn prop_parse_lenient_never_panics(input in "\\PC{0,64}") {
            let _ = AddressList::parse_lenient(&input);
        }
    }
}
