//! Contact channels shared by companies, people and leads.

use serde::{Deserialize, Serialize};

use nimbus_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
}

impl ContactInfo {
    /// Trim every channel, drop blanks and validate/normalize the email.
    pub fn normalized(&self) -> DomainResult<Self> {
        let email = match blank_to_none(&self.email) {
            Some(e) => Some(normalize_email(&e)?),
            None => None,
        };
        Ok(Self {
            email,
            phone: blank_to_none(&self.phone),
            website: blank_to_none(&self.website),
            address: blank_to_none(&self.address),
        })
    }
}

/// Lowercased, trimmed email. Rejects values without a local part and a dotted domain.
pub fn normalize_email(raw: &str) -> DomainResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(DomainError::validation(format!("invalid email '{}'", raw.trim())));
    }
    Ok(email)
}

/// Digits of a phone number, ignoring punctuation and spacing.
pub fn phone_digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

pub(crate) fn blank_to_none(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn email_is_lowercased_and_trimmed() {
        assert_eq!(normalize_email("  Jane@Acme.COM ").unwrap(), "jane@acme.com");
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["jane", "@acme.com", "jane@acme", "jane@.com", "ja ne@acme.com", "a@b@c.com"] {
            assert!(normalize_email(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn phone_digits_strip_formatting() {
        assert_eq!(phone_digits("+1 (555) 010-2030"), "15550102030");
    }

    #[test]
    fn normalized_drops_blank_channels() {
        let info = ContactInfo {
            email: Some("  ".into()),
            phone: Some(" 555 ".into()),
            website: None,
            address: Some(String::new()),
        };
        let n = info.normalized().unwrap();
        assert_eq!(n.email, None);
        assert_eq!(n.phone.as_deref(), Some("555"));
        assert_eq!(n.address, None);
    }

    proptest! {
        #[test]
        fn phone_digits_keeps_only_ascii_digits(raw in ".{0,24}") {
            let digits = phone_digits(&raw);
            prop_assert!(digits.chars().all(|c| c.is_ascii_digit()));
            prop_assert_eq!(digits.len(), raw.chars().filter(char::is_ascii_digit).count());
        }
    }
}
