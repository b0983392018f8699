//! Brazilian phone numbers for delivery contact.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// Wrong number of digits once punctuation is removed.
    #[error("phone must have 10 or 11 digits including area code (got {0})")]
    Length(usize),
    /// The area code (DDD) cannot start with zero.
    #[error("invalid area code")]
    AreaCode,
    /// An 11-digit number must be a mobile number starting with 9.
    #[error("11-digit numbers must be mobile numbers starting with 9")]
    NotMobile,
}

/// A phone number with area code, stored as bare digits.
///
/// Accepts the usual punctuation (`(11) 98765-4321`, `11 3456-7890`) and an
/// optional `+55` country prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Parse a phone number.
    ///
    /// # Errors
    ///
    /// Returns a [`PhoneError`] when the digits do not form a landline
    /// (10 digits) or mobile (11 digits, starting with 9) number.
    pub fn parse(input: &str) -> Result<Self, PhoneError> {
        let mut digits: String = input.chars().filter(char::is_ascii_digit).collect();
        if input.trim_start().starts_with('+') && digits.starts_with("55") && digits.len() > 11 {
            digits.drain(..2);
        }

        match digits.len() {
            10 | 11 => {}
            n => return Err(PhoneError::Length(n)),
        }
        if digits.starts_with('0') {
            return Err(PhoneError::AreaCode);
        }
        if digits.len() == 11 && digits.as_bytes().get(2) != Some(&b'9') {
            return Err(PhoneError::NotMobile);
        }
        Ok(Self(digits))
    }

    /// The bare digits, area code first.
    #[must_use]
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// Whether this is a mobile number.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.0.len() == 11
    }
}

/// Boolean form used by form validation.
#[must_use]
pub fn validate_phone(input: &str) -> bool {
    Phone::parse(input).is_ok()
}

impl fmt::Display for Phone {
    /// Formats as `(11) 98765-4321` or `(11) 3456-7890`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ddd, rest) = self.0.split_at(2);
        let (first, last) = rest.split_at(rest.len() - 4);
        write!(f, "({ddd}) {first}-{last}")
    }
}

impl TryFrom<String> for Phone {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_formats() {
        let phone = Phone::parse("(11) 98765-4321").unwrap();
        assert_eq!(phone.digits(), "11987654321");
        assert!(phone.is_mobile());
        assert_eq!(phone.to_string(), "(11) 98765-4321");
    }

    #[test]
    fn test_landline_formats() {
        let phone = Phone::parse("11 3456 7890").unwrap();
        assert!(!phone.is_mobile());
        assert_eq!(phone.to_string(), "(11) 3456-7890");
    }

    #[test]
    fn test_country_prefix_is_stripped() {
        let phone = Phone::parse("+55 21 99876-5432").unwrap();
        assert_eq!(phone.digits(), "21998765432");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(Phone::parse("123"), Err(PhoneError::Length(3)));
        assert_eq!(Phone::parse("(01) 3456-7890"), Err(PhoneError::AreaCode));
        assert_eq!(Phone::parse("11 88765-4321"), Err(PhoneError::NotMobile));
        assert!(!validate_phone(""));
        assert!(validate_phone("(11) 98765-4321"));
    }
}
