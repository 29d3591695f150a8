use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::contact::ContactFields;

pub const NAME_MAX: usize = 50;
pub const ADDRESS_MAX: usize = 200;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap()
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[\d\s\-()]{10,}$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Name,
    Email,
    Phone,
    Address,
    Photo,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::Photo => "photo",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field validation messages.
pub type FieldErrors = BTreeMap<Field, String>;

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// Check every rule and collect one message per failing field.
pub fn validate_fields(fields: &ContactFields) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if fields.name.trim().is_empty() {
        errors.insert(Field::Name, "Name is required".into());
    } else if fields.name.chars().count() > NAME_MAX {
        errors.insert(Field::Name, "Name must be less than 50 characters".into());
    }

    if !fields.email.is_empty() && !is_valid_email(&fields.email) {
        errors.insert(Field::Email, "Please enter a valid email address".into());
    }

    if !fields.phone.is_empty() && !is_valid_phone(&fields.phone) {
        errors.insert(Field::Phone, "Please enter a valid phone number".into());
    }

    if fields.address.chars().count() > ADDRESS_MAX {
        errors.insert(Field::Address, "Address must be less than 200 characters".into());
    }

    errors
}
