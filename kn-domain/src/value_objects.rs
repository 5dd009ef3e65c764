//! Value Objects for the storage core
//!
//! Newtypes that encapsulate validation logic, following the "parse, don't
//! validate" pattern established by the teacher crate's value objects:
//! construction is the only way to obtain one of these, so downstream code
//! never has to re-check the invariant.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::errors::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must be 1-{max} characters after trimming, got {actual}")]
    InvalidNameLength { max: usize, actual: usize },

    #[error("title cannot exceed {max} characters, got {actual}")]
    TitleTooLong { max: usize, actual: usize },

    #[error("stack name cannot exceed {max} characters, got {actual}")]
    StackNameTooLong { max: usize, actual: usize },
}

impl From<ValidationError> for DomainError {
    fn from(err: ValidationError) -> Self {
        DomainError::InvalidInput(err.to_string())
    }
}

pub const MAX_NOTEBOOK_NAME_LENGTH: usize = 100;
pub const MAX_TAG_NAME_LENGTH: usize = 100;
pub const MAX_SAVED_SEARCH_NAME_LENGTH: usize = 100;
pub const MAX_STACK_NAME_LENGTH: usize = 100;
pub const MAX_NOTE_TITLE_LENGTH: usize = 255;

/// Shared validation for the three "entity name" value objects: trimmed,
/// 1..=max characters. Case normalization is deliberately NOT applied here
/// — uniqueness in storage is enforced case-insensitively (§3), but the
/// display name preserves the user's casing.
fn validate_entity_name(value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() || trimmed.chars().count() > max {
        return Err(ValidationError::InvalidNameLength {
            max,
            actual: trimmed.chars().count(),
        });
    }
    Ok(trimmed)
}

macro_rules! entity_name_type {
    ($name:ident, $max:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                Ok(Self(validate_entity_name(&value.into(), $max)?))
            }

            pub fn into_inner(self) -> String {
                self.0
            }

            /// Upper-cased form used as the case-insensitive uniqueness key.
            pub fn upper(&self) -> String {
                self.0.to_uppercase()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ValidationError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::new(s).map_err(serde::de::Error::custom)
            }
        }
    };
}

entity_name_type!(NotebookName, MAX_NOTEBOOK_NAME_LENGTH);
entity_name_type!(TagName, MAX_TAG_NAME_LENGTH);
entity_name_type!(SavedSearchName, MAX_SAVED_SEARCH_NAME_LENGTH);

/// A notebook stack name. Like the entity names, but allowed to be absent
/// at the `Notebook` level (`Option<StackName>`), so empty input is treated
/// by callers as "no stack" rather than rejected here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackName(String);

impl StackName {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let trimmed = value.into().trim().to_string();
        if trimmed.chars().count() > MAX_STACK_NAME_LENGTH {
            return Err(ValidationError::StackNameTooLong {
                max: MAX_STACK_NAME_LENGTH,
                actual: trimmed.chars().count(),
            });
        }
        Ok(Self(trimmed))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for StackName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for StackName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StackName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// A note title. Unlike the other names, empty is valid (becomes `None` on
/// the owning `Note`), matching the teacher's `NoteTitle::from_optional`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NoteTitle(String);

impl NoteTitle {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let trimmed = value.into().trim().to_string();
        if trimmed.chars().count() > MAX_NOTE_TITLE_LENGTH {
            return Err(ValidationError::TitleTooLong {
                max: MAX_NOTE_TITLE_LENGTH,
                actual: trimmed.chars().count(),
            });
        }
        Ok(Self(trimmed))
    }

    pub fn from_optional(value: Option<String>) -> Result<Option<Self>, ValidationError> {
        match value {
            None => Ok(None),
            Some(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Self::new(trimmed).map(Some)
                }
            }
        }
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for NoteTitle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for NoteTitle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NoteTitle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod notebook_name_tests {
        use super::*;

        #[test]
        fn trims_and_accepts_non_empty() {
            let name = NotebookName::new("  Personal  ").unwrap();
            assert_eq!(name.as_ref(), "Personal");
        }

        #[test]
        fn rejects_empty_after_trim() {
            assert!(NotebookName::new("   ").is_err());
        }

        #[test]
        fn rejects_too_long() {
            let too_long = "a".repeat(MAX_NOTEBOOK_NAME_LENGTH + 1);
            assert!(NotebookName::new(too_long).is_err());
        }

        #[test]
        fn upper_is_case_insensitive_key() {
            let a = NotebookName::new("Work").unwrap();
            let b = NotebookName::new("WORK").unwrap();
            assert_eq!(a.upper(), b.upper());
        }
    }

    mod note_title_tests {
        use super::*;

        #[test]
        fn empty_is_valid() {
            assert!(NoteTitle::new("").is_ok());
        }

        #[test]
        fn from_optional_collapses_whitespace_to_none() {
            assert_eq!(NoteTitle::from_optional(Some("   ".into())).unwrap(), None);
        }

        #[test]
        fn from_optional_keeps_trimmed_value() {
            let title = NoteTitle::from_optional(Some("  Hi  ".into()))
                .unwrap()
                .unwrap();
            assert_eq!(title.as_ref(), "Hi");
        }
    }

    mod stack_name_tests {
        use super::*;

        #[test]
        fn empty_stack_name_is_allowed() {
            assert!(StackName::new("").is_ok());
        }
    }
}
