use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Password policy model
///
/// Optional constraints are not enforced when absent from the JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordPolicy {
    /// Policy name
    pub name: String,
    /// Human readable description
    pub description: Option<String>,
    /// Whether this is the environment's default policy
    #[serde(rename = "default")]
    pub is_default: bool,
    /// Reject passwords containing profile data (name, email, ...)
    pub excludes_profile_data: bool,
    /// Reject passwords similar to the current password
    pub not_similar_to_current: bool,
    /// Reject passwords from the commonly-used list
    pub excludes_commonly_used: bool,
    /// Minimum complexity score
    pub min_complexity: Option<u32>,
    /// Maximum password age in days
    pub max_age_days: Option<u32>,
    /// Maximum number of times a character may repeat consecutively
    pub max_repeated_characters: Option<u32>,
    /// Minimum number of distinct characters
    pub min_unique_characters: Option<u32>,
    /// Minimum and maximum password length
    pub length: Option<Length>,
    /// Character set (all characters that may satisfy the rule) mapped to the
    /// minimum number of times one of them must appear
    pub min_characters: BTreeMap<String, u32>,
}

/// Length bounds of a password policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Length {
    /// Minimum number of characters
    pub min: u32,
    /// Maximum number of characters
    pub max: u32,
}

/// HAL collection of password policies (`_embedded.passwordPolicies`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicies {
    #[serde(rename = "_embedded", default)]
    embedded: Embedded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Embedded {
    password_policies: Vec<PasswordPolicy>,
}

impl PasswordPolicies {
    pub fn new(policies: Vec<PasswordPolicy>) -> Self {
        Self {
            embedded: Embedded {
                password_policies: policies,
            },
        }
    }

    pub fn policies(&self) -> &[PasswordPolicy] {
        &self.embedded.password_policies
    }

    /// The policy flagged as the environment default, if any
    pub fn default_policy(&self) -> Option<&PasswordPolicy> {
        self.policies().iter().find(|p| p.is_default)
    }
}

/// A locally checkable rule a password failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Password must be at least {0} characters long")]
    TooShort(u32),
    #[error("Password must be at most {0} characters long")]
    TooLong(u32),
    #[error("Password must not repeat a character more than {0} times in a row")]
    TooManyRepeated(u32),
    #[error("Password must contain at least {0} unique characters")]
    TooFewUnique(u32),
    #[error("Password must contain at least {min} of the characters {set}")]
    MissingCharacters { set: String, min: u32 },
}

impl PasswordPolicy {
    /// Check the rules that can be evaluated without profile or history data.
    ///
    /// Returns every violated rule; an empty vector means the password passes.
    pub fn violations(&self, password: &str) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();
        let char_count = password.chars().count() as u32;

        if let Some(length) = self.length {
            if char_count < length.min {
                violations.push(PolicyViolation::TooShort(length.min));
            }
            // max = 0 means unbounded
            if length.max > 0 && char_count > length.max {
                violations.push(PolicyViolation::TooLong(length.max));
            }
        }

        if let Some(max) = self.max_repeated_characters {
            if longest_run(password) > max {
                violations.push(PolicyViolation::TooManyRepeated(max));
            }
        }

        if let Some(min) = self.min_unique_characters {
            let mut unique: Vec<char> = password.chars().collect();
            unique.sort_unstable();
            unique.dedup();
            if (unique.len() as u32) < min {
                violations.push(PolicyViolation::TooFewUnique(min));
            }
        }

        for (set, &min) in &self.min_characters {
            let found = password.chars().filter(|c| set.contains(*c)).count() as u32;
            if found < min {
                violations.push(PolicyViolation::MissingCharacters {
                    set: set.clone(),
                    min,
                });
            }
        }

        violations
    }
}

fn longest_run(password: &str) -> u32 {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;

    for c in password.chars() {
        if previous == Some(c) {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }

    longest
}
