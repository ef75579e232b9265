//! Declarative field table shared by every portal form.
//!
//! Registration, login, status lookup, and password recovery are one form with different field
//! sets; each [`FormKind`] lists its fields and the rules they must satisfy before any remote
//! call is attempted.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Email,
    Password,
}

impl Field {
    pub const fn label(self) -> &'static str {
        match self {
            Field::Name => "full name",
            Field::Email => "email",
            Field::Password => "password",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    Required,
    EmailShape,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    pub rules: &'static [FieldRule],
}

const REGISTRATION: &[FieldSpec] = &[
    FieldSpec {
        field: Field::Name,
        rules: &[FieldRule::Required],
    },
    FieldSpec {
        field: Field::Email,
        rules: &[FieldRule::Required, FieldRule::EmailShape],
    },
    FieldSpec {
        field: Field::Password,
        rules: &[FieldRule::Required],
    },
];

const LOGIN: &[FieldSpec] = &[
    FieldSpec {
        field: Field::Email,
        rules: &[FieldRule::Required, FieldRule::EmailShape],
    },
    FieldSpec {
        field: Field::Password,
        rules: &[FieldRule::Required],
    },
];

const EMAIL_ONLY: &[FieldSpec] = &[FieldSpec {
    field: Field::Email,
    rules: &[FieldRule::Required, FieldRule::EmailShape],
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Registration,
    Login,
    StatusCheck,
    PasswordReset,
}

impl FormKind {
    pub const fn fields(self) -> &'static [FieldSpec] {
        match self {
            FormKind::Registration => REGISTRATION,
            FormKind::Login => LOGIN,
            FormKind::StatusCheck | FormKind::PasswordReset => EMAIL_ONLY,
        }
    }
}

/// Anything that can hand a form its raw field values.
pub trait FieldSource {
    fn value(&self, field: Field) -> Option<&str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Problem {
    Missing,
    MalformedEmail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{} {}", .field.label(), describe(.problem))]
pub struct ValidationError {
    pub field: Field,
    pub problem: Problem,
}

fn describe(problem: &Problem) -> &'static str {
    match problem {
        Problem::Missing => "is required",
        Problem::MalformedEmail => "is not a valid email address",
    }
}

/// Checks every field of `kind` in declaration order and reports the first violation.
pub fn validate(kind: FormKind, source: &impl FieldSource) -> Result<(), ValidationError> {
    for spec in kind.fields() {
        let value = source.value(spec.field).map(str::trim).unwrap_or("");
        for rule in spec.rules {
            let problem = match rule {
                FieldRule::Required if value.is_empty() => Some(Problem::Missing),
                FieldRule::EmailShape if !value.is_empty() && !looks_like_email(value) => {
                    Some(Problem::MalformedEmail)
                }
                _ => None,
            };
            if let Some(problem) = problem {
                return Err(ValidationError {
                    field: spec.field,
                    problem,
                });
            }
        }
    }
    Ok(())
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Emails are the lookup key for accounts, so every workflow compares them in this form.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}
