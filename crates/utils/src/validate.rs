//! Allow-list validation for values that end up on a command line or in a
//! file path.
//!
//! Each parameter class has one strict pattern. A value that does not match
//! is rejected before any process is spawned or file touched.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    // plain ids and array tasks such as 12345_7
    static ref JOB_ID: Regex = Regex::new(r"^[0-9]{1,20}(_[0-9]{1,10})?$").unwrap();
    static ref ACCOUNT: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,31}$").unwrap();
    static ref NAME: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").unwrap();
    static ref MODULE: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.+-]{0,63}(/[A-Za-z0-9][A-Za-z0-9_.+-]{0,63})?$")
            .unwrap();
    static ref LAYOUT: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _-]{0,63}$").unwrap();
}

const MAX_ECHOED_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    JobId,
    Account,
    EnvName,
    ModuleName,
    GroupName,
    UserName,
    LayoutName,
}

impl fmt::Display for ArgumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgumentKind::JobId => "job id",
            ArgumentKind::Account => "account",
            ArgumentKind::EnvName => "environment name",
            ArgumentKind::ModuleName => "module name",
            ArgumentKind::GroupName => "group name",
            ArgumentKind::UserName => "user name",
            ArgumentKind::LayoutName => "layout name",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value:?}")]
pub struct ValidationError {
    pub kind: ArgumentKind,
    pub value: String,
}

impl ValidationError {
    fn new(kind: ArgumentKind, value: &str) -> Self {
        let value = value.chars().take(MAX_ECHOED_LEN).collect();
        Self { kind, value }
    }
}

fn check<'a>(kind: ArgumentKind, pattern: &Regex, value: &'a str) -> Result<&'a str, ValidationError> {
    if pattern.is_match(value) {
        Ok(value)
    } else {
        Err(ValidationError::new(kind, value))
    }
}

pub fn job_id(value: &str) -> Result<&str, ValidationError> {
    check(ArgumentKind::JobId, &JOB_ID, value)
}

pub fn account(value: &str) -> Result<&str, ValidationError> {
    check(ArgumentKind::Account, &ACCOUNT, value)
}

pub fn env_name(value: &str) -> Result<&str, ValidationError> {
    check(ArgumentKind::EnvName, &NAME, value)
}

pub fn group_name(value: &str) -> Result<&str, ValidationError> {
    check(ArgumentKind::GroupName, &NAME, value)
}

pub fn user_name(value: &str) -> Result<&str, ValidationError> {
    check(ArgumentKind::UserName, &NAME, value)
}

/// Module names as printed by `module avail`, e.g. `GCCcore/12.2.0`.
pub fn module_name(value: &str) -> Result<&str, ValidationError> {
    check(ArgumentKind::ModuleName, &MODULE, value)
}

/// Layout names become file names, so no separators or dots are allowed.
pub fn layout_name(value: &str) -> Result<&str, ValidationError> {
    check(ArgumentKind::LayoutName, &LAYOUT, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_array_job_ids() {
        assert_eq!(job_id("123456"), Ok("123456"));
        assert_eq!(job_id("123456_12"), Ok("123456_12"));
    }

    #[test]
    fn rejects_injection_attempts() {
        let err = job_id("123; rm -rf /").unwrap_err();
        assert_eq!(err.kind, ArgumentKind::JobId);
        assert_eq!(err.to_string(), r#"invalid job id: "123; rm -rf /""#);

        assert!(account("1234$(reboot)").is_err());
        assert!(env_name("env && ls").is_err());
        assert!(module_name("GCC/12 Python").is_err());
        assert!(group_name("").is_err());
        assert!(user_name("-rf").is_err());
    }

    #[test]
    fn layout_names_cannot_escape_the_directory() {
        assert!(layout_name("My Layout_2").is_ok());
        assert!(layout_name("../secrets").is_err());
        assert!(layout_name("a/b").is_err());
        assert!(layout_name(".hidden").is_err());
        assert!(layout_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn module_names_allow_one_version_segment() {
        assert!(module_name("GCCcore/12.2.0").is_ok());
        assert!(module_name("Python/3.10.8-GCCcore-12.2.0").is_ok());
        assert!(module_name("foss/2022b/extra").is_err());
        assert!(module_name("../Python").is_err());
    }

    #[test]
    fn echoed_values_are_truncated() {
        let long = "a;".repeat(100);
        let err = env_name(&long).unwrap_err();
        assert_eq!(err.value.chars().count(), MAX_ECHOED_LEN);
    }
}
