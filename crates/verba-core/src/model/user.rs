use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, VerbaError};

pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MIN_PASSWORD_LENGTH: usize = 8;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9@.+\-_]+$").expect("valid username regex"));

/// An account that can log in and own a chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            username,
            password_hash,
            created_at: super::now_micros(),
        }
    }
}

/// Validate a signup form. Returns every problem found, not just the first.
pub fn validate_signup(username: &str, password: &str, confirm: &str) -> Result<()> {
    let mut problems = Vec::new();

    let username = username.trim();
    if username.is_empty() {
        problems.push("username cannot be empty".to_string());
    } else if username.chars().count() > MAX_USERNAME_LENGTH {
        problems.push(format!(
            "username exceeds maximum length of {MAX_USERNAME_LENGTH} characters"
        ));
    } else if !USERNAME_RE.is_match(username) {
        problems.push("username may only contain letters, digits and @/./+/-/_".to_string());
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        ));
    }
    if password != confirm {
        problems.push("the two password fields didn't match".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(VerbaError::InvalidInput(problems.join("; ")))
    }
}
