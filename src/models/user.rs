//! User records.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user.
///
/// `user_id`, `username`, `password` and `phone_number` are required;
/// the remaining fields default to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// UUID identifying the user, stored lower-cased.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Login name.
    pub username: String,
    /// Password as supplied by the client.
    pub password: String,
    /// Contact phone number.
    pub phone_number: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Postal address.
    #[serde(default)]
    pub address: String,
    /// Employer.
    #[serde(default)]
    pub company: String,
}

crate::persistable!(User {
    user_id: "user_id",
    username: "username",
    password: "password",
    phone_number: "phone_number",
    email: "email",
    address: "address",
    company: "company",
});

impl User {
    /// Checks the id format and the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        validate_id(&self.user_id)?;
        for (name, value) in [
            ("username", &self.username),
            ("password", &self.password),
            ("phone_number", &self.phone_number),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{name} is required")));
            }
        }
        Ok(())
    }

    /// Returns the user with its id lower-cased.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.user_id = self.user_id.to_lowercase();
        self
    }

    /// Copies every non-empty field of `patch` onto this user.
    pub fn merge(&mut self, patch: UserPatch) {
        let fields = [
            (&mut self.username, patch.username),
            (&mut self.password, patch.password),
            (&mut self.phone_number, patch.phone_number),
            (&mut self.email, patch.email),
            (&mut self.address, patch.address),
            (&mut self.company, patch.company),
        ];
        for (slot, value) in fields {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
    }
}

/// Partial update for a user; absent or empty fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    /// Must match the path id when present.
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    /// New login name.
    #[serde(default)]
    pub username: Option<String>,
    /// New password.
    #[serde(default)]
    pub password: Option<String>,
    /// New phone number.
    #[serde(default)]
    pub phone_number: Option<String>,
    /// New email.
    #[serde(default)]
    pub email: Option<String>,
    /// New address.
    #[serde(default)]
    pub address: Option<String>,
    /// New employer.
    #[serde(default)]
    pub company: Option<String>,
}

/// Body of the username lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserName {
    /// Login name to look up.
    pub username: String,
}

/// Checks that `id` is a UUID.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if it is not.
pub fn validate_id(id: &str) -> Result<()> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|e| Error::InvalidInput(format!("id format incorrect: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::{Persistable, build_insert};
    use test_case::test_case;

    fn alice() -> User {
        User {
            user_id: "3F2504E0-4F89-11D3-9A0C-0305E82C3301".to_string(),
            username: "Alice".to_string(),
            password: "p4ssw0rd".to_string(),
            phone_number: "12345678901".to_string(),
            email: "alice@gmail.com".to_string(),
            address: String::new(),
            company: "Apple Inc.".to_string(),
        }
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(alice()).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json.get("phone_number").is_some());
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn test_optional_fields_default() {
        let user: User = serde_json::from_str(
            r#"{"userId":"x","username":"a","password":"b","phone_number":"c"}"#,
        )
        .unwrap();
        assert!(user.email.is_empty());
        assert!(user.company.is_empty());
    }

    #[test]
    fn test_missing_required_field_fails_to_parse() {
        let parsed: std::result::Result<User, _> =
            serde_json::from_str(r#"{"userId":"x","username":"a"}"#);
        assert!(parsed.is_err());
    }

    #[test_case("not-a-uuid" ; "bad id")]
    #[test_case("" ; "empty id")]
    fn test_validate_rejects_bad_ids(id: &str) {
        let mut user = alice();
        user.user_id = id.to_string();
        assert!(matches!(user.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_validate_requires_fields() {
        let mut user = alice();
        user.password = "  ".to_string();
        let err = user.validate().unwrap_err();
        assert!(err.to_string().contains("password"));
        assert!(alice().validate().is_ok());
    }

    #[test]
    fn test_normalized_lowercases_id() {
        let user = alice().normalized();
        assert_eq!(user.user_id, "3f2504e0-4f89-11d3-9a0c-0305e82c3301");
    }

    #[test]
    fn test_merge_keeps_empty_fields() {
        let mut user = alice();
        user.merge(UserPatch {
            username: Some("Bob".to_string()),
            email: Some(String::new()),
            ..UserPatch::default()
        });
        assert_eq!(user.username, "Bob");
        assert_eq!(user.email, "alice@gmail.com");
    }

    #[test]
    fn test_persistable_columns() {
        let insert = build_insert("users", &alice()).unwrap();
        assert_eq!(
            insert.sql,
            "INSERT INTO users (user_id,username,password,phone_number,email,address,company) \
             VALUES (?,?,?,?,?,?,?)"
        );
        assert_eq!(alice().fields().len(), 7);
    }
}
