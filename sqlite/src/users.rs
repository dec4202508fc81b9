//! Account lookups backing the session gate.
//!
//! The session token only proves who the caller *was* when it was issued.
//! Whether the account is still active and still an administrator is read
//! from the `users` table on every request through [`UserStore`].

use std::fmt;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SqliteError};

/// Account role stored in `users.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Back-office administrator; the only role allowed on the data API.
    Admin,
    /// Portal customer.
    Client,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SqliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Role::Admin),
            "client" => Ok(Role::Client),
            other => Err(SqliteError::ConversionError(format!("unknown role: {other}"))),
        }
    }
}

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

impl UserRecord {
    /// Returns `true` if the account may use the admin data API right now.
    pub fn is_active_admin(&self) -> bool {
        self.is_active && self.role == Role::Admin
    }
}

const USER_COLUMNS: &str = "id, email, full_name, role, is_active";

fn read_user(row: &Row<'_>) -> rusqlite::Result<(i64, String, Option<String>, String, bool)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn into_record(raw: (i64, String, Option<String>, String, bool)) -> Result<UserRecord> {
    let (id, email, full_name, role, is_active) = raw;
    Ok(UserRecord {
        id,
        email,
        full_name,
        role: role.parse()?,
        is_active,
    })
}

/// Reads and writes accounts in the `users` table.
pub struct UserStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Loads a user by id; `None` if it does not exist.
    pub fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                read_user,
            )
            .optional()?
            .map(into_record)
            .transpose()
    }

    /// Loads a user by email (exact match).
    pub fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                read_user,
            )
            .optional()?
            .map(into_record)
            .transpose()
    }

    /// Creates an active account.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::DatabaseError`] if the email is already taken.
    pub fn create_user(
        &self,
        email: &str,
        full_name: Option<&str>,
        role: Role,
    ) -> Result<UserRecord> {
        let raw = self.conn.query_row(
            &format!(
                "INSERT INTO users (email, full_name, role, is_active) VALUES (?1, ?2, ?3, 1) \
                 RETURNING {USER_COLUMNS}"
            ),
            params![email, full_name, role.as_str()],
            read_user,
        )?;
        into_record(raw)
    }

    /// Activates or deactivates an account.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::UserNotFound`] if no user has this id.
    pub fn set_active(&self, id: i64, active: bool) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if rows == 0 {
            return Err(SqliteError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Changes an account's role.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::UserNotFound`] if no user has this id.
    pub fn set_role(&self, id: i64, role: Role) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.as_str(), id],
        )?;
        if rows == 0 {
            return Err(SqliteError::UserNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::generate_schema_sql;
    use portal_core::SchemaRegistry;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&generate_schema_sql(SchemaRegistry::portal()).unwrap())
            .unwrap();
        conn
    }

    #[test]
    fn test_create_and_find() {
        let conn = setup();
        let store = UserStore::new(&conn);
        let created = store
            .create_user("ops@isp.example", Some("Ops"), Role::Admin)
            .unwrap();
        assert!(created.is_active_admin());

        let by_id = store.find_by_id(created.id).unwrap().unwrap();
        assert_eq!(by_id, created);
        let by_email = store.find_by_email("ops@isp.example").unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert!(store.find_by_id(created.id + 1).unwrap().is_none());
    }

    #[test]
    fn test_deactivated_or_demoted_admin_loses_access() {
        let conn = setup();
        let store = UserStore::new(&conn);
        let user = store.create_user("a@isp.example", None, Role::Admin).unwrap();

        store.set_active(user.id, false).unwrap();
        assert!(!store.find_by_id(user.id).unwrap().unwrap().is_active_admin());

        store.set_active(user.id, true).unwrap();
        store.set_role(user.id, Role::Client).unwrap();
        assert!(!store.find_by_id(user.id).unwrap().unwrap().is_active_admin());
    }

    #[test]
    fn test_missing_user_updates_fail() {
        let conn = setup();
        let store = UserStore::new(&conn);
        assert!(matches!(
            store.set_active(42, false),
            Err(SqliteError::UserNotFound(_))
        ));
        assert!(matches!(
            store.set_role(42, Role::Admin),
            Err(SqliteError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_unknown_role_is_a_conversion_error() {
        let conn = setup();
        conn.execute(
            "INSERT INTO users (email, role) VALUES ('x@isp.example', 'superuser')",
            [],
        )
        .unwrap();
        let store = UserStore::new(&conn);
        assert!(matches!(
            store.find_by_email("x@isp.example"),
            Err(SqliteError::ConversionError(_))
        ));
    }

    #[test]
    fn test_duplicate_email_is_rejected() {
        let conn = setup();
        let store = UserStore::new(&conn);
        store.create_user("dup@isp.example", None, Role::Client).unwrap();
        assert!(store.create_user("dup@isp.example", None, Role::Client).is_err());
    }
}
