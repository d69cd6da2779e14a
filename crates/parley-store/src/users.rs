//! Account table operations.
//!
//! Length and format validation happens at the session layer before these
//! are called; the store enforces only uniqueness and credential checks.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use parley_shared::constants::{ROLE_ADMIN, ROLE_MEMBER};

use crate::database::Store;
use crate::error::{Result, StoreError};
use crate::models::UserRecord;

const USER_COLUMNS: &str =
    "id, username, COALESCE(display_name, username), role, is_banned, is_muted, \
     created_at, updated_at";

impl Store {
    /// Insert a new account. The first account in an empty store is created
    /// as admin so a fresh server has an operator without a restart.
    pub fn register(
        &self,
        username: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<()> {
        let hashed = self.hasher().hash(password);
        let now = Utc::now().to_rfc3339();

        let conn = self.lock();
        let taken: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )?;
        if taken > 0 {
            return Err(StoreError::AlreadyExists);
        }

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let role = if total == 0 { ROLE_ADMIN } else { ROLE_MEMBER };

        conn.execute(
            "INSERT INTO users (username, password, display_name, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                username,
                hashed,
                display_name.unwrap_or(username),
                role,
                now,
            ],
        )?;

        tracing::info!(username, role, "user registered");
        Ok(())
    }

    /// True iff the user exists and the password matches. Deliberately does
    /// not distinguish an unknown username from a wrong password.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        let stored: Option<String> = self
            .lock()
            .query_row(
                "SELECT password FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match stored {
            Some(stored) => self.hasher().verify(password, &stored),
            None => false,
        })
    }

    /// Re-verifies the old password before storing the new one.
    pub fn change_password(&self, username: &str, old: &str, new: &str) -> Result<()> {
        if !self.authenticate(username, old)? {
            return Err(StoreError::WrongCredentials);
        }

        let hashed = self.hasher().hash(new);
        self.lock().execute(
            "UPDATE users SET password = ?1, updated_at = ?2 WHERE username = ?3",
            params![hashed, Utc::now().to_rfc3339(), username],
        )?;

        tracing::info!(username, "password changed");
        Ok(())
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        let count: i64 = self.lock().query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn display_name(&self, username: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .query_row(
                "SELECT COALESCE(display_name, username) FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn update_display_name(&self, username: &str, display_name: &str) -> Result<bool> {
        let changed = self.lock().execute(
            "UPDATE users SET display_name = ?1, updated_at = ?2 WHERE username = ?3",
            params![display_name, Utc::now().to_rfc3339(), username],
        )?;
        Ok(changed > 0)
    }

    pub fn role(&self, username: &str) -> Result<Option<i64>> {
        Ok(self
            .lock()
            .query_row(
                "SELECT role FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn is_admin(&self, username: &str) -> Result<bool> {
        Ok(self.role(username)? == Some(ROLE_ADMIN))
    }

    pub fn set_role(&self, username: &str, role: i64) -> Result<bool> {
        let changed = self.lock().execute(
            "UPDATE users SET role = ?1, updated_at = ?2 WHERE username = ?3",
            params![role, Utc::now().to_rfc3339(), username],
        )?;
        if changed > 0 {
            tracing::info!(username, role, "role updated");
        }
        Ok(changed > 0)
    }

    pub fn ban(&self, username: &str) -> Result<bool> {
        self.set_flag(username, "is_banned", true)
    }

    pub fn unban(&self, username: &str) -> Result<bool> {
        self.set_flag(username, "is_banned", false)
    }

    pub fn mute(&self, username: &str) -> Result<bool> {
        self.set_flag(username, "is_muted", true)
    }

    pub fn unmute(&self, username: &str) -> Result<bool> {
        self.set_flag(username, "is_muted", false)
    }

    pub fn is_banned(&self, username: &str) -> Result<bool> {
        self.get_flag(username, "is_banned")
    }

    pub fn is_muted(&self, username: &str) -> Result<bool> {
        self.get_flag(username, "is_muted")
    }

    pub fn banned_users(&self) -> Result<Vec<String>> {
        self.users_where_flag("is_banned")
    }

    pub fn muted_users(&self) -> Result<Vec<String>> {
        self.users_where_flag("is_muted")
    }

    pub fn user_info(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .lock()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                [username],
                row_to_user,
            )
            .optional()?)
    }

    pub fn all_users(&self) -> Result<Vec<UserRecord>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))?;
        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // `column` is always one of the two fixed flag names above, never input.
    fn set_flag(&self, username: &str, column: &str, value: bool) -> Result<bool> {
        let changed = self.lock().execute(
            &format!("UPDATE users SET {column} = ?1, updated_at = ?2 WHERE username = ?3"),
            params![value as i64, Utc::now().to_rfc3339(), username],
        )?;
        if changed > 0 {
            tracing::info!(username, column, value, "moderation flag updated");
        }
        Ok(changed > 0)
    }

    fn get_flag(&self, username: &str, column: &str) -> Result<bool> {
        let value: Option<i64> = self
            .lock()
            .query_row(
                &format!("SELECT {column} FROM users WHERE username = ?1"),
                [username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0) != 0)
    }

    fn users_where_flag(&self, column: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT username FROM users WHERE {column} = 1 ORDER BY username"
        ))?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;

    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        role: row.get(3)?,
        is_banned: row.get::<_, i64>(4)? != 0,
        is_muted: row.get::<_, i64>(5)? != 0,
        created_at: parse_timestamp(&created_str, 6)?,
        updated_at: parse_timestamp(&updated_str, 7)?,
    })
}

fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
