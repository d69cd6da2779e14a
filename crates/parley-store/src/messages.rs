//! Append-only message log, used for audit and history queries.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Store;
use crate::error::Result;
use crate::models::{MessageKind, MessageRecord};

impl Store {
    /// Append one delivered message. `receiver` is empty for global chat.
    pub fn log_message(
        &self,
        sender: &str,
        receiver: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<()> {
        self.lock().execute(
            "INSERT INTO messages (sender, receiver, content, kind, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sender,
                if receiver.is_empty() { None } else { Some(receiver) },
                content,
                kind.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Newest messages first.
    pub fn recent_messages(&self, limit: u32) -> Result<Vec<MessageRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, sender, COALESCE(receiver, ''), content, kind, timestamp
             FROM messages ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], row_to_record)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn message_count(&self) -> Result<i64> {
        Ok(self
            .lock()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let kind_str: String = row.get(4)?;
    let kind = MessageKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown message kind: {kind_str}").into(),
        )
    })?;

    let ts_str: String = row.get(5)?;
    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(MessageRecord {
        id: row.get(0)?,
        sender: row.get(1)?,
        receiver: row.get(2)?,
        content: row.get(3)?,
        kind,
        timestamp,
    })
}
