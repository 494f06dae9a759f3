use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Duration;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

use super::StorageBackend;
use crate::error::{Result, VerbaError};
use crate::model::*;

/// SQLite-backed storage for users, sessions and messages.
///
/// Uses a single `Connection` behind `Arc<Mutex<>>` so it can be shared
/// across async tasks.  All blocking SQLite calls go through
/// [`with_conn`](Self::with_conn) which runs them on the Tokio blocking
/// thread-pool.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("path", &self.path)
            .finish()
    }
}

const SESSION_COLUMNS: &str = "id, user_id, started_at, last_active";
const MESSAGE_COLUMNS: &str = "id, session_id, content, role, created_at";
const USER_COLUMNS: &str = "id, username, password_hash, created_at";

impl SqliteStorage {
    /// Open (or create) a file-backed SQLite database at `path`.
    ///
    /// Sets WAL journal mode and enables foreign keys, then creates all
    /// tables and indexes if they don't already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .map_err(|e| VerbaError::Storage(format!("failed to open SQLite database: {e}")))?;

        Self::configure_and_init(conn, path)
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            VerbaError::Storage(format!("failed to open in-memory SQLite database: {e}"))
        })?;

        Self::configure_and_init(conn, PathBuf::from(":memory:"))
    }

    /// Return the path this database was opened with (`:memory:` for in-memory).
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── helpers ────────────────────────────────────────────────────────

    /// Shared initialisation: pragmas + table creation.
    fn configure_and_init(conn: Connection, path: PathBuf) -> Result<Self> {
        // WAL mode for better concurrent-read performance.
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| VerbaError::Storage(format!("failed to set WAL mode: {e}")))?;

        // Sessions and messages cascade from their owning user.
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| VerbaError::Storage(format!("failed to enable foreign keys: {e}")))?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };

        storage.create_tables()?;
        Ok(storage)
    }

    /// Create all tables and indexes (idempotent).
    fn create_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| VerbaError::Storage(format!("failed to acquire database lock: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS logins (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                started_at TEXT NOT NULL,
                last_active TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'ai')),
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_logins_user_id ON logins(user_id);
            CREATE INDEX IF NOT EXISTS idx_chat_sessions_user_id ON chat_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_chat_messages_session
                ON chat_messages(session_id, created_at);
            ",
        )
        .map_err(|e| VerbaError::Storage(format!("failed to create tables: {e}")))?;

        Ok(())
    }

    /// Run a blocking closure against the SQLite connection on the Tokio
    /// blocking thread-pool.  This is the primary way trait methods
    /// interact with the database.
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                VerbaError::Storage(format!("failed to acquire database lock: {e}"))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| VerbaError::Storage(format!("task join error: {e}")))?
    }
}

// ── row mapping ────────────────────────────────────────────────────────

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

fn timestamp_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let s: String = row.get(idx)?;
    parse_timestamp(&s).map_err(|e| conversion_error(idx, e))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, 0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: timestamp_col(row, 3)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        started_at: timestamp_col(row, 2)?,
        last_active: timestamp_col(row, 3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role: String = row.get(3)?;
    Ok(ChatMessage {
        id: uuid_col(row, 0)?,
        session_id: uuid_col(row, 1)?,
        content: row.get(2)?,
        role: role.parse().map_err(|e: String| conversion_error(3, e))?,
        created_at: timestamp_col(row, 4)?,
    })
}

fn storage_err(context: &str) -> impl FnOnce(rusqlite::Error) -> VerbaError + '_ {
    move |e| VerbaError::Storage(format!("{context}: {e}"))
}

impl StorageBackend for SqliteStorage {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let user = User::new(username.to_string(), password_hash.to_string());
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.password_hash,
                    format_timestamp(&user.created_at),
                ],
            );
            match inserted {
                Ok(_) => Ok(user),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(VerbaError::InvalidInput(format!(
                        "a user named '{}' already exists",
                        user.username
                    )))
                }
                Err(e) => Err(VerbaError::Storage(format!("failed to create user: {e}"))),
            }
        })
        .await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()
            .map_err(storage_err("failed to look up user"))
        })
        .await
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            let n = conn
                .execute("DELETE FROM users WHERE id = ?1", params![user_id.to_string()])
                .map_err(storage_err("failed to delete user"))?;
            if n == 0 {
                return Err(VerbaError::NotFound(format!("user {user_id}")));
            }
            Ok(())
        })
        .await
    }

    async fn create_login(&self, user_id: Uuid) -> Result<Uuid> {
        let token = Uuid::new_v4();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO logins (token, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![
                    token.to_string(),
                    user_id.to_string(),
                    format_timestamp(&now_micros()),
                ],
            )
            .map_err(storage_err("failed to create login"))?;
            Ok(token)
        })
        .await
    }

    async fn user_for_token(&self, token: Uuid) -> Result<Option<User>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT u.id, u.username, u.password_hash, u.created_at
                 FROM logins l JOIN users u ON u.id = l.user_id
                 WHERE l.token = ?1",
                params![token.to_string()],
                user_from_row,
            )
            .optional()
            .map_err(storage_err("failed to resolve login"))
        })
        .await
    }

    async fn delete_login(&self, token: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM logins WHERE token = ?1",
                params![token.to_string()],
            )
            .map_err(storage_err("failed to delete login"))?;
            Ok(())
        })
        .await
    }

    async fn get_or_create_session(&self, user_id: Uuid) -> Result<(ChatSession, bool)> {
        self.with_conn(move |conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage_err("failed to begin transaction"))?;

            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {SESSION_COLUMNS} FROM chat_sessions
                         WHERE user_id = ?1 ORDER BY started_at ASC, rowid ASC LIMIT 1"
                    ),
                    params![user_id.to_string()],
                    session_from_row,
                )
                .optional()
                .map_err(storage_err("failed to load session"))?;

            if let Some(session) = existing {
                return Ok((session, false));
            }

            let session = ChatSession::new(user_id);
            tx.execute(
                "INSERT INTO chat_sessions (id, user_id, started_at, last_active)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.id.to_string(),
                    session.user_id.to_string(),
                    format_timestamp(&session.started_at),
                    format_timestamp(&session.last_active),
                ],
            )
            .map_err(storage_err("failed to create session"))?;
            tx.commit().map_err(storage_err("failed to commit session"))?;

            Ok((session, true))
        })
        .await
    }

    async fn touch_session(&self, session_id: Uuid) -> Result<ChatSession> {
        self.with_conn(move |conn| {
            let n = conn
                .execute(
                    "UPDATE chat_sessions SET last_active = ?1 WHERE id = ?2",
                    params![format_timestamp(&now_micros()), session_id.to_string()],
                )
                .map_err(storage_err("failed to touch session"))?;
            if n == 0 {
                return Err(VerbaError::NotFound(format!("session {session_id}")));
            }
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1"),
                params![session_id.to_string()],
                session_from_row,
            )
            .map_err(storage_err("failed to reload session"))
        })
        .await
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        content: &str,
        role: MessageRole,
    ) -> Result<ChatMessage> {
        let content = content.to_string();
        self.with_conn(move |conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage_err("failed to begin transaction"))?;

            let latest: Option<String> = tx
                .query_row(
                    "SELECT MAX(created_at) FROM chat_messages WHERE session_id = ?1",
                    params![session_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(storage_err("failed to read latest message time"))?;

            // Timestamps within a session are strictly increasing.
            let mut created_at = now_micros();
            if let Some(latest) = latest.as_deref().and_then(|s| parse_timestamp(s).ok()) {
                if created_at <= latest {
                    created_at = latest + Duration::microseconds(1);
                }
            }

            let message = ChatMessage {
                id: Uuid::now_v7(),
                session_id,
                content,
                role,
                created_at,
            };

            tx.execute(
                "INSERT INTO chat_messages (id, session_id, content, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id.to_string(),
                    message.session_id.to_string(),
                    message.content,
                    message.role.as_str(),
                    format_timestamp(&message.created_at),
                ],
            )
            .map_err(storage_err("failed to append message"))?;
            tx.commit().map_err(storage_err("failed to commit message"))?;

            Ok(message)
        })
        .await
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM chat_messages
                     WHERE session_id = ?1 ORDER BY created_at ASC, rowid ASC"
                ))
                .map_err(storage_err("failed to prepare message query"))?;
            let rows = stmt
                .query_map(params![session_id.to_string()], message_from_row)
                .map_err(storage_err("failed to list messages"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err("failed to read message row"))
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(storage_err("database ping failed"))?;
            Ok(())
        })
        .await
    }
}
