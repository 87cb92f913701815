// SQLite persistence for player documents.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::GameError;
use crate::player::Player;

/// SQLite-backed store of one JSON document per player. `total_points` is
/// mirrored into its own column so the leaderboard can be served by an index.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure the schema
    /// exists. Pass `":memory:"` for an ephemeral database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                user_id      TEXT PRIMARY KEY,
                username     TEXT NOT NULL DEFAULT '',
                total_points INTEGER NOT NULL DEFAULT 0,
                document     TEXT NOT NULL,
                updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_players_total_points
                ON players(total_points DESC);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Every write goes through a transaction, so a panic mid-update
        // leaves nothing half-applied and the connection stays usable.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Plain reads and writes
    // ------------------------------------------------------------------

    pub fn load_player(&self, user_id: &str) -> Result<Option<Player>> {
        let conn = self.conn();
        read_player(&conn, user_id)
    }

    /// Insert or overwrite a player document.
    pub fn save_player(&self, player: &Player) -> Result<()> {
        let conn = self.conn();
        write_player(&conn, player)
    }

    /// Top `limit` players by total points, ties broken by user id.
    pub fn top_players(&self, limit: usize) -> Result<Vec<Player>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT document FROM players
                 ORDER BY total_points DESC, user_id ASC
                 LIMIT ?1",
            )
            .context("failed to prepare leaderboard query")?;

        let docs = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .context("failed to query leaderboard")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read leaderboard rows")?;

        docs.iter()
            .map(|doc| serde_json::from_str(doc).context("failed to deserialize player"))
            .collect()
    }

    pub fn player_count(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))
            .context("failed to count players")?;
        Ok(count as usize)
    }

    /// Bulk-load documents (e.g. a legacy JSON export) in one transaction.
    /// Existing rows with the same user id are replaced.
    pub fn import_players(&self, players: &[Player]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin import transaction")?;
        for player in players {
            write_player(&tx, player)?;
        }
        tx.commit().context("failed to commit import")?;
        Ok(players.len())
    }

    // ------------------------------------------------------------------
    // Transactional read-modify-write
    // ------------------------------------------------------------------

    /// Apply `f` to an existing player and persist the result atomically.
    /// Nothing is written when `f` returns an error.
    pub fn update_player<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut Player) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let mut conn = self.conn();
        let tx = begin(&mut conn)?;
        let mut player = read_player(&tx, user_id)
            .map_err(GameError::from)?
            .ok_or_else(|| GameError::NotFound(format!("player {user_id}")))?;

        let out = f(&mut player)?;
        write_player(&tx, &player)?;
        commit(tx)?;
        Ok(out)
    }

    /// Like [`update_player`](Self::update_player), creating a fresh document
    /// first if the user has none. A non-empty `username` refreshes the
    /// stored display name.
    pub fn update_or_create_player<T>(
        &self,
        user_id: &str,
        username: &str,
        f: impl FnOnce(&mut Player) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let mut conn = self.conn();
        let tx = begin(&mut conn)?;
        let mut player = read_player(&tx, user_id)
            .map_err(GameError::from)?
            .unwrap_or_else(|| Player::new(user_id, username));
        if !username.is_empty() {
            player.username = username.to_string();
        }

        let out = f(&mut player)?;
        write_player(&tx, &player)?;
        commit(tx)?;
        Ok(out)
    }

    /// Apply `f` to two existing players inside one transaction. Both
    /// documents are written or neither is.
    pub fn update_pair<T>(
        &self,
        first_id: &str,
        second_id: &str,
        f: impl FnOnce(&mut Player, &mut Player) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        if first_id == second_id {
            return Err(GameError::InvalidArgument(
                "cannot update a player against itself".to_string(),
            ));
        }

        let mut conn = self.conn();
        let tx = begin(&mut conn)?;
        let mut first = read_player(&tx, first_id)
            .map_err(GameError::from)?
            .ok_or_else(|| GameError::NotFound(format!("player {first_id}")))?;
        let mut second = read_player(&tx, second_id)
            .map_err(GameError::from)?
            .ok_or_else(|| GameError::NotFound(format!("player {second_id}")))?;

        let out = f(&mut first, &mut second)?;
        write_player(&tx, &first)?;
        write_player(&tx, &second)?;
        commit(tx)?;
        Ok(out)
    }
}

fn begin(conn: &mut Connection) -> Result<Transaction<'_>, GameError> {
    conn.transaction()
        .context("failed to begin transaction")
        .map_err(GameError::from)
}

fn commit(tx: Transaction<'_>) -> Result<(), GameError> {
    tx.commit()
        .context("failed to commit transaction")
        .map_err(GameError::from)
}

fn read_player(conn: &Connection, user_id: &str) -> Result<Option<Player>> {
    let doc: Option<String> = conn
        .query_row(
            "SELECT document FROM players WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query player")?;

    doc.map(|d| {
        serde_json::from_str(&d).with_context(|| format!("corrupt document for player {user_id}"))
    })
    .transpose()
}

fn write_player(conn: &Connection, player: &Player) -> Result<()> {
    let doc = serde_json::to_string(player).context("failed to serialize player")?;
    conn.execute(
        "INSERT INTO players (user_id, username, total_points, document, updated_at)
         VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
         ON CONFLICT(user_id) DO UPDATE SET
            username     = excluded.username,
            total_points = excluded.total_points,
            document     = excluded.document,
            updated_at   = excluded.updated_at",
        params![
            player.user_id,
            player.username,
            player.total_points as i64,
            doc
        ],
    )
    .with_context(|| format!("failed to save player {}", player.user_id))?;
    Ok(())
}
