//! SQLite-backed fixture aggregate store.
//!
//! Update discipline is replacement, never mutation: a new graph for a
//! fixture id deletes the prior aggregate in full and inserts a fresh one
//! inside a single transaction. Owned rows hang off `fixture_details` with
//! `ON DELETE CASCADE`; the league row is a shared reference and never
//! cascades.

use crate::error::StoreError;
use crate::models::{
    Fixture, FixtureDetails, Goals, League, Odd, OddValue, Status, Team, Teams,
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS leagues (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    country TEXT NOT NULL,
    logo TEXT NOT NULL,
    flag TEXT,
    season INTEGER NOT NULL,
    round TEXT NOT NULL
);

-- Aggregate root. Surrogate ids must stay monotonic (AUTOINCREMENT) so the
-- id tie-break on equal last_updated stays deterministic across replacements.
CREATE TABLE IF NOT EXISTS fixture_details (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    league_id INTEGER NOT NULL REFERENCES leagues(id),
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fixture_details_updated
    ON fixture_details(last_updated DESC, id DESC);

CREATE TABLE IF NOT EXISTS fixtures (
    id INTEGER PRIMARY KEY,
    referee TEXT,
    timezone TEXT NOT NULL,
    date TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    fixture_details_id INTEGER NOT NULL
        REFERENCES fixture_details(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    long TEXT NOT NULL,
    short TEXT NOT NULL,
    elapsed INTEGER,
    fixture_id INTEGER NOT NULL REFERENCES fixtures(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS teams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fixture_details_id INTEGER NOT NULL
        REFERENCES fixture_details(id) ON DELETE CASCADE
);

-- Raw team ids repeat across fixtures, so home/away identity is the
-- composite (team id, enclosing teams id).
CREATE TABLE IF NOT EXISTS home_team (
    id INTEGER NOT NULL,
    teams_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    logo TEXT NOT NULL,
    winner INTEGER,
    PRIMARY KEY (id, teams_id)
);

CREATE TABLE IF NOT EXISTS away_team (
    id INTEGER NOT NULL,
    teams_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    logo TEXT NOT NULL,
    winner INTEGER,
    PRIMARY KEY (id, teams_id)
);

CREATE INDEX IF NOT EXISTS idx_home_team_name ON home_team(name);
CREATE INDEX IF NOT EXISTS idx_away_team_name ON away_team(name);

CREATE TABLE IF NOT EXISTS goals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    home INTEGER,
    away INTEGER,
    fixture_details_id INTEGER NOT NULL
        REFERENCES fixture_details(id) ON DELETE CASCADE
);

-- Odd ids are only unique within one fixture's aggregate.
CREATE TABLE IF NOT EXISTS odds (
    id INTEGER NOT NULL,
    fixture_details_id INTEGER NOT NULL
        REFERENCES fixture_details(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    PRIMARY KEY (id, fixture_details_id)
);

CREATE TABLE IF NOT EXISTS odd_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    value TEXT NOT NULL,
    odd REAL NOT NULL,
    odds_id INTEGER NOT NULL,
    fixture_details_id INTEGER NOT NULL,
    FOREIGN KEY (odds_id, fixture_details_id)
        REFERENCES odds(id, fixture_details_id) ON DELETE CASCADE
);
"#;

/// Optional exact-match filters for `list`, all ANDed.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub home: Option<String>,
    pub away: Option<String>,
    pub date: Option<NaiveDate>,
}

pub struct FixtureStore {
    conn: Arc<Mutex<Connection>>,
}

impl FixtureStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database at {db_path}"))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!("WAL mode not active, journal_mode = {journal_mode}");
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM fixture_details", [], |row| row.get(0))
            .unwrap_or(0);
        info!("📊 fixture database ready at {db_path} ({count} aggregates)");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Replace the aggregate for `graph.fixture.id` with `graph`, creating
    /// it if no prior aggregate exists. The swap is atomic: readers see the
    /// old aggregate or the new one, never a mix.
    pub fn replace(&self, graph: &FixtureDetails) -> Result<FixtureDetails, StoreError> {
        let mut seen = HashSet::new();
        for odd in &graph.odds {
            if !seen.insert(odd.id) {
                return Err(StoreError::Constraint(format!(
                    "duplicate odd id {} in fixture {}",
                    odd.id, graph.fixture.id
                )));
            }
        }

        self.replace_at(graph, Utc::now())
    }

    fn replace_at(
        &self,
        graph: &FixtureDetails,
        last_updated: DateTime<Utc>,
    ) -> Result<FixtureDetails, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Delete-then-insert: the cascade removes every owned row of the
        // prior aggregate but leaves the shared league row alone.
        if let Some(prior) = details_id_for_fixture(&tx, graph.fixture.id)? {
            tx.execute("DELETE FROM fixture_details WHERE id = ?1", params![prior])?;
        }

        let league_known: Option<i64> = tx
            .query_row(
                "SELECT id FROM leagues WHERE id = ?1",
                params![graph.league.id],
                |row| row.get(0),
            )
            .optional()?;
        if league_known.is_none() {
            tx.execute(
                "INSERT INTO leagues (id, name, country, logo, flag, season, round)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    graph.league.id,
                    graph.league.name,
                    graph.league.country,
                    graph.league.logo,
                    graph.league.flag,
                    graph.league.season,
                    graph.league.round,
                ],
            )?;
        }

        tx.execute(
            "INSERT INTO fixture_details (league_id, last_updated) VALUES (?1, ?2)",
            params![
                graph.league.id,
                last_updated.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        let details_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO fixtures (id, referee, timezone, date, timestamp, fixture_details_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                graph.fixture.id,
                graph.fixture.referee,
                graph.fixture.timezone,
                graph.fixture.date.to_rfc3339(),
                graph.fixture.timestamp,
                details_id,
            ],
        )?;
        tx.execute(
            "INSERT INTO status (long, short, elapsed, fixture_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                graph.fixture.status.long,
                graph.fixture.status.short,
                graph.fixture.status.elapsed,
                graph.fixture.id,
            ],
        )?;

        tx.execute(
            "INSERT INTO teams (fixture_details_id) VALUES (?1)",
            params![details_id],
        )?;
        let teams_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO home_team (id, teams_id, name, logo, winner) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                graph.teams.home.id,
                teams_id,
                graph.teams.home.name,
                graph.teams.home.logo,
                graph.teams.home.winner,
            ],
        )?;
        tx.execute(
            "INSERT INTO away_team (id, teams_id, name, logo, winner) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                graph.teams.away.id,
                teams_id,
                graph.teams.away.name,
                graph.teams.away.logo,
                graph.teams.away.winner,
            ],
        )?;

        tx.execute(
            "INSERT INTO goals (home, away, fixture_details_id) VALUES (?1, ?2, ?3)",
            params![graph.goals.home, graph.goals.away, details_id],
        )?;

        for odd in &graph.odds {
            tx.execute(
                "INSERT INTO odds (id, fixture_details_id, name) VALUES (?1, ?2, ?3)",
                params![odd.id, details_id, odd.name],
            )?;
            for value in &odd.values {
                tx.execute(
                    "INSERT INTO odd_values (value, odd, odds_id, fixture_details_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![value.value, value.odd, odd.id, details_id],
                )?;
            }
        }

        tx.commit()?;

        load_aggregate(&conn, details_id)
    }

    /// Look up the aggregate whose embedded fixture id matches.
    pub fn get(&self, fixture_id: i64) -> Result<FixtureDetails, StoreError> {
        let conn = self.conn.lock();
        let details_id = details_id_for_fixture(&conn, fixture_id)?
            .ok_or(StoreError::NotFound(fixture_id))?;
        load_aggregate(&conn, details_id)
    }

    /// Filtered, paginated listing ordered by last_updated descending,
    /// ties broken by aggregate id descending.
    pub fn list(
        &self,
        filters: &ListFilters,
        page: u32,
        count: u32,
    ) -> Result<Vec<FixtureDetails>, StoreError> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare_cached(
            "SELECT fd.id
             FROM fixture_details fd
             JOIN fixtures f ON f.fixture_details_id = fd.id
             JOIN teams t ON t.fixture_details_id = fd.id
             JOIN home_team h ON h.teams_id = t.id
             JOIN away_team a ON a.teams_id = t.id
             WHERE (?1 IS NULL OR h.name = ?1)
               AND (?2 IS NULL OR a.name = ?2)
               AND (?3 IS NULL OR date(f.date) = ?3)
             ORDER BY fd.last_updated DESC, fd.id DESC
             LIMIT ?4 OFFSET ?5",
        )?;

        let date_filter = filters.date.map(|d| d.format("%Y-%m-%d").to_string());
        let limit = i64::from(count);
        let offset = i64::from(page) * i64::from(count);

        let ids: Vec<i64> = stmt
            .query_map(
                params![filters.home, filters.away, date_filter, limit, offset],
                |row| row.get(0),
            )?
            .collect::<rusqlite::Result<_>>()?;

        ids.into_iter()
            .map(|id| load_aggregate(&conn, id))
            .collect()
    }
}

fn details_id_for_fixture(
    conn: &Connection,
    fixture_id: i64,
) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row(
        "SELECT fixture_details_id FROM fixtures WHERE id = ?1",
        params![fixture_id],
        |row| row.get(0),
    )
    .optional()
}

fn parse_datetime(
    idx: usize,
    raw: &str,
) -> Result<DateTime<chrono::FixedOffset>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Hydrate one full aggregate by its surrogate id.
fn load_aggregate(conn: &Connection, details_id: i64) -> Result<FixtureDetails, StoreError> {
    let (league_id, last_updated) = conn.query_row(
        "SELECT league_id, last_updated FROM fixture_details WHERE id = ?1",
        params![details_id],
        |row| {
            let league_id: i64 = row.get(0)?;
            let raw: String = row.get(1)?;
            let last_updated = parse_datetime(1, &raw)?.with_timezone(&Utc);
            Ok((league_id, last_updated))
        },
    )?;

    let league = conn.query_row(
        "SELECT id, name, country, logo, flag, season, round FROM leagues WHERE id = ?1",
        params![league_id],
        |row| {
            Ok(League {
                id: row.get(0)?,
                name: row.get(1)?,
                country: row.get(2)?,
                logo: row.get(3)?,
                flag: row.get(4)?,
                season: row.get(5)?,
                round: row.get(6)?,
            })
        },
    )?;

    let fixture = conn.query_row(
        "SELECT f.id, f.referee, f.timezone, f.date, f.timestamp, s.long, s.short, s.elapsed
         FROM fixtures f
         JOIN status s ON s.fixture_id = f.id
         WHERE f.fixture_details_id = ?1",
        params![details_id],
        |row| {
            let raw_date: String = row.get(3)?;
            Ok(Fixture {
                id: row.get(0)?,
                referee: row.get(1)?,
                timezone: row.get(2)?,
                date: parse_datetime(3, &raw_date)?,
                timestamp: row.get(4)?,
                status: Status {
                    long: row.get(5)?,
                    short: row.get(6)?,
                    elapsed: row.get(7)?,
                },
            })
        },
    )?;

    let teams = conn.query_row(
        "SELECT h.id, h.name, h.logo, h.winner, a.id, a.name, a.logo, a.winner
         FROM teams t
         JOIN home_team h ON h.teams_id = t.id
         JOIN away_team a ON a.teams_id = t.id
         WHERE t.fixture_details_id = ?1",
        params![details_id],
        |row| {
            Ok(Teams {
                home: Team {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    logo: row.get(2)?,
                    winner: row.get(3)?,
                },
                away: Team {
                    id: row.get(4)?,
                    name: row.get(5)?,
                    logo: row.get(6)?,
                    winner: row.get(7)?,
                },
            })
        },
    )?;

    let goals = conn.query_row(
        "SELECT home, away FROM goals WHERE fixture_details_id = ?1",
        params![details_id],
        |row| {
            Ok(Goals {
                home: row.get(0)?,
                away: row.get(1)?,
            })
        },
    )?;

    let mut odds_stmt = conn.prepare_cached(
        "SELECT id, name FROM odds WHERE fixture_details_id = ?1 ORDER BY rowid",
    )?;
    let odd_rows: Vec<(i64, String)> = odds_stmt
        .query_map(params![details_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;

    let mut values_stmt = conn.prepare_cached(
        "SELECT value, odd FROM odd_values
         WHERE odds_id = ?1 AND fixture_details_id = ?2
         ORDER BY id",
    )?;
    let mut odds = Vec::with_capacity(odd_rows.len());
    for (odd_id, name) in odd_rows {
        let values: Vec<OddValue> = values_stmt
            .query_map(params![odd_id, details_id], |row| {
                Ok(OddValue {
                    value: row.get(0)?,
                    odd: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        odds.push(Odd {
            id: odd_id,
            name,
            values,
        });
    }

    Ok(FixtureDetails {
        fixture,
        league,
        teams,
        goals,
        odds,
        last_updated: Some(last_updated),
    })
}
