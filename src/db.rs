//! SQLite progress store: schema, queries and persisted row shapes.
//!
//! The store is the source of truth for resume state. Events and bouts are
//! append-only plus a single `detail_scraped 0 → 1` flip; detail rows are
//! write-once, keyed by `(bout_link, fighter_slot)`. Idempotence is honored
//! through the flags, never through upserts.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;

use crate::normalize::{EventRecord, Outcome};

const DB_PATH: &str = "data/ufc.sqlite";

pub fn connect() -> anyhow::Result<Connection> {
    if let Some(dir) = Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            event_id       TEXT PRIMARY KEY,
            link           TEXT UNIQUE NOT NULL,
            title          TEXT NOT NULL,
            date           TEXT NOT NULL,
            location       TEXT,
            detail_scraped INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_events_pending ON events(detail_scraped);

        CREATE TABLE IF NOT EXISTS bouts (
            link           TEXT PRIMARY KEY,
            event_id       TEXT NOT NULL REFERENCES events(event_id),
            detail_scraped INTEGER NOT NULL DEFAULT 0,
            claimed_at     TEXT,
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_bouts_pending ON bouts(detail_scraped);
        CREATE INDEX IF NOT EXISTS idx_bouts_event ON bouts(event_id);

        CREATE TABLE IF NOT EXISTS fight_results (
            id            INTEGER PRIMARY KEY,
            bout_link     TEXT NOT NULL,
            fighter_slot  INTEGER NOT NULL CHECK(fighter_slot IN (1, 2)),
            fighter_name  TEXT NOT NULL,
            outcome       TEXT NOT NULL CHECK(outcome IN ('WIN','LOSS','NO_CONTEST')),
            knockdowns    INTEGER NOT NULL,
            sig_landed    INTEGER NOT NULL,
            sig_attempted INTEGER NOT NULL,
            td_landed     INTEGER NOT NULL,
            td_attempted  INTEGER NOT NULL,
            sub_attempts  INTEGER NOT NULL,
            weight_class  TEXT,
            method        TEXT,
            round         INTEGER NOT NULL,
            time_seconds  INTEGER NOT NULL,
            event_title   TEXT NOT NULL,
            UNIQUE(bout_link, fighter_slot)
        );
        CREATE INDEX IF NOT EXISTS idx_results_bout ON fight_results(bout_link);

        CREATE TABLE IF NOT EXISTS fight_totals (
            id              INTEGER PRIMARY KEY,
            bout_link       TEXT NOT NULL,
            fighter_slot    INTEGER NOT NULL CHECK(fighter_slot IN (1, 2)),
            fighter_name    TEXT NOT NULL,
            knockdowns      INTEGER NOT NULL,
            sig_landed      INTEGER NOT NULL,
            sig_attempted   INTEGER NOT NULL,
            sig_pct         INTEGER NOT NULL,
            total_landed    INTEGER NOT NULL,
            total_attempted INTEGER NOT NULL,
            td_landed       INTEGER NOT NULL,
            td_attempted    INTEGER NOT NULL,
            td_pct          INTEGER NOT NULL,
            sub_attempts    INTEGER NOT NULL,
            reversals       INTEGER NOT NULL,
            control_seconds INTEGER NOT NULL,
            event_title     TEXT NOT NULL,
            UNIQUE(bout_link, fighter_slot)
        );
        CREATE INDEX IF NOT EXISTS idx_totals_bout ON fight_totals(bout_link);

        CREATE TABLE IF NOT EXISTS strike_breakdowns (
            id                 INTEGER PRIMARY KEY,
            bout_link          TEXT NOT NULL,
            fighter_slot       INTEGER NOT NULL CHECK(fighter_slot IN (1, 2)),
            fighter_name       TEXT NOT NULL,
            sig_landed         INTEGER NOT NULL,
            sig_attempted      INTEGER NOT NULL,
            sig_pct            INTEGER NOT NULL,
            head_landed        INTEGER NOT NULL,
            head_attempted     INTEGER NOT NULL,
            body_landed        INTEGER NOT NULL,
            body_attempted     INTEGER NOT NULL,
            leg_landed         INTEGER NOT NULL,
            leg_attempted      INTEGER NOT NULL,
            distance_landed    INTEGER NOT NULL,
            distance_attempted INTEGER NOT NULL,
            clinch_landed      INTEGER NOT NULL,
            clinch_attempted   INTEGER NOT NULL,
            ground_landed      INTEGER NOT NULL,
            ground_attempted   INTEGER NOT NULL,
            event_title        TEXT NOT NULL,
            UNIQUE(bout_link, fighter_slot)
        );
        CREATE INDEX IF NOT EXISTS idx_strikes_bout ON strike_breakdowns(bout_link);

        -- The logical per-fighter bout record: stats from the bout page
        -- joined with the outcome recorded from the event page.
        CREATE VIEW IF NOT EXISTS bout_details AS
            SELECT t.bout_link, t.fighter_slot, t.fighter_name,
                   t.knockdowns, t.sig_landed, t.sig_attempted, t.sig_pct,
                   t.total_landed, t.total_attempted,
                   t.td_landed, t.td_attempted, t.td_pct,
                   t.sub_attempts, t.reversals, t.control_seconds,
                   t.event_title, r.outcome
            FROM fight_totals t
            LEFT JOIN fight_results r
                   ON r.bout_link = t.bout_link
                  AND r.fighter_slot = t.fighter_slot;
        ",
    )?;
    Ok(())
}

// ── Events ──

pub fn event_links(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT link FROM events")?;
    let links = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<HashSet<String>>>()?;
    Ok(links)
}

pub fn max_event_ordinal(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(CAST(event_id AS INTEGER)), 0) FROM events",
        [],
        |row| row.get(0),
    )
}

pub fn insert_events(conn: &Connection, events: &[EventRecord]) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO events (event_id, link, title, date, location)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for e in events {
            count += stmt.execute(rusqlite::params![
                e.event_id,
                e.link,
                e.title,
                e.date.to_string(),
                e.location,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub struct PendingEvent {
    pub event_id: String,
    pub link: String,
    pub title: String,
}

pub fn fetch_unscraped_events(
    conn: &Connection,
    limit: Option<usize>,
) -> rusqlite::Result<Vec<PendingEvent>> {
    let sql = format!(
        "SELECT event_id, link, title FROM events
         WHERE detail_scraped = 0 ORDER BY event_id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PendingEvent {
                event_id: row.get(0)?,
                link: row.get(1)?,
                title: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ── Event details (bout set + per-fighter results) ──

pub struct FightResultRow {
    pub bout_link: String,
    pub fighter_slot: u32,
    pub fighter_name: String,
    pub outcome: Outcome,
    pub knockdowns: u32,
    pub sig_landed: u32,
    pub sig_attempted: u32,
    pub td_landed: u32,
    pub td_attempted: u32,
    pub sub_attempts: u32,
    pub weight_class: String,
    pub method: String,
    pub round: u32,
    pub time_seconds: u32,
    pub event_title: String,
}

/// Persist one event's harvest atomically: its bout set, its per-fighter
/// result rows, and the event's flag flip. The flag only ever flips in the
/// same transaction that carries the rows, so an interrupt leaves a clean
/// resume point.
pub fn save_event_details(
    conn: &Connection,
    event_id: &str,
    bout_links: &[String],
    results: &[FightResultRow],
) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut new_bouts = 0;
    {
        let mut bout_stmt =
            tx.prepare("INSERT OR IGNORE INTO bouts (link, event_id) VALUES (?1, ?2)")?;
        for link in bout_links {
            new_bouts += bout_stmt.execute(rusqlite::params![link, event_id])?;
        }

        let mut result_stmt = tx.prepare(
            "INSERT OR IGNORE INTO fight_results
             (bout_link, fighter_slot, fighter_name, outcome, knockdowns,
              sig_landed, sig_attempted, td_landed, td_attempted, sub_attempts,
              weight_class, method, round, time_seconds, event_title)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
        )?;
        for r in results {
            result_stmt.execute(rusqlite::params![
                r.bout_link,
                r.fighter_slot,
                r.fighter_name,
                r.outcome.as_str(),
                r.knockdowns,
                r.sig_landed,
                r.sig_attempted,
                r.td_landed,
                r.td_attempted,
                r.sub_attempts,
                r.weight_class,
                r.method,
                r.round,
                r.time_seconds,
                r.event_title,
            ])?;
        }

        tx.execute(
            "UPDATE events SET detail_scraped = 1 WHERE event_id = ?1",
            rusqlite::params![event_id],
        )?;
    }
    tx.commit()?;
    Ok(new_bouts)
}

// ── Bout claims ──

pub struct PendingBout {
    pub link: String,
}

/// Claims older than this are assumed to belong to a dead run.
const STALE_CLAIM: &str = "-1 hour";

pub fn release_stale_claims(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE bouts SET claimed_at = NULL
         WHERE detail_scraped = 0
           AND claimed_at IS NOT NULL
           AND claimed_at < datetime('now', ?1)",
        rusqlite::params![STALE_CLAIM],
    )
}

/// Atomically claim up to `batch` unprocessed bouts. Each returned record
/// has its `claimed_at` sentinel set, so no other worker set can pick it
/// up until the claim is released or the flag flips.
pub fn claim_pending_bouts(conn: &Connection, batch: usize) -> rusqlite::Result<Vec<PendingBout>> {
    let tx = conn.unchecked_transaction()?;
    let links: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT link FROM bouts
             WHERE detail_scraped = 0 AND claimed_at IS NULL
             ORDER BY rowid LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![batch], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };
    let mut claimed = Vec::with_capacity(links.len());
    {
        let mut stmt = tx.prepare(
            "UPDATE bouts SET claimed_at = datetime('now')
             WHERE link = ?1 AND detail_scraped = 0 AND claimed_at IS NULL",
        )?;
        for link in links {
            if stmt.execute(rusqlite::params![link])? == 1 {
                claimed.push(PendingBout { link });
            }
        }
    }
    tx.commit()?;
    Ok(claimed)
}

pub fn release_claim(conn: &Connection, link: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE bouts SET claimed_at = NULL WHERE link = ?1",
        rusqlite::params![link],
    )?;
    Ok(())
}

// ── Bout details ──

pub struct FightTotalsRow {
    pub bout_link: String,
    pub fighter_slot: u32,
    pub fighter_name: String,
    pub knockdowns: u32,
    pub sig_landed: u32,
    pub sig_attempted: u32,
    pub sig_pct: u32,
    pub total_landed: u32,
    pub total_attempted: u32,
    pub td_landed: u32,
    pub td_attempted: u32,
    pub td_pct: u32,
    pub sub_attempts: u32,
    pub reversals: u32,
    pub control_seconds: u32,
    pub event_title: String,
}

pub struct StrikeRow {
    pub bout_link: String,
    pub fighter_slot: u32,
    pub fighter_name: String,
    pub sig_landed: u32,
    pub sig_attempted: u32,
    pub sig_pct: u32,
    pub head_landed: u32,
    pub head_attempted: u32,
    pub body_landed: u32,
    pub body_attempted: u32,
    pub leg_landed: u32,
    pub leg_attempted: u32,
    pub distance_landed: u32,
    pub distance_attempted: u32,
    pub clinch_landed: u32,
    pub clinch_attempted: u32,
    pub ground_landed: u32,
    pub ground_attempted: u32,
    pub event_title: String,
}

/// Persist one bout's detail rows and flip its flag, atomically. Runs once
/// per record as soon as that record succeeds, never as a group commit, so
/// a crash mid-batch loses at most the in-flight record.
pub fn save_bout_details(
    conn: &Connection,
    link: &str,
    totals: &[FightTotalsRow],
    strikes: &[StrikeRow],
) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut totals_stmt = tx.prepare(
            "INSERT OR IGNORE INTO fight_totals
             (bout_link, fighter_slot, fighter_name, knockdowns,
              sig_landed, sig_attempted, sig_pct,
              total_landed, total_attempted,
              td_landed, td_attempted, td_pct,
              sub_attempts, reversals, control_seconds, event_title)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
        )?;
        for t in totals {
            totals_stmt.execute(rusqlite::params![
                t.bout_link,
                t.fighter_slot,
                t.fighter_name,
                t.knockdowns,
                t.sig_landed,
                t.sig_attempted,
                t.sig_pct,
                t.total_landed,
                t.total_attempted,
                t.td_landed,
                t.td_attempted,
                t.td_pct,
                t.sub_attempts,
                t.reversals,
                t.control_seconds,
                t.event_title,
            ])?;
        }

        let mut strike_stmt = tx.prepare(
            "INSERT OR IGNORE INTO strike_breakdowns
             (bout_link, fighter_slot, fighter_name,
              sig_landed, sig_attempted, sig_pct,
              head_landed, head_attempted, body_landed, body_attempted,
              leg_landed, leg_attempted,
              distance_landed, distance_attempted,
              clinch_landed, clinch_attempted,
              ground_landed, ground_attempted, event_title)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
        )?;
        for s in strikes {
            strike_stmt.execute(rusqlite::params![
                s.bout_link,
                s.fighter_slot,
                s.fighter_name,
                s.sig_landed,
                s.sig_attempted,
                s.sig_pct,
                s.head_landed,
                s.head_attempted,
                s.body_landed,
                s.body_attempted,
                s.leg_landed,
                s.leg_attempted,
                s.distance_landed,
                s.distance_attempted,
                s.clinch_landed,
                s.clinch_attempted,
                s.ground_landed,
                s.ground_attempted,
                s.event_title,
            ])?;
        }

        tx.execute(
            "UPDATE bouts SET detail_scraped = 1, claimed_at = NULL WHERE link = ?1",
            rusqlite::params![link],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn count_scraped_bouts(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row(
        "SELECT COUNT(*) FROM bouts WHERE detail_scraped = 1",
        [],
        |row| row.get(0),
    )
}

// ── Stats ──

pub struct Stats {
    pub events: usize,
    pub events_scraped: usize,
    pub bouts: usize,
    pub bouts_scraped: usize,
    pub bouts_claimed: usize,
    pub result_rows: usize,
    pub total_rows: usize,
    pub strike_rows: usize,
}

pub fn get_stats(conn: &Connection) -> rusqlite::Result<Stats> {
    let count = |sql: &str| conn.query_row(sql, [], |row| row.get(0));
    Ok(Stats {
        events: count("SELECT COUNT(*) FROM events")?,
        events_scraped: count("SELECT COUNT(*) FROM events WHERE detail_scraped = 1")?,
        bouts: count("SELECT COUNT(*) FROM bouts")?,
        bouts_scraped: count("SELECT COUNT(*) FROM bouts WHERE detail_scraped = 1")?,
        bouts_claimed: count("SELECT COUNT(*) FROM bouts WHERE claimed_at IS NOT NULL")?,
        result_rows: count("SELECT COUNT(*) FROM fight_results")?,
        total_rows: count("SELECT COUNT(*) FROM fight_totals")?,
        strike_rows: count("SELECT COUNT(*) FROM strike_breakdowns")?,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory store");
        init_schema(&conn).expect("schema");
        conn
    }

    fn event(id: &str, link: &str) -> EventRecord {
        EventRecord {
            event_id: id.to_string(),
            link: link.to_string(),
            title: format!("Event {}", id),
            date: NaiveDate::from_ymd_opt(2024, 4, 13).unwrap(),
            location: "Las Vegas, Nevada, USA".to_string(),
        }
    }

    fn totals_row(link: &str, slot: u32) -> FightTotalsRow {
        FightTotalsRow {
            bout_link: link.to_string(),
            fighter_slot: slot,
            fighter_name: format!("Fighter {}", slot),
            knockdowns: 1,
            sig_landed: 12,
            sig_attempted: 34,
            sig_pct: 35,
            total_landed: 40,
            total_attempted: 70,
            td_landed: 2,
            td_attempted: 5,
            td_pct: 40,
            sub_attempts: 0,
            reversals: 0,
            control_seconds: 95,
            event_title: "Event 0001".to_string(),
        }
    }

    fn strike_row(link: &str, slot: u32) -> StrikeRow {
        StrikeRow {
            bout_link: link.to_string(),
            fighter_slot: slot,
            fighter_name: format!("Fighter {}", slot),
            sig_landed: 12,
            sig_attempted: 34,
            sig_pct: 35,
            head_landed: 8,
            head_attempted: 24,
            body_landed: 2,
            body_attempted: 5,
            leg_landed: 2,
            leg_attempted: 5,
            distance_landed: 10,
            distance_attempted: 30,
            clinch_landed: 2,
            clinch_attempted: 4,
            ground_landed: 0,
            ground_attempted: 0,
            event_title: "Event 0001".to_string(),
        }
    }

    #[test]
    fn init_schema_is_idempotent() {
        let conn = store();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn discovery_dedup_by_link() {
        let conn = store();
        let batch = vec![event("0001", "http://x/e1"), event("0002", "http://x/e2")];
        assert_eq!(insert_events(&conn, &batch).unwrap(), 2);
        // Second discovery over an unchanged remote: no duplicate links.
        assert_eq!(insert_events(&conn, &batch).unwrap(), 0);
        assert_eq!(event_links(&conn).unwrap().len(), 2);
        assert_eq!(max_event_ordinal(&conn).unwrap(), 2);
    }

    #[test]
    fn event_pass_flips_flag_with_rows() {
        let conn = store();
        insert_events(&conn, &[event("0001", "http://x/e1")]).unwrap();
        assert_eq!(fetch_unscraped_events(&conn, None).unwrap().len(), 1);

        let bouts = vec!["http://x/f1".to_string(), "http://x/f2".to_string()];
        let new = save_event_details(&conn, "0001", &bouts, &[]).unwrap();
        assert_eq!(new, 2);
        assert!(fetch_unscraped_events(&conn, None).unwrap().is_empty());

        // Re-running the same save adds nothing.
        assert_eq!(save_event_details(&conn, "0001", &bouts, &[]).unwrap(), 0);
    }

    #[test]
    fn claims_exclude_each_other() {
        let conn = store();
        insert_events(&conn, &[event("0001", "http://x/e1")]).unwrap();
        let bouts: Vec<String> = (1..=3).map(|i| format!("http://x/f{}", i)).collect();
        save_event_details(&conn, "0001", &bouts, &[]).unwrap();

        let first = claim_pending_bouts(&conn, 2).unwrap();
        assert_eq!(first.len(), 2);
        let second = claim_pending_bouts(&conn, 10).unwrap();
        assert_eq!(second.len(), 1);
        assert!(claim_pending_bouts(&conn, 10).unwrap().is_empty());

        release_claim(&conn, &first[0].link).unwrap();
        let reclaimed = claim_pending_bouts(&conn, 10).unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].link, first[0].link);
    }

    #[test]
    fn detail_save_flips_flag_and_is_final() {
        let conn = store();
        insert_events(&conn, &[event("0001", "http://x/e1")]).unwrap();
        save_event_details(&conn, "0001", &["http://x/f1".to_string()], &[]).unwrap();

        let claimed = claim_pending_bouts(&conn, 10).unwrap();
        assert_eq!(claimed.len(), 1);
        let link = claimed[0].link.clone();

        let totals = vec![totals_row(&link, 1), totals_row(&link, 2)];
        let strikes = vec![strike_row(&link, 1), strike_row(&link, 2)];
        save_bout_details(&conn, &link, &totals, &strikes).unwrap();

        // Flag flipped, claim cleared, nothing left to claim.
        assert_eq!(count_scraped_bouts(&conn).unwrap(), 1);
        assert!(claim_pending_bouts(&conn, 10).unwrap().is_empty());
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.bouts_claimed, 0);
        assert_eq!(stats.total_rows, 2);
        assert_eq!(stats.strike_rows, 2);
    }

    #[test]
    fn bout_details_view_joins_outcome() {
        let conn = store();
        insert_events(&conn, &[event("0001", "http://x/e1")]).unwrap();
        let link = "http://x/f1".to_string();
        let results = vec![FightResultRow {
            bout_link: link.clone(),
            fighter_slot: 1,
            fighter_name: "Fighter 1".to_string(),
            outcome: Outcome::Win,
            knockdowns: 1,
            sig_landed: 12,
            sig_attempted: 34,
            td_landed: 2,
            td_attempted: 5,
            sub_attempts: 0,
            weight_class: "Light Heavyweight".to_string(),
            method: "KO/TKO".to_string(),
            round: 1,
            time_seconds: 194,
            event_title: "Event 0001".to_string(),
        }];
        save_event_details(&conn, "0001", std::slice::from_ref(&link), &results).unwrap();
        save_bout_details(&conn, &link, &[totals_row(&link, 1)], &[]).unwrap();

        let outcome: String = conn
            .query_row(
                "SELECT outcome FROM bout_details WHERE bout_link = ?1 AND fighter_slot = 1",
                rusqlite::params![link],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(outcome, "WIN");
    }
}
