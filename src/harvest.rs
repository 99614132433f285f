//! Pass orchestration.
//!
//! Two resumable passes share the store: `discover` refreshes the event and
//! bout sets (and records per-fighter results from each event page), and
//! `fill_details` drains bouts whose detail pages have not been harvested.
//! Per-record failures are logged and skipped; only persistence failures
//! abort a pass. Flags flip in the same transaction as the rows they cover,
//! so an interrupt at any point leaves a correct resume point.

use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use scraper::Html;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::db::{self, FightResultRow};
use crate::error::HarvestError;
use crate::extract::{self, RawFighterStat, RawFighterStrikeStat};
use crate::fetch::Session;
use crate::normalize::{self, DiscoveredEvent, EventRecord, ParseTally};

const EVENTS_URL: &str = "http://ufcstats.com/statistics/events/completed?page=all";
const EVENT_LIST_ANCHOR: &str = "a.b-link.b-link_style_black";
const EVENT_PAGE_ANCHOR: &str = "tr.b-fight-details__table-row";
const BOUT_PAGE_ANCHOR: &str = "tr.b-fight-details__table-row";

/// Concurrent fetches in the detail pass. Each worker is an independent
/// browsing session as far as the remote is concerned; all writes still
/// funnel through the single store connection.
const CONCURRENCY: usize = 8;

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

// ── Discovery + event-details pass ──

#[derive(Debug, Default)]
pub struct DiscoverStats {
    pub new_events: usize,
    pub events_processed: usize,
    pub events_failed: usize,
    pub new_bouts: usize,
    pub fallbacks: usize,
}

pub async fn discover(conn: &Connection, limit: Option<usize>) -> Result<DiscoverStats> {
    let session = Session::new()?;
    let mut tally = ParseTally::default();

    info!(url = EVENTS_URL, "fetching completed events list");
    let html = session.load(EVENTS_URL, EVENT_LIST_ANCHOR).await?;
    let raw_events = {
        let doc = Html::parse_document(&html);
        extract::events::extract_events(&doc)
    };
    info!("events on list page: {}", raw_events.len());

    let discovered: Vec<DiscoveredEvent> = raw_events
        .into_iter()
        .map(|e| normalize::event(e, &mut tally))
        .collect();
    let records = identify_new_events(conn, discovered)?;
    let new_events = db::insert_events(conn, &records)?;

    let mut stats = DiscoverStats {
        new_events,
        ..Default::default()
    };

    let pending = db::fetch_unscraped_events(conn, limit)?;
    if pending.is_empty() {
        stats.fallbacks = tally.fallbacks();
        return Ok(stats);
    }

    info!("harvesting {} event pages", pending.len());
    let pb = progress_bar(pending.len())?;
    for event in &pending {
        match harvest_event(&session, conn, event, &mut tally).await {
            Ok(new_bouts) => {
                stats.events_processed += 1;
                stats.new_bouts += new_bouts;
            }
            Err(e) if e.is_record_scoped() => {
                warn!(link = %event.link, error = %e, "event page failed, continuing");
                stats.events_failed += 1;
            }
            Err(e) => return Err(e.into()),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    stats.fallbacks = tally.fallbacks();
    Ok(stats)
}

/// Filter the discovered set down to unknown links and assign their ids.
/// On a first run the whole set is numbered at once; afterwards known
/// events keep their ids and new ones extend the numbering above the
/// current maximum, oldest first.
fn identify_new_events(
    conn: &Connection,
    discovered: Vec<DiscoveredEvent>,
) -> Result<Vec<EventRecord>, HarvestError> {
    let known = db::event_links(conn)?;
    let mut fresh: Vec<DiscoveredEvent> = discovered
        .into_iter()
        .filter(|e| !known.contains(&e.link))
        .collect();

    if known.is_empty() {
        return Ok(normalize::assign_event_ids(fresh));
    }

    let base = db::max_event_ordinal(conn)?;
    fresh.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(fresh
        .into_iter()
        .enumerate()
        .map(|(i, e)| EventRecord {
            event_id: normalize::format_event_id(base + 1 + i as u32),
            link: e.link,
            title: e.title,
            date: e.date,
            location: e.location,
        })
        .collect())
}

/// One event page: enumerate its bouts and record the per-fighter result
/// rows, then flip the event's flag, all in one transaction.
async fn harvest_event(
    session: &Session,
    conn: &Connection,
    event: &db::PendingEvent,
    tally: &mut ParseTally,
) -> Result<usize, HarvestError> {
    debug!(title = %event.title, link = %event.link, "harvesting event page");
    let html = session.load(&event.link, EVENT_PAGE_ANCHOR).await?;
    let (bout_links, raw_rows) = {
        let doc = Html::parse_document(&html);
        (
            extract::event_page::extract_bout_links(&doc),
            extract::event_page::extract_event_rows(&doc),
        )
    };
    let bout_links: Vec<String> = bout_links.into_iter().map(|l| l.link).collect();
    let results: Vec<FightResultRow> = raw_rows
        .into_iter()
        .map(|r| normalize::fighter_result(r, tally))
        .collect();
    Ok(db::save_event_details(
        conn,
        &event.event_id,
        &bout_links,
        &results,
    )?)
}

// ── Bout-details pass ──

#[derive(Debug, Default)]
pub struct PassReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub fallbacks: usize,
}

struct BoutExtract {
    totals: [RawFighterStat; 2],
    strikes: [RawFighterStrikeStat; 2],
}

struct BoutOutcome {
    link: String,
    result: Result<BoutExtract, HarvestError>,
}

pub async fn fill_details(conn: &Connection, batch: usize) -> Result<PassReport> {
    let session = Arc::new(Session::new()?);

    db::release_stale_claims(conn)?;
    let mut report = PassReport {
        skipped: db::count_scraped_bouts(conn)?,
        ..Default::default()
    };
    let mut tally = ParseTally::default();
    let mut failed_links: Vec<String> = Vec::new();

    loop {
        let claimed = db::claim_pending_bouts(conn, batch)?;
        if claimed.is_empty() {
            break;
        }
        info!("processing batch of {} bouts", claimed.len());
        let pb = progress_bar(claimed.len())?;

        let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
        let (tx, mut rx) = mpsc::channel::<BoutOutcome>(CONCURRENCY * 2);

        for bout in claimed {
            let session = Arc::clone(&session);
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();
            tokio::spawn(async move {
                let _permit = sem.acquire().await.unwrap();
                let result = match session.load(&bout.link, BOUT_PAGE_ANCHOR).await {
                    Ok(html) => extract_bout(&html),
                    Err(e) => Err(e),
                };
                let _ = tx
                    .send(BoutOutcome {
                        link: bout.link,
                        result,
                    })
                    .await;
            });
        }
        // Drop our copy of tx so rx closes when all workers finish.
        drop(tx);

        while let Some(outcome) = rx.recv().await {
            let link = outcome.link.clone();
            if apply_bout_outcome(conn, &mut tally, outcome)? {
                report.succeeded += 1;
            } else {
                report.failed += 1;
                failed_links.push(link);
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
    }

    // Failed records keep detail_scraped = 0. Their claims are handed back
    // only now, at pass end, so the claim loop above does not spin on them;
    // the next invocation retries them.
    for link in &failed_links {
        db::release_claim(conn, link)?;
    }

    report.fallbacks = tally.fallbacks();
    Ok(report)
}

/// The bout page carries both the totals table and the strike-breakdown
/// table, so one fetch serves both extractors.
fn extract_bout(html: &str) -> Result<BoutExtract, HarvestError> {
    let doc = Html::parse_document(html);
    Ok(BoutExtract {
        totals: extract::bout_page::extract_bout_detail(&doc)?,
        strikes: extract::bout_page::extract_strike_breakdown(&doc)?,
    })
}

/// Persist one bout's outcome. Returns `Ok(true)` when the record was
/// persisted and flagged, `Ok(false)` for a record-scoped failure (logged,
/// record left unflagged), and `Err` only for escalations that must abort
/// the pass.
fn apply_bout_outcome(
    conn: &Connection,
    tally: &mut ParseTally,
    outcome: BoutOutcome,
) -> Result<bool, HarvestError> {
    match outcome.result {
        Ok(bout) => {
            let totals = bout
                .totals
                .map(|raw| normalize::fighter_totals(&outcome.link, raw, tally));
            let strikes = bout
                .strikes
                .map(|raw| normalize::strike_breakdown(&outcome.link, raw, tally));
            db::save_bout_details(conn, &outcome.link, &totals, &strikes)?;
            Ok(true)
        }
        Err(e) if e.is_record_scoped() => {
            warn!(link = %outcome.link, error = %e, "bout details failed, will retry next pass");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store_with_bouts(links: &[&str]) -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory store");
        db::init_schema(&conn).expect("schema");
        db::insert_events(
            &conn,
            &[EventRecord {
                event_id: "0001".to_string(),
                link: "http://x/e1".to_string(),
                title: "Event 0001".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 4, 13).unwrap(),
                location: String::new(),
            }],
        )
        .unwrap();
        let bout_links: Vec<String> = links.iter().map(|l| l.to_string()).collect();
        db::save_event_details(&conn, "0001", &bout_links, &[]).unwrap();
        conn
    }

    fn raw_stat(slot: u32) -> RawFighterStat {
        RawFighterStat {
            slot,
            fighter_name: format!("Fighter {}", slot),
            knockdowns: "1".to_string(),
            sig_strikes: "12 of 34".to_string(),
            sig_pct: "35%".to_string(),
            total_strikes: "40 of 70".to_string(),
            takedowns: "2 of 5".to_string(),
            td_pct: "40%".to_string(),
            sub_attempts: "0".to_string(),
            reversals: "0".to_string(),
            control: "1:35".to_string(),
            event_title: "Event 0001".to_string(),
        }
    }

    fn raw_strikes(slot: u32) -> RawFighterStrikeStat {
        RawFighterStrikeStat {
            slot,
            fighter_name: format!("Fighter {}", slot),
            sig_strikes: "12 of 34".to_string(),
            sig_pct: "35%".to_string(),
            head: "8 of 24".to_string(),
            body: "2 of 5".to_string(),
            leg: "2 of 5".to_string(),
            distance: "10 of 30".to_string(),
            clinch: "2 of 4".to_string(),
            ground: "0 of 0".to_string(),
            event_title: "Event 0001".to_string(),
        }
    }

    fn ok_outcome(link: &str) -> BoutOutcome {
        BoutOutcome {
            link: link.to_string(),
            result: Ok(BoutExtract {
                totals: [raw_stat(1), raw_stat(2)],
                strikes: [raw_strikes(1), raw_strikes(2)],
            }),
        }
    }

    fn failed_outcome(link: &str) -> BoutOutcome {
        BoutOutcome {
            link: link.to_string(),
            result: Err(HarvestError::StructuralMismatch("totals row")),
        }
    }

    #[test]
    fn partial_failure_is_isolated() {
        let links = ["http://x/f1", "http://x/f2", "http://x/f3", "http://x/f4", "http://x/f5"];
        let conn = store_with_bouts(&links);
        let claimed = db::claim_pending_bouts(&conn, 10).unwrap();
        assert_eq!(claimed.len(), 5);

        let mut tally = ParseTally::default();
        let mut failed = Vec::new();
        for (i, bout) in claimed.iter().enumerate() {
            let outcome = if i == 2 {
                failed_outcome(&bout.link)
            } else {
                ok_outcome(&bout.link)
            };
            if !apply_bout_outcome(&conn, &mut tally, outcome).unwrap() {
                failed.push(bout.link.clone());
            }
        }
        assert_eq!(failed, vec!["http://x/f3".to_string()]);
        for link in &failed {
            db::release_claim(&conn, link).unwrap();
        }

        // Records 1, 2, 4, 5 persisted and flagged; record 3 untouched and
        // claimable again.
        assert_eq!(db::count_scraped_bouts(&conn).unwrap(), 4);
        let remaining = db::claim_pending_bouts(&conn, 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].link, "http://x/f3");
        let stats = db::get_stats(&conn).unwrap();
        assert_eq!(stats.total_rows, 8);
        assert_eq!(stats.strike_rows, 8);
    }

    #[test]
    fn second_pass_selects_nothing_after_success() {
        let conn = store_with_bouts(&["http://x/f1", "http://x/f2"]);
        let claimed = db::claim_pending_bouts(&conn, 10).unwrap();

        let mut tally = ParseTally::default();
        for bout in &claimed {
            assert!(apply_bout_outcome(&conn, &mut tally, ok_outcome(&bout.link)).unwrap());
        }
        assert_eq!(tally.fallbacks(), 0);

        // The whole pass again: nothing left to claim, store unchanged.
        db::release_stale_claims(&conn).unwrap();
        assert!(db::claim_pending_bouts(&conn, 10).unwrap().is_empty());
        let stats = db::get_stats(&conn).unwrap();
        assert_eq!(stats.bouts_scraped, 2);
        assert_eq!(stats.total_rows, 4);
    }

    #[test]
    fn normalized_rows_carry_typed_values() {
        let conn = store_with_bouts(&["http://x/f1"]);
        db::claim_pending_bouts(&conn, 10).unwrap();
        let mut tally = ParseTally::default();
        apply_bout_outcome(&conn, &mut tally, ok_outcome("http://x/f1")).unwrap();

        let (sig_landed, control): (u32, u32) = conn
            .query_row(
                "SELECT sig_landed, control_seconds FROM fight_totals
                 WHERE bout_link = 'http://x/f1' AND fighter_slot = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(sig_landed, 12);
        assert_eq!(control, 95);
    }

    #[test]
    fn stable_ids_extend_above_existing_maximum() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let date = |d: u32| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let discovered = |link: &str, d: u32| DiscoveredEvent {
            link: link.to_string(),
            title: link.to_string(),
            date: date(d),
            location: String::new(),
        };

        // First discovery: full-set assignment.
        let initial = identify_new_events(
            &conn,
            vec![discovered("http://x/e2", 2), discovered("http://x/e1", 1)],
        )
        .unwrap();
        db::insert_events(&conn, &initial).unwrap();
        assert_eq!(db::max_event_ordinal(&conn).unwrap(), 2);

        // Re-discovery with one new event: known ids untouched, the new
        // event numbered above the maximum.
        let next = identify_new_events(
            &conn,
            vec![
                discovered("http://x/e3", 3),
                discovered("http://x/e2", 2),
                discovered("http://x/e1", 1),
            ],
        )
        .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].event_id, "0003");
        assert_eq!(next[0].link, "http://x/e3");
    }
}
