//! Textual field normalization: composite "X OF Y" cells, clock durations,
//! percentages, dates (textual or spreadsheet-serial) and event id
//! assignment.
//!
//! All parse functions are total: malformed input falls back to zero rather
//! than failing. The lossy fallbacks are deliberate, so `ParseTally` counts
//! them per pass; a spike means template drift, not a sudden run of zeros.

use std::sync::LazyLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;

use crate::db::{FightResultRow, FightTotalsRow, StrikeRow};
use crate::extract::{RawEvent, RawFighterRow, RawFighterStat, RawFighterStrikeStat};

static FRACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(\d+)\s+of\s+(\d+)\s*$").unwrap());
static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*%?\s*$").unwrap());

/// Day-count epoch used by spreadsheet-serial dates.
fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap()
}

/// Bout outcome for one fighter. First-listed wins unless the bout is a
/// no contest, which overrides both slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
    NoContest,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
            Outcome::NoContest => "NO_CONTEST",
        }
    }
}

// ── Fallible parsers ──

pub fn try_parse_fraction(s: &str) -> Option<(u32, u32)> {
    let caps = FRACTION_RE.captures(s)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

pub fn try_parse_duration(s: &str) -> Option<u32> {
    let (minutes, seconds) = s.trim().split_once(':')?;
    let minutes: u32 = minutes.trim().parse().ok()?;
    let seconds: u32 = seconds.trim().parse().ok()?;
    (seconds < 60).then_some(minutes * 60 + seconds)
}

pub fn try_parse_percent(s: &str) -> Option<u32> {
    PERCENT_RE.captures(s)?[1].parse().ok()
}

/// Either the site's textual form ("April 13, 2024") or a day count
/// relative to the 1899-12-30 epoch, as produced by spreadsheet exports.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%B %d, %Y") {
        return Some(d);
    }
    if let Ok(days) = t.parse::<i64>() {
        return serial_epoch().checked_add_signed(Duration::days(days));
    }
    if let Ok(days) = t.parse::<f64>() {
        return serial_epoch().checked_add_signed(Duration::days(days as i64));
    }
    None
}

// ── Total parsers (zero on any malformed input) ──

pub fn parse_fraction(s: &str) -> (u32, u32) {
    try_parse_fraction(s).unwrap_or((0, 0))
}

pub fn parse_duration(s: &str) -> u32 {
    try_parse_duration(s).unwrap_or(0)
}

pub fn parse_percent(s: &str) -> u32 {
    try_parse_percent(s).unwrap_or(0)
}

// ── Fallback accounting ──

/// Per-pass counter of lossy fallbacks. The zero defaults are kept for
/// compatibility with downstream consumers, but every time one fires it is
/// recorded here and reported at the end of the pass.
#[derive(Debug, Default)]
pub struct ParseTally {
    fallbacks: usize,
}

impl ParseTally {
    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }

    pub fn fraction(&mut self, s: &str) -> (u32, u32) {
        if try_parse_fraction(s).is_none() {
            self.fallbacks += 1;
        }
        parse_fraction(s)
    }

    pub fn duration(&mut self, s: &str) -> u32 {
        if try_parse_duration(s).is_none() {
            self.fallbacks += 1;
        }
        parse_duration(s)
    }

    pub fn percent(&mut self, s: &str) -> u32 {
        if try_parse_percent(s).is_none() {
            self.fallbacks += 1;
        }
        parse_percent(s)
    }

    pub fn int(&mut self, s: &str) -> u32 {
        s.trim().parse().unwrap_or_else(|_| {
            self.fallbacks += 1;
            0
        })
    }

    pub fn date(&mut self, s: &str) -> NaiveDate {
        parse_date(s).unwrap_or_else(|| {
            self.fallbacks += 1;
            serial_epoch()
        })
    }
}

// ── Event id assignment ──

/// An event after date normalization, before id assignment.
#[derive(Debug, Clone)]
pub struct DiscoveredEvent {
    pub link: String,
    pub title: String,
    pub date: NaiveDate,
    pub location: String,
}

/// A fully-identified event ready for persistence.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event_id: String,
    pub link: String,
    pub title: String,
    pub date: NaiveDate,
    pub location: String,
}

pub fn event(raw: RawEvent, tally: &mut ParseTally) -> DiscoveredEvent {
    DiscoveredEvent {
        date: tally.date(&raw.date),
        link: raw.link,
        title: raw.title,
        location: raw.location,
    }
}

pub fn format_event_id(ordinal: u32) -> String {
    format!("{:04}", ordinal)
}

/// Sort by date descending and number from the bottom up: the oldest event
/// gets "0001", the most recent gets the highest id. External consumers key
/// on this exact ordering.
pub fn assign_event_ids(mut events: Vec<DiscoveredEvent>) -> Vec<EventRecord> {
    events.sort_by(|a, b| b.date.cmp(&a.date));
    let total = events.len() as u32;
    events
        .into_iter()
        .enumerate()
        .map(|(i, e)| EventRecord {
            event_id: format_event_id(total - i as u32),
            link: e.link,
            title: e.title,
            date: e.date,
            location: e.location,
        })
        .collect()
}

// ── Raw record → persisted row ──

pub fn fighter_result(raw: RawFighterRow, tally: &mut ParseTally) -> FightResultRow {
    let (sig_landed, sig_attempted) = tally.fraction(&raw.sig_strikes);
    let (td_landed, td_attempted) = tally.fraction(&raw.takedowns);
    FightResultRow {
        knockdowns: tally.int(&raw.knockdowns),
        sub_attempts: tally.int(&raw.sub_attempts),
        round: tally.int(&raw.round),
        time_seconds: tally.duration(&raw.time),
        sig_landed,
        sig_attempted,
        td_landed,
        td_attempted,
        bout_link: raw.bout_link,
        fighter_slot: raw.slot,
        fighter_name: raw.fighter_name,
        outcome: raw.outcome,
        weight_class: raw.weight_class,
        method: raw.method,
        event_title: raw.event_title,
    }
}

pub fn fighter_totals(
    bout_link: &str,
    raw: RawFighterStat,
    tally: &mut ParseTally,
) -> FightTotalsRow {
    let (sig_landed, sig_attempted) = tally.fraction(&raw.sig_strikes);
    let (total_landed, total_attempted) = tally.fraction(&raw.total_strikes);
    let (td_landed, td_attempted) = tally.fraction(&raw.takedowns);
    FightTotalsRow {
        knockdowns: tally.int(&raw.knockdowns),
        sig_pct: tally.percent(&raw.sig_pct),
        td_pct: tally.percent(&raw.td_pct),
        sub_attempts: tally.int(&raw.sub_attempts),
        reversals: tally.int(&raw.reversals),
        control_seconds: tally.duration(&raw.control),
        sig_landed,
        sig_attempted,
        total_landed,
        total_attempted,
        td_landed,
        td_attempted,
        bout_link: bout_link.to_string(),
        fighter_slot: raw.slot,
        fighter_name: raw.fighter_name,
        event_title: raw.event_title,
    }
}

pub fn strike_breakdown(
    bout_link: &str,
    raw: RawFighterStrikeStat,
    tally: &mut ParseTally,
) -> StrikeRow {
    let (sig_landed, sig_attempted) = tally.fraction(&raw.sig_strikes);
    let (head_landed, head_attempted) = tally.fraction(&raw.head);
    let (body_landed, body_attempted) = tally.fraction(&raw.body);
    let (leg_landed, leg_attempted) = tally.fraction(&raw.leg);
    let (distance_landed, distance_attempted) = tally.fraction(&raw.distance);
    let (clinch_landed, clinch_attempted) = tally.fraction(&raw.clinch);
    let (ground_landed, ground_attempted) = tally.fraction(&raw.ground);
    StrikeRow {
        sig_pct: tally.percent(&raw.sig_pct),
        sig_landed,
        sig_attempted,
        head_landed,
        head_attempted,
        body_landed,
        body_attempted,
        leg_landed,
        leg_attempted,
        distance_landed,
        distance_attempted,
        clinch_landed,
        clinch_attempted,
        ground_landed,
        ground_attempted,
        bout_link: bout_link.to_string(),
        fighter_slot: raw.slot,
        fighter_name: raw.fighter_name,
        event_title: raw.event_title,
    }
}

// ── Tests ──
