//! Per-template extractors.
//!
//! Each submodule maps one known page layout to tagged raw records. Every
//! field stays textual here; `normalize` owns the conversion to typed
//! values. Extraction failure for one record never aborts its siblings:
//! list extractors skip malformed rows, detail extractors fail their whole
//! record and nothing else.

pub mod bout_page;
pub mod event_page;
pub mod events;

use scraper::ElementRef;

use crate::normalize::Outcome;

/// One row of the completed-events list.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub link: String,
    pub title: String,
    pub date: String,
    pub location: String,
}

/// A child bout link found on an event page, in document order.
#[derive(Debug, Clone)]
pub struct RawBoutLink {
    pub link: String,
}

/// One fighter's half of an event-page summary row.
#[derive(Debug, Clone)]
pub struct RawFighterRow {
    pub bout_link: String,
    pub slot: u32,
    pub fighter_name: String,
    pub outcome: Outcome,
    pub knockdowns: String,
    pub sig_strikes: String,
    pub takedowns: String,
    pub sub_attempts: String,
    pub weight_class: String,
    pub method: String,
    pub round: String,
    pub time: String,
    pub event_title: String,
}

/// One fighter's half of a bout page's totals row.
#[derive(Debug, Clone)]
pub struct RawFighterStat {
    pub slot: u32,
    pub fighter_name: String,
    pub knockdowns: String,
    pub sig_strikes: String,
    pub sig_pct: String,
    pub total_strikes: String,
    pub takedowns: String,
    pub td_pct: String,
    pub sub_attempts: String,
    pub reversals: String,
    pub control: String,
    pub event_title: String,
}

/// One fighter's half of a bout page's strike-breakdown row.
#[derive(Debug, Clone)]
pub struct RawFighterStrikeStat {
    pub slot: u32,
    pub fighter_name: String,
    pub sig_strikes: String,
    pub sig_pct: String,
    pub head: String,
    pub body: String,
    pub leg: String,
    pub distance: String,
    pub clinch: String,
    pub ground: String,
    pub event_title: String,
}

/// Concatenated text of an element with whitespace collapsed.
pub(crate) fn text_of(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ──
