//! Event-detail template: child bout links plus the per-bout summary table.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{text_of, RawBoutLink, RawFighterRow};
use crate::normalize::Outcome;

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.b-content__title-highlight").unwrap());
static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr.b-fight-details__table-row").unwrap());
static BOUT_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="fight-details"]"#).unwrap());
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.b-fight-details__table-col").unwrap());
static P_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());

/// All child bout links, document order, deduplicated.
pub fn extract_bout_links(doc: &Html) -> Vec<RawBoutLink> {
    let mut seen = HashSet::new();
    doc.select(&BOUT_LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| seen.insert(href.clone()))
        .map(|link| RawBoutLink { link })
        .collect()
}

/// Per-bout summary rows, two fighter records per bout. The first cell
/// carries the win flags; an "NC" marker there overrides both outcomes.
/// Otherwise the first-listed fighter is the winner. Malformed rows are
/// skipped so one bad bout never loses its siblings.
pub fn extract_event_rows(doc: &Html) -> Vec<RawFighterRow> {
    let event_title = doc.select(&TITLE_SEL).next().map(text_of).unwrap_or_default();
    let mut out = Vec::new();

    for row in doc.select(&ROW_SEL) {
        let cells: Vec<ElementRef> = row.select(&CELL_SEL).collect();
        if cells.len() < 10 {
            continue; // header and spacer rows
        }
        let Some(bout_link) = row_link(row) else {
            debug!("summary row without a bout link, skipping");
            continue;
        };

        let is_nc = text_of(cells[0]).contains("NC");
        let Some(names) = pair(cells[1]) else {
            debug!(link = %bout_link, "summary row without two fighter names, skipping");
            continue;
        };
        let (Some(kd), Some(strikes), Some(takedowns), Some(subs)) =
            (pair(cells[2]), pair(cells[3]), pair(cells[4]), pair(cells[5]))
        else {
            debug!(link = %bout_link, "summary row with missing stat cells, skipping");
            continue;
        };

        let weight_class = first_p(cells[6]);
        let method = first_p(cells[7]);
        let round = first_p(cells[8]);
        let time = first_p(cells[9]);

        for slot in 0..2usize {
            let outcome = match (is_nc, slot) {
                (true, _) => Outcome::NoContest,
                (false, 0) => Outcome::Win,
                (false, _) => Outcome::Loss,
            };
            out.push(RawFighterRow {
                bout_link: bout_link.clone(),
                slot: slot as u32 + 1,
                fighter_name: names[slot].clone(),
                outcome,
                knockdowns: kd[slot].clone(),
                sig_strikes: strikes[slot].clone(),
                takedowns: takedowns[slot].clone(),
                sub_attempts: subs[slot].clone(),
                weight_class: weight_class.clone(),
                method: method.clone(),
                round: round.clone(),
                time: time.clone(),
                event_title: event_title.clone(),
            });
        }
    }

    out
}

fn row_link(row: ElementRef) -> Option<String> {
    row.select(&BOUT_LINK_SEL)
        .next()
        .and_then(|a| a.value().attr("href"))
        .or_else(|| row.value().attr("data-link"))
        .map(|s| s.trim().to_string())
}

/// The two per-fighter paragraph texts of a summary cell.
fn pair(cell: ElementRef) -> Option<[String; 2]> {
    let mut texts = cell.select(&P_SEL).map(text_of);
    let first = texts.next()?;
    let second = texts.next()?;
    Some([first, second])
}

fn first_p(cell: ElementRef) -> String {
    cell.select(&P_SEL).next().map(text_of).unwrap_or_default()
}
