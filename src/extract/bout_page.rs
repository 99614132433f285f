//! Bout-detail template: the fight totals row and the strike-breakdown row.
//!
//! Both tables pair the two fighters positionally, one `<p>` per fighter
//! inside each cell, in template-known column order. A structurally absent
//! field fails the whole record; partial detail rows are never emitted.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::{text_of, RawFighterStat, RawFighterStrikeStat};
use crate::error::HarvestError;

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2 a").unwrap());
static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr.b-fight-details__table-row").unwrap());
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.b-fight-details__table-col").unwrap());
static P_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());
// The strike-breakdown table is the only one sitting directly under the
// page body column; the totals table is nested one section deeper.
static STRIKE_ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body > section > div > div > table > tbody > tr").unwrap());
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Totals table column order.
const TOTALS_COLUMNS: usize = 10;
/// Strike-breakdown table column order.
const STRIKE_COLUMNS: usize = 9;

pub fn extract_bout_detail(doc: &Html) -> Result<[RawFighterStat; 2], HarvestError> {
    let event_title = event_title(doc)?;

    // Row 0 is the header row; row 1 carries both fighters' totals.
    let row = doc
        .select(&ROW_SEL)
        .nth(1)
        .ok_or(HarvestError::StructuralMismatch("totals row"))?;
    let pairs = cell_pairs(row, &CELL_SEL, TOTALS_COLUMNS, "totals cell")?;

    let stat = |slot: usize| RawFighterStat {
        slot: slot as u32 + 1,
        fighter_name: pairs[0][slot].clone(),
        knockdowns: pairs[1][slot].clone(),
        sig_strikes: pairs[2][slot].clone(),
        sig_pct: pairs[3][slot].clone(),
        total_strikes: pairs[4][slot].clone(),
        takedowns: pairs[5][slot].clone(),
        td_pct: pairs[6][slot].clone(),
        sub_attempts: pairs[7][slot].clone(),
        reversals: pairs[8][slot].clone(),
        control: pairs[9][slot].clone(),
        event_title: event_title.clone(),
    };
    Ok([stat(0), stat(1)])
}

pub fn extract_strike_breakdown(doc: &Html) -> Result<[RawFighterStrikeStat; 2], HarvestError> {
    let event_title = event_title(doc)?;

    let row = doc
        .select(&STRIKE_ROW_SEL)
        .find(|r| r.select(&TD_SEL).next().is_some())
        .ok_or(HarvestError::StructuralMismatch("strike breakdown row"))?;
    let pairs = cell_pairs(row, &TD_SEL, STRIKE_COLUMNS, "strike breakdown cell")?;

    let stat = |slot: usize| RawFighterStrikeStat {
        slot: slot as u32 + 1,
        fighter_name: pairs[0][slot].clone(),
        sig_strikes: pairs[1][slot].clone(),
        sig_pct: pairs[2][slot].clone(),
        head: pairs[3][slot].clone(),
        body: pairs[4][slot].clone(),
        leg: pairs[5][slot].clone(),
        distance: pairs[6][slot].clone(),
        clinch: pairs[7][slot].clone(),
        ground: pairs[8][slot].clone(),
        event_title: event_title.clone(),
    };
    Ok([stat(0), stat(1)])
}

fn event_title(doc: &Html) -> Result<String, HarvestError> {
    doc.select(&TITLE_SEL)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .ok_or(HarvestError::StructuralMismatch("event title"))
}

/// Split every cell of `row` into its two per-fighter paragraph texts,
/// requiring exactly `columns` cells each holding at least two paragraphs.
fn cell_pairs(
    row: ElementRef,
    cell_sel: &Selector,
    columns: usize,
    what: &'static str,
) -> Result<Vec<[String; 2]>, HarvestError> {
    let cells: Vec<ElementRef> = row.select(cell_sel).collect();
    if cells.len() != columns {
        return Err(HarvestError::StructuralMismatch(what));
    }
    cells
        .into_iter()
        .map(|cell| {
            let mut texts = cell.select(&P_SEL).map(text_of);
            match (texts.next(), texts.next()) {
                (Some(first), Some(second)) => Ok([first, second]),
                _ => Err(HarvestError::StructuralMismatch(what)),
            }
        })
        .collect()
}
