//! Completed-events list template.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::{text_of, RawEvent};

static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr.b-statistics__table-row").unwrap());
static TITLE_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.b-link.b-link_style_black").unwrap());
static DATE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.b-statistics__date").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Read the event list. A row without a titled link is not a valid row
/// (the list page pads with empty spacer rows) and is dropped.
pub fn extract_events(doc: &Html) -> Vec<RawEvent> {
    doc.select(&ROW_SEL)
        .filter_map(|row| {
            let anchor = row.select(&TITLE_LINK_SEL).next()?;
            let title = text_of(anchor);
            if title.is_empty() {
                return None;
            }
            let link = anchor.value().attr("href")?.trim().to_string();
            let date = row.select(&DATE_SEL).next().map(text_of).unwrap_or_default();
            let location = row
                .select(&CELL_SEL)
                .nth(1)
                .map(text_of)
                .unwrap_or_default();
            Some(RawEvent {
                link,
                title,
                date,
                location,
            })
        })
        .collect()
}
