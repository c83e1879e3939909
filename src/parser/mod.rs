//! Match-report extraction.
//!
//! [`extract`] turns one FBref match page into a [`ParsedMatch`]. Every
//! field is read by an independent rule that yields `None` when its anchor
//! is missing, so a page with a truncated stat box still produces a record.
//! Only pages that are not match reports at all are rejected.

mod players;
mod scorebox;
mod team_stats;
mod text;

use scraper::Html;
use tracing::debug;

use crate::error::ScraperError;
use crate::types::{MatchRecord, Outcome, ParsedMatch};

pub use text::{decimal_to_count, normalize_key, parse_count, parse_decimal, parse_of, parse_pct};

/// FBref ships most stat tables inside HTML comments.
fn uncomment(markup: &str) -> String {
    markup.replace("<!--", "").replace("-->", "")
}

fn page_title(doc: &Html) -> String {
    text::select_text(doc.root_element(), "title")
        .unwrap_or_default()
        .to_lowercase()
}

/// Reject interstitials that slipped past the fetcher.
fn check_title(title: &str) -> Result<(), ScraperError> {
    let reason = if title.contains("just a moment") {
        "challenge page"
    } else if title.contains("429") || title.contains("too many requests") {
        "rate limit page"
    } else if title.contains("404") || title.contains("page not found") {
        "not found page"
    } else {
        return Ok(());
    };
    Err(ScraperError::MalformedPage(format!("{} ({})", reason, title)))
}

/// Parse one match report page.
pub fn extract(url: &str, markup: &str) -> Result<ParsedMatch, ScraperError> {
    let doc = Html::parse_document(&uncomment(markup));
    check_title(&page_title(&doc))?;

    let score_box = scorebox::find_scorebox(&doc)
        .ok_or_else(|| ScraperError::MalformedPage(format!("no score box on {}", url)))?;
    let blocks = scorebox::team_blocks(&doc, score_box)
        .ok_or_else(|| ScraperError::MissingField("team blocks".to_string()))?;

    let mut record = MatchRecord::new(url);
    scorebox::apply_teams(blocks, &mut record);
    scorebox::apply_meta(&doc, &mut record);
    team_stats::apply_team_stats(&doc, &mut record);
    team_stats::apply_extra_stats(&doc, &mut record);
    team_stats::derive_totals(&mut record);

    record.outcome = match (record.home.goals, record.away.goals) {
        (Some(home), Some(away)) => Some(Outcome::from_goals(home, away)),
        _ => None,
    };
    record.extra_tables = players::extract_extra_tables(&doc);

    let tables = players::extract_tables(&doc);
    debug!(
        "Extracted {} ({} non-empty tables)",
        record.headline(),
        tables.iter().filter(|t| !t.is_empty()).count()
    );

    Ok(ParsedMatch { record, tables })
}
