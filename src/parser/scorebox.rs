//! Score box: team names, goals, xG, staff, and match metadata.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html};

use super::text::{capture, capture2, parse_count, parse_decimal, sel, select_text, text_of};
use crate::types::{MatchRecord, Side, TeamStats};

/// The page-level anchor. Absent means the page is not a match report.
pub(super) fn find_scorebox(doc: &Html) -> Option<ElementRef<'_>> {
    let selector = sel("div.scorebox")?;
    doc.select(&selector).next()
}

fn blocks_by_id(doc: &Html) -> Option<[ElementRef<'_>; 2]> {
    let home = sel("#sb_team_0")?;
    let away = sel("#sb_team_1")?;
    Some([doc.select(&home).next()?, doc.select(&away).next()?])
}

/// First and last direct child `div` that is not the meta block.
fn blocks_by_shape(scorebox: ElementRef<'_>) -> Option<[ElementRef<'_>; 2]> {
    let teams: Vec<ElementRef> = scorebox
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "div")
        .filter(|el| !el.value().classes().any(|c| c == "scorebox_meta"))
        .collect();
    if teams.len() < 2 {
        return None;
    }
    Some([teams[0], teams[teams.len() - 1]])
}

pub(super) fn team_blocks<'a>(doc: &'a Html, scorebox: ElementRef<'a>) -> Option<[ElementRef<'a>; 2]> {
    blocks_by_id(doc).or_else(|| blocks_by_shape(scorebox))
}

fn team_name(block: ElementRef) -> Option<String> {
    select_text(block, "strong a").or_else(|| select_text(block, "strong"))
}

/// `"Manager: Erik ten Hag"` -> `"Erik ten Hag"`
fn datapoint(block: ElementRef, label: &str) -> Option<String> {
    let selector = sel("div.datapoint")?;
    block
        .select(&selector)
        .map(text_of)
        .find(|t| t.contains(label))
        .map(|t| {
            t.replacen(label, "", 1)
                .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
                .trim()
                .to_string()
        })
        .filter(|t| !t.is_empty())
}

pub(super) fn team_line(block: ElementRef) -> TeamStats {
    TeamStats {
        team: team_name(block),
        goals: select_text(block, "div.score").and_then(|t| parse_count(&t)),
        xg: select_text(block, "div.score_xg").and_then(|t| parse_decimal(&t)),
        manager: datapoint(block, "Manager"),
        captain: datapoint(block, "Captain"),
        ..TeamStats::default()
    }
}

fn venue_time_attr(meta: ElementRef) -> Option<String> {
    let selector = sel("span.venuetime")?;
    meta.select(&selector)
        .next()?
        .value()
        .attr("data-venue-time")
        .map(str::to_string)
        .filter(|t| !t.is_empty())
}

fn time_in_text(text: &str) -> Option<String> {
    static TIME: OnceLock<Regex> = OnceLock::new();
    capture(&TIME, r"(\d{1,2}:\d{2})", text)
}

fn kickoff_time(meta: ElementRef, meta_text: &str) -> Option<String> {
    venue_time_attr(meta)
        .or_else(|| select_text(meta, "span.venuetime").and_then(|t| time_in_text(&t)))
        .or_else(|| time_in_text(meta_text))
}

fn match_date(meta: ElementRef) -> Option<String> {
    select_text(meta, r#"a[href*="/matches/20"]"#).or_else(|| {
        let selector = sel("span.venuetime")?;
        meta.select(&selector)
            .next()?
            .value()
            .attr("data-venue-date")
            .map(str::to_string)
    })
}

/// `"2023-2024 Premier League"` -> season and competition.
fn competition_and_season(meta: ElementRef) -> (Option<String>, Option<String>) {
    static COMP: OnceLock<Regex> = OnceLock::new();
    let Some(full) = select_text(meta, r#"a[href*="/comps/"]"#)
        .or_else(|| select_text(meta, r#"a[href*="/seasons/"]"#))
    else {
        return (None, None);
    };
    match capture2(&COMP, r"^(\d{4}(?:-\d{4})?)\s+(.+)$", &full) {
        Some((season, competition)) => (Some(competition), Some(season)),
        None => (Some(full), None),
    }
}

fn round(meta_text: &str) -> Option<String> {
    static ROUND: OnceLock<Regex> = OnceLock::new();
    capture(
        &ROUND,
        r"(?i)\((Matchweek \d+|Round of \d+|Quarter-finals|Semi-finals|Final|Group Stage|League phase|Knockout round play-offs)\)",
        meta_text,
    )
}

fn venue(meta_text: &str) -> Option<String> {
    static VENUE: OnceLock<Regex> = OnceLock::new();
    capture(&VENUE, r"Venue\s*:\s*(.+?)\s*(?:Attendance|Officials|$)", meta_text)
        .map(|v| v.trim_end_matches(',').trim().to_string())
        .filter(|v| !v.is_empty())
}

fn attendance(meta_text: &str) -> Option<u32> {
    static ATTENDANCE: OnceLock<Regex> = OnceLock::new();
    capture(&ATTENDANCE, r"Attendance\s*:\s*([\d,]+)", meta_text).and_then(|t| parse_count(&t))
}

fn referee(meta_text: &str) -> Option<String> {
    static REFEREE: OnceLock<Regex> = OnceLock::new();
    capture(&REFEREE, r"Officials?\s*:\s*([^(·]+?)\s*\(Referee\)", meta_text)
}

/// Fill the metadata fields from `div.scorebox_meta`, when present.
pub(super) fn apply_meta(doc: &Html, record: &mut MatchRecord) {
    let Some(meta) = sel("div.scorebox_meta").and_then(|s| doc.select(&s).next()) else {
        return;
    };
    let meta_text = text_of(meta);

    record.date = match_date(meta);
    record.time = kickoff_time(meta, &meta_text);
    let (competition, season) = competition_and_season(meta);
    record.competition = competition;
    record.season = season;
    record.round = round(&meta_text);
    record.venue = venue(&meta_text);
    record.attendance = attendance(&meta_text);
    record.referee = referee(&meta_text);
}

pub(super) fn apply_teams(blocks: [ElementRef; 2], record: &mut MatchRecord) {
    for side in Side::ALL {
        *record.side_mut(side) = team_line(blocks[side.index()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: &str = r#"<div class="scorebox_meta">
        <div><span class="venuetime" data-venue-date="2024-08-16" data-venue-time="20:00">20:00</span></div>
        <div><a href="/en/comps/9/2024-2025/2024-2025-Premier-League-Stats">2024-2025 Premier League</a> (Matchweek 1)</div>
        <div><small>Attendance</small>: <small>73,297</small></div>
        <div><small>Venue</small>: <small>Old Trafford, Manchester</small></div>
        <div><small>Officials</small>: <small>Robert Jones (Referee) · Constantine Hatzidakis (AR1)</small></div>
    </div>"#;

    #[test]
    fn test_meta_fields() {
        let doc = Html::parse_document(META);
        let mut record = MatchRecord::new("u");
        apply_meta(&doc, &mut record);

        assert_eq!(record.date.as_deref(), Some("2024-08-16"));
        assert_eq!(record.time.as_deref(), Some("20:00"));
        assert_eq!(record.competition.as_deref(), Some("Premier League"));
        assert_eq!(record.season.as_deref(), Some("2024-2025"));
        assert_eq!(record.round.as_deref(), Some("Matchweek 1"));
        assert_eq!(record.attendance, Some(73297));
        assert_eq!(record.venue.as_deref(), Some("Old Trafford, Manchester"));
        assert_eq!(record.referee.as_deref(), Some("Robert Jones"));
    }

    #[test]
    fn test_meta_without_links_degrades_to_unknown() {
        let doc = Html::parse_document(r#"<div class="scorebox_meta"><div>Kickoff 15:00</div></div>"#);
        let mut record = MatchRecord::new("u");
        apply_meta(&doc, &mut record);

        assert_eq!(record.time.as_deref(), Some("15:00"));
        assert_eq!(record.date, None);
        assert_eq!(record.competition, None);
        assert_eq!(record.attendance, None);
        assert_eq!(record.referee, None);
    }

    #[test]
    fn test_blocks_by_shape_fallback() {
        let doc = Html::parse_document(
            r#"<div class="scorebox">
                <div><strong><a href="/en/squads/a">Home FC</a></strong><div class="score">1</div></div>
                <div><strong><a href="/en/squads/b">Away FC</a></strong><div class="score">0</div></div>
                <div class="scorebox_meta"></div>
            </div>"#,
        );
        let scorebox = find_scorebox(&doc).unwrap();
        let [home, away] = team_blocks(&doc, scorebox).unwrap();
        assert_eq!(team_name(home).as_deref(), Some("Home FC"));
        assert_eq!(team_name(away).as_deref(), Some("Away FC"));
    }

    #[test]
    fn test_datapoint_labels() {
        let doc = Html::parse_document(
            r#"<div id="sb_team_0">
                <div class="datapoint"><strong>Manager</strong>: Erik ten Hag</div>
                <div class="datapoint"><strong>Captain</strong>: <a>Bruno Fernandes</a></div>
            </div>"#,
        );
        let block = doc.select(&sel("#sb_team_0").unwrap()).next().unwrap();
        let line = team_line(block);
        assert_eq!(line.manager.as_deref(), Some("Erik ten Hag"));
        assert_eq!(line.captain.as_deref(), Some("Bruno Fernandes"));
        assert_eq!(line.goals, None);
    }
}
