//! Team-level stat boxes: `#team_stats` and `#team_stats_extra`.

use scraper::{ElementRef, Html};

use super::text::{decimal_to_count, normalize_key, parse_decimal, parse_of, parse_pct, sel, text_of};
use crate::types::{MatchRecord, Side, TeamStats};

fn cells<'a>(row: ElementRef<'a>, name: &str) -> Vec<ElementRef<'a>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == name)
        .collect()
}

/// Card icons inside one cell: (yellow, red). A second yellow counts as both.
fn count_cards(cell: ElementRef) -> (u32, u32) {
    let mut yellow = 0;
    let mut red = 0;
    let Some(selector) = sel("span") else {
        return (0, 0);
    };
    for span in cell.select(&selector) {
        for class in span.value().classes() {
            match class {
                "yellow_card" => yellow += 1,
                "red_card" => red += 1,
                "yellow_red_card" => {
                    yellow += 1;
                    red += 1;
                }
                _ => {}
            }
        }
    }
    (yellow, red)
}

fn apply_category(line: &mut TeamStats, key: &str, cell: ElementRef) {
    let text = text_of(cell);
    match key {
        "possession" => line.possession = parse_pct(&text).or_else(|| parse_decimal(&text)),
        "passing_accuracy" => {
            line.passing_accuracy = parse_pct(&text);
            if let Some((completed, attempted)) = parse_of(&text) {
                line.extra.insert("passes_completed".into(), completed as f64);
                line.extra.insert("passes_attempted".into(), attempted as f64);
            }
        }
        "shots_on_target" => {
            if let Some((on_target, total)) = parse_of(&text) {
                line.shots_on_target = Some(on_target);
                line.shots_total = Some(total);
            }
        }
        "saves" => {
            if let Some((saves, faced)) = parse_of(&text) {
                line.saves = Some(saves);
                line.saves_faced = Some(faced);
            }
        }
        "cards" => {
            let (yellow, red) = count_cards(cell);
            line.cards_yellow = Some(yellow);
            line.cards_red = Some(red);
        }
        _ => {
            let value = parse_pct(&text).or_else(|| parse_decimal(&text));
            if let Some(value) = value {
                line.extra.insert(key.to_string(), value);
            }
        }
    }
}

/// `#team_stats`: a header row naming the category, then a row of two cells.
pub(super) fn apply_team_stats(doc: &Html, record: &mut MatchRecord) {
    let Some(table) = sel("#team_stats").and_then(|s| doc.select(&s).next()) else {
        return;
    };
    let Some(row_selector) = sel("tr") else {
        return;
    };

    let mut category: Option<String> = None;
    for row in table.select(&row_selector) {
        let ths = cells(row, "th");
        let tds = cells(row, "td");

        if tds.is_empty() {
            category = ths.first().map(|th| text_of(*th)).filter(|t| !t.is_empty());
            continue;
        }

        if tds.len() >= 2 {
            if let Some(label) = category.take() {
                let key = normalize_key(&label);
                for side in Side::ALL {
                    apply_category(record.side_mut(side), &key, tds[side.index()]);
                }
            }
        }
    }
}

fn apply_extra_value(line: &mut TeamStats, key: &str, value: f64) {
    let slot = match key {
        "fouls" => &mut line.fouls,
        "corners" => &mut line.corners,
        "crosses" => &mut line.crosses,
        "interceptions" => &mut line.interceptions,
        _ => {
            line.extra.entry(key.to_string()).or_insert(value);
            return;
        }
    };
    if slot.is_none() {
        *slot = decimal_to_count(value);
    }
}

/// `#team_stats_extra`: leaf divs in (home value, label, away value) triplets.
pub(super) fn apply_extra_stats(doc: &Html, record: &mut MatchRecord) {
    let Some(container) = sel("#team_stats_extra").and_then(|s| doc.select(&s).next()) else {
        return;
    };
    let Some(div_selector) = sel("div") else {
        return;
    };

    let leaves: Vec<String> = container
        .select(&div_selector)
        .filter(|div| {
            !div.children()
                .filter_map(ElementRef::wrap)
                .any(|child| child.value().name() == "div")
        })
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();

    let mut i = 0;
    while i + 2 < leaves.len() {
        let home = parse_decimal(&leaves[i]);
        let label = &leaves[i + 1];
        let away = parse_decimal(&leaves[i + 2]);

        match (home, away) {
            (Some(home), Some(away)) if parse_decimal(label).is_none() => {
                let key = normalize_key(label);
                if !key.is_empty() {
                    apply_extra_value(&mut record.home, &key, home);
                    apply_extra_value(&mut record.away, &key, away);
                }
                i += 3;
            }
            _ => i += 1,
        }
    }
}

/// Card totals, only where both components are known.
pub(super) fn derive_totals(record: &mut MatchRecord) {
    for side in Side::ALL {
        let line = record.side_mut(side);
        line.cards_total = match (line.cards_yellow, line.cards_red) {
            (Some(yellow), Some(red)) => Some(yellow + red),
            _ => None,
        };
    }
    record.total_cards = match (record.home.cards_total, record.away.cards_total) {
        (Some(home), Some(away)) => Some(home + away),
        _ => None,
    };
}
