//! Per-player stat tables and the generic `data-stat` fallback.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

use super::text::{normalize_key, sel, text_of};
use crate::types::{PlayerRow, PlayerStatTable, Side, StatValue, TableKind};

/// Columns kept as text even when they look numeric.
const TEXT_COLUMNS: [&str; 7] = ["player", "nation", "nationality", "pos", "position", "age", "team"];

fn table_by_id<'a>(doc: &'a Html, side: Side, kind: TableKind) -> Option<ElementRef<'a>> {
    let id = match kind {
        TableKind::Goalkeeper => format!("keeper_stats_{}", side),
        _ => format!("stats_{}_{}", side, kind.as_str()),
    };
    let selector = sel(&format!("table#{}", id))?;
    doc.select(&selector).next()
}

/// FBref ids embed the squad hash (`stats_b8fd03ef_summary`); fall back to
/// document order, home first.
fn table_by_shape<'a>(doc: &'a Html, side: Side, kind: TableKind) -> Option<ElementRef<'a>> {
    let css = match kind {
        TableKind::Goalkeeper => r#"table[id^="keeper_stats_"]"#.to_string(),
        _ => format!(r#"table[id^="stats_"][id$="_{}"]"#, kind.as_str()),
    };
    let selector = sel(&css)?;
    doc.select(&selector).nth(side.index())
}

fn header_keys(table: ElementRef) -> Vec<String> {
    let Some(selector) = sel("thead tr") else {
        return Vec::new();
    };
    table
        .select(&selector)
        .last()
        .map(|row| row_cells(row).into_iter().map(text_of).collect())
        .unwrap_or_default()
}

fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "th" | "td"))
        .collect()
}

fn is_separator_row(row: ElementRef) -> bool {
    row.value()
        .classes()
        .any(|c| c.contains("thead") || c.contains("spacer"))
}

fn cell_value(key: &str, text: &str) -> StatValue {
    if TEXT_COLUMNS.contains(&key) {
        return StatValue::Text(text.to_string());
    }
    let numeric: String = text.chars().filter(|c| *c != ',').collect();
    if !numeric.contains('.') {
        if let Ok(n) = numeric.parse::<i64>() {
            return StatValue::Int(n);
        }
    }
    match numeric.parse::<f64>() {
        Ok(f) if f.is_finite() => StatValue::Float(f),
        _ => StatValue::Text(text.to_string()),
    }
}

fn parse_table(table: ElementRef) -> Vec<PlayerRow> {
    let headers = header_keys(table);
    let Some(row_selector) = sel("tbody tr") else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for row in table.select(&row_selector) {
        if is_separator_row(row) {
            continue;
        }
        let cells = row_cells(row);
        if cells.len() < 3 {
            continue;
        }

        let mut stats = BTreeMap::new();
        for (j, cell) in cells.iter().enumerate() {
            let key = cell
                .value()
                .attr("data-stat")
                .map(str::to_string)
                .or_else(|| headers.get(j).map(|h| normalize_key(h)))
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| format!("col_{}", j));
            let text = text_of(*cell);
            if text.is_empty() {
                continue;
            }
            stats.insert(key.clone(), cell_value(&key, &text));
        }

        let player = match stats.remove("player") {
            Some(StatValue::Text(name)) if !name.is_empty() && name != "Player" => name,
            _ => continue,
        };
        rows.push(PlayerRow { player, stats });
    }
    rows
}

/// All fourteen tables, home first, `TableKind::ALL` order. Missing ones are empty.
pub(super) fn extract_tables(doc: &Html) -> Vec<PlayerStatTable> {
    let mut tables = Vec::with_capacity(Side::ALL.len() * TableKind::ALL.len());
    for side in Side::ALL {
        for kind in TableKind::ALL {
            let rows = table_by_id(doc, side, kind)
                .or_else(|| table_by_shape(doc, side, kind))
                .map(parse_table)
                .unwrap_or_default();
            tables.push(PlayerStatTable { side, kind, rows });
        }
    }
    tables
}

/// Any other id'd table with `data-stat` cells, as rows of raw text.
pub(super) fn extract_extra_tables(doc: &Html) -> BTreeMap<String, Vec<BTreeMap<String, String>>> {
    let mut extra = BTreeMap::new();
    let (Some(table_selector), Some(row_selector), Some(cell_selector)) =
        (sel("table[id]"), sel("tr"), sel("td, th"))
    else {
        return extra;
    };

    for table in doc.select(&table_selector) {
        let Some(id) = table.value().attr("id") else {
            continue;
        };
        if id == "team_stats" || id.contains("stats_") || id.contains("keeper_stats") {
            continue;
        }

        let rows: Vec<BTreeMap<String, String>> = table
            .select(&row_selector)
            .map(|tr| {
                tr.select(&cell_selector)
                    .filter_map(|cell| {
                        let stat = cell.value().attr("data-stat")?;
                        (!stat.is_empty()).then(|| (stat.to_string(), text_of(cell)))
                    })
                    .collect::<BTreeMap<_, _>>()
            })
            .filter(|row| !row.is_empty())
            .collect();

        if !rows.is_empty() {
            extra.insert(id.to_string(), rows);
        }
    }
    extra
}
