//! Match and player-stat record types.
//!
//! Every numeric attribute is an `Option`: `None` means the value could not
//! be read from the page and serializes as `null`. Zero is a real observation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Home, Side::Away];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Side::Home => 0,
            Side::Away => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Summary,
    Passing,
    Defense,
    Possession,
    Misc,
    Shooting,
    Goalkeeper,
}

impl TableKind {
    pub const ALL: [TableKind; 7] = [
        TableKind::Summary,
        TableKind::Passing,
        TableKind::Defense,
        TableKind::Possession,
        TableKind::Misc,
        TableKind::Shooting,
        TableKind::Goalkeeper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Summary => "summary",
            TableKind::Passing => "passing",
            TableKind::Defense => "defense",
            TableKind::Possession => "possession",
            TableKind::Misc => "misc",
            TableKind::Shooting => "shooting",
            TableKind::Goalkeeper => "goalkeeper",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    HomeWin,
    AwayWin,
    Draw,
}

impl Outcome {
    pub fn from_goals(home: u32, away: u32) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => Outcome::HomeWin,
            std::cmp::Ordering::Less => Outcome::AwayWin,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }
}

/// One side's line of the match report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub team: Option<String>,
    pub goals: Option<u32>,
    pub xg: Option<f64>,
    pub manager: Option<String>,
    pub captain: Option<String>,
    pub possession: Option<f64>,
    pub passing_accuracy: Option<f64>,
    pub shots_total: Option<u32>,
    pub shots_on_target: Option<u32>,
    pub saves: Option<u32>,
    /// Shots on target faced, the denominator of the saves line.
    pub saves_faced: Option<u32>,
    pub fouls: Option<u32>,
    pub corners: Option<u32>,
    pub crosses: Option<u32>,
    pub interceptions: Option<u32>,
    pub cards_yellow: Option<u32>,
    pub cards_red: Option<u32>,
    pub cards_total: Option<u32>,
    /// Any further numeric team stat keyed by its snake_case label.
    pub extra: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Source URL; primary key.
    pub url: String,
    pub match_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub competition: Option<String>,
    pub season: Option<String>,
    pub round: Option<String>,
    pub referee: Option<String>,
    pub venue: Option<String>,
    pub attendance: Option<u32>,
    pub outcome: Option<Outcome>,
    pub home: TeamStats,
    pub away: TeamStats,
    pub total_cards: Option<u32>,
    /// Other `data-stat` tables on the page, keyed by table id.
    pub extra_tables: BTreeMap<String, Vec<BTreeMap<String, String>>>,
}

impl MatchRecord {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            match_id: match_id_from_url(&url),
            url,
            date: None,
            time: None,
            competition: None,
            season: None,
            round: None,
            referee: None,
            venue: None,
            attendance: None,
            outcome: None,
            home: TeamStats::default(),
            away: TeamStats::default(),
            total_cards: None,
            extra_tables: BTreeMap::new(),
        }
    }

    pub fn side(&self, side: Side) -> &TeamStats {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut TeamStats {
        match side {
            Side::Home => &mut self.home,
            Side::Away => &mut self.away,
        }
    }

    /// One-line score summary used in job logs.
    pub fn headline(&self) -> String {
        fn or_q<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_else(|| "?".to_string())
        }
        format!(
            "{} {}-{} {}",
            or_q(&self.home.team),
            or_q(&self.home.goals),
            or_q(&self.away.goals),
            or_q(&self.away.team)
        )
    }
}

/// A single table cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRow {
    pub player: String,
    pub stats: BTreeMap<String, StatValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatTable {
    pub side: Side,
    pub kind: TableKind,
    pub rows: Vec<PlayerRow>,
}

impl PlayerStatTable {
    pub fn empty(side: Side, kind: TableKind) -> Self {
        Self {
            side,
            kind,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Extractor output for one match page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedMatch {
    pub record: MatchRecord,
    /// Always one table per (side, kind), home first, in `TableKind::ALL` order.
    pub tables: Vec<PlayerStatTable>,
}

impl ParsedMatch {
    pub fn table(&self, side: Side, kind: TableKind) -> Option<&PlayerStatTable> {
        self.tables.iter().find(|t| t.side == side && t.kind == kind)
    }
}

/// FBref hex match id: the path segment after `matches`.
pub fn match_id_from_url(url: &str) -> Option<String> {
    let mut parts = url.trim_end_matches('/').split('/');
    parts.find(|p| *p == "matches")?;
    parts
        .next()
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_hexdigit()))
        .map(str::to_string)
}

/// Last meaningful path segment, for log lines.
pub fn url_slug(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}
