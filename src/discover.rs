//! Season fixture-list discovery.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::cache::PageCache;
use crate::error::ScraperError;
use crate::traits::PageFetcher;

const BASE_URL: &str = "https://fbref.com";

/// Known competitions and their FBref ids.
pub const COMPETITIONS: [(&str, u32); 7] = [
    ("premier-league", 9),
    ("la-liga", 12),
    ("serie-a", 11),
    ("bundesliga", 20),
    ("ligue-1", 13),
    ("champions-league", 8),
    ("mls", 22),
];

pub fn competition_id(competition: &str) -> Option<u32> {
    COMPETITIONS
        .iter()
        .find(|(slug, _)| *slug == competition)
        .map(|(_, id)| *id)
}

/// `premier-league` -> `Premier-League`
fn display_name(competition: &str) -> String {
    competition
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Fixture-list page for a competition season.
pub fn schedule_url(competition: &str, season: &str) -> Result<String, ScraperError> {
    let id = competition_id(competition).ok_or_else(|| {
        let known: Vec<&str> = COMPETITIONS.iter().map(|(slug, _)| *slug).collect();
        ScraperError::NotFound(format!(
            "unknown competition {} (known: {})",
            competition,
            known.join(", ")
        ))
    })?;
    Ok(format!(
        "{}/en/comps/{}/{}/schedule/{}-{}-Scores-and-Fixtures",
        BASE_URL,
        id,
        season,
        season,
        display_name(competition)
    ))
}

fn match_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/en/matches/[a-f0-9]+/[A-Za-z0-9\-]+").expect("valid regex")
    })
}

/// Every match-report link in document order, de-duplicated, absolute.
///
/// Works on the raw markup so links inside commented-out tables are found too.
pub fn extract_match_urls(markup: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    match_link_re()
        .find_iter(markup)
        .map(|m| m.as_str())
        .filter(|path| seen.insert(*path))
        .map(|path| format!("{}{}", BASE_URL, path))
        .collect()
}

/// Load a page through the cache, fetching (and caching) on a miss.
pub async fn load_page(
    fetcher: &mut dyn PageFetcher,
    cache: &PageCache,
    url: &str,
) -> Result<(String, bool), ScraperError> {
    if cache.has(url) {
        return Ok((cache.get(url)?, true));
    }
    let markup = fetcher.fetch(url).await?;
    cache.put(url, &markup)?;
    Ok((markup, false))
}

/// Enumerate the match-report URLs of one competition season.
pub async fn discover(
    fetcher: &mut dyn PageFetcher,
    cache: &PageCache,
    competition: &str,
    season: &str,
) -> Result<Vec<String>, ScraperError> {
    let url = schedule_url(competition, season)?;
    info!("Discovering {} {}: {}", competition, season, url);

    let (markup, cached) = load_page(fetcher, cache, &url).await?;
    let urls = extract_match_urls(&markup);
    if urls.is_empty() {
        return Err(ScraperError::Parse(format!("no match links on {}", url)));
    }

    info!(
        "Found {} match URLs{}",
        urls.len(),
        if cached { " (cached schedule)" } else { "" }
    );
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::unique_temp_dir;
    use async_trait::async_trait;

    struct StaticFetcher {
        markup: String,
        calls: usize,
    }

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&mut self, _url: &str) -> Result<String, ScraperError> {
            self.calls += 1;
            Ok(self.markup.clone())
        }

        async fn close(&mut self) -> Result<(), ScraperError> {
            Ok(())
        }
    }

    fn fixture_page(ids: &[&str]) -> String {
        let rows: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<tr><td class="score"><a href="/en/matches/{id}/Home-Away-Premier-League">2–1</a></td>
                    <td><a href="/en/matches/{id}/Home-Away-Premier-League">Match Report</a></td></tr>"#
                )
            })
            .collect();
        format!(r#"<html><body><table id="sched_2023-2024_9_1">{rows}</table></body></html>"#)
    }

    #[test]
    fn test_schedule_url() {
        assert_eq!(
            schedule_url("premier-league", "2023-2024").unwrap(),
            "https://fbref.com/en/comps/9/2023-2024/schedule/2023-2024-Premier-League-Scores-and-Fixtures"
        );
        assert_eq!(
            schedule_url("mls", "2024").unwrap(),
            "https://fbref.com/en/comps/22/2024/schedule/2024-Mls-Scores-and-Fixtures"
        );
        assert!(matches!(
            schedule_url("eredivisie", "2023-2024"),
            Err(ScraperError::NotFound(_))
        ));
    }

    #[test]
    fn test_extract_preserves_document_order() {
        let ids = ["e0a", "0b1", "c7f", "99d", "a12"];
        let urls = extract_match_urls(&fixture_page(&ids));

        assert_eq!(urls.len(), ids.len());
        for (url, id) in urls.iter().zip(ids) {
            assert_eq!(
                url,
                &format!("https://fbref.com/en/matches/{id}/Home-Away-Premier-League")
            );
        }
    }

    #[test]
    fn test_extract_finds_links_in_comments() {
        let markup = r#"<div><!-- <a href="/en/matches/abc123/A-B">x</a> --></div>"#;
        assert_eq!(
            extract_match_urls(markup),
            vec!["https://fbref.com/en/matches/abc123/A-B".to_string()]
        );
    }

    #[test]
    fn test_extract_ignores_other_links() {
        let markup = r#"<a href="/en/squads/18bb7c10/Arsenal-Stats">Arsenal</a>
            <a href="/en/matches/2024-08-17">Aug 17</a>"#;
        assert!(extract_match_urls(markup).is_empty());
    }

    #[tokio::test]
    async fn test_discover_single_fetch_then_cached() {
        let cache = PageCache::new(unique_temp_dir("discover"));
        let mut fetcher = StaticFetcher {
            markup: fixture_page(&["aaa", "bbb", "ccc"]),
            calls: 0,
        };

        let urls = discover(&mut fetcher, &cache, "premier-league", "2023-2024")
            .await
            .unwrap();
        assert_eq!(urls.len(), 3);
        assert_eq!(fetcher.calls, 1);

        let again = discover(&mut fetcher, &cache, "premier-league", "2023-2024")
            .await
            .unwrap();
        assert_eq!(again, urls);
        assert_eq!(fetcher.calls, 1);

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn test_discover_empty_page_is_parse_error() {
        let cache = PageCache::new(unique_temp_dir("discover-empty"));
        let mut fetcher = StaticFetcher {
            markup: "<html><body>no fixtures</body></html>".to_string(),
            calls: 0,
        };

        let result = discover(&mut fetcher, &cache, "la-liga", "2023-2024").await;
        assert!(matches!(result, Err(ScraperError::Parse(_))));

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn test_discover_unknown_competition_skips_fetch() {
        let cache = PageCache::new(unique_temp_dir("discover-unknown"));
        let mut fetcher = StaticFetcher {
            markup: String::new(),
            calls: 0,
        };

        let result = discover(&mut fetcher, &cache, "nope", "2023-2024").await;
        assert!(matches!(result, Err(ScraperError::NotFound(_))));
        assert_eq!(fetcher.calls, 0);
    }
}
