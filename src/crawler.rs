//! Rank resolution crawl.
//!
//! Drives one headless Chrome session through Coupang search result pages,
//! numbering organic listings until the target product appears or the page
//! limit runs out. Sponsored listings are skipped and never consume a rank;
//! the counter is cumulative across pages.

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::Rng;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::CrawlerConfig;
use crate::stealth;

/// Result list container; a page without it has not finished rendering.
const RESULT_LIST_SELECTOR: &str = "#product-list";
/// One rendered search-result entry.
const LISTING_SELECTOR: &str = "#product-list > li.ProductUnit_productUnit__Qd6sv";
/// Ad badge present only on sponsored listings.
const AD_MARK_SELECTOR: &str = ".AdMark_adMark__KPMsC";
/// Display name node inside a listing.
const PRODUCT_NAME_SELECTOR: &str = ".ProductUnit_productName__gre7e";
/// Results requested per page.
const LIST_SIZE: u32 = 60;
/// Substitute display name when the matched listing has no name node.
const NAME_UNAVAILABLE: &str = "name unavailable";

/// Terminal result of one rank-resolution call. Exactly one is produced per
/// call; there are no partial results.
#[derive(Debug, PartialEq)]
pub enum RankOutcome {
    /// The target listing was found at `rank` (1-based, organic-only,
    /// cumulative across pages) on `page`.
    Success {
        rank: u32,
        page: u32,
        product_name: String,
    },
    /// The crawl hit the page limit or the end of results without a match.
    NotFound { pages_searched: u32 },
    /// The crawl aborted; `message` names the cause.
    Error { message: String },
}

/// Failures that abort a crawl. All are converted to [`RankOutcome::Error`]
/// at the resolver boundary; none escape it.
#[derive(Debug, Error)]
enum CrawlError {
    #[error("page {page} did not render its result list within {timeout_secs}s (page load or proxy failure)")]
    LoadTimeout { page: u32, timeout_secs: u64 },
    #[error("blocked by a bot-challenge (CAPTCHA) page")]
    Blocked,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// One rendered search-result entry.
#[derive(Debug, Clone, PartialEq)]
struct Listing {
    /// The `data-id` attribute as rendered; matches the vendor item id.
    id: String,
    sponsored: bool,
    name: Option<String>,
}

/// One browsing context, exclusively owned by one resolve call.
///
/// Dropping the session drops the `Browser`, which kills the Chrome process,
/// so teardown runs exactly once on every exit path without explicit cleanup.
struct SearchSession {
    // Held so the Chrome process outlives the tab.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl SearchSession {
    fn launch(config: &CrawlerConfig) -> Result<Self> {
        let ua_arg = format!("--user-agent={}", stealth::pick_user_agent());
        let mut args = vec![
            std::ffi::OsStr::new("--disable-blink-features=AutomationControlled"),
            std::ffi::OsStr::new("--no-sandbox"),
            std::ffi::OsStr::new("--disable-dev-shm-usage"),
            std::ffi::OsStr::new("--disable-gpu"),
            std::ffi::OsStr::new("--window-position=0,0"),
            std::ffi::OsStr::new("--ignore-certificate-errors"),
            std::ffi::OsStr::new("--incognito"),
        ];
        args.push(std::ffi::OsStr::new(&ua_arg));

        if config.headless {
            args.push(std::ffi::OsStr::new("--headless=new"));
        }

        // Keep the formatted switch values alive until the browser launches.
        let proxy_arg: String;
        let ext_arg: String;
        if let Some(ref proxy) = config.proxy {
            info!("📡 Routing through proxy {}", proxy.to_chrome_arg());
            proxy_arg = format!("--proxy-server={}", proxy.to_chrome_arg());
            args.push(std::ffi::OsStr::new(&proxy_arg));

            if proxy.requires_auth() {
                let ext_path = proxy.write_auth_extension()?;
                ext_arg = format!("--load-extension={}", ext_path.display());
                args.push(std::ffi::OsStr::new(&ext_arg));
                info!("🔐 Proxy auth extension loaded");
            }
        }

        let browser = Browser::new(LaunchOptions {
            headless: false, // --headless=new is passed via args instead
            window_size: Some((1920, 1080)),
            args,
            ..Default::default()
        })
        .context("launching Chrome")?;

        let tab = browser.new_tab().context("opening tab")?;

        tab.enable_debugger()?;
        tab.call_method(
            headless_chrome::protocol::cdp::Page::AddScriptToEvaluateOnNewDocument {
                source: stealth::stealth_script().to_string(),
                world_name: None,
                include_command_line_api: None,
                run_immediately: None,
            },
        )
        .context("injecting stealth script")?;

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Navigate to one search page and block until the result list renders or
    /// the per-page timeout elapses. A timeout aborts the whole crawl; a
    /// failed or proxied-out page must not be silently downgraded to
    /// "not found".
    fn load_page(&self, url: &str, page: u32, timeout: Duration) -> Result<(), CrawlError> {
        self.tab
            .navigate_to(url)
            .with_context(|| format!("navigating to page {}", page))?;

        self.tab
            .wait_for_element_with_custom_timeout(RESULT_LIST_SELECTOR, timeout)
            .map_err(|_| CrawlError::LoadTimeout {
                page,
                timeout_secs: timeout.as_secs(),
            })?;

        Ok(())
    }

    fn page_content(&self) -> Result<String> {
        self.tab.get_content().context("reading rendered page")
    }

    fn page_title(&self) -> String {
        self.tab.get_title().unwrap_or_default()
    }
}

/// Resolve the cumulative organic rank of `target_id` for `keyword`.
///
/// Owns one browser session for the whole call. Every failure inside the
/// crawl is converted to a terminal outcome here, and the session is torn
/// down before returning whichever path is taken.
pub async fn resolve_rank(config: &CrawlerConfig, keyword: &str, target_id: &str) -> RankOutcome {
    match crawl(config, keyword, target_id).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("Crawl aborted: {err}");
            let message = match err {
                CrawlError::Unexpected(cause) => {
                    format!("unexpected failure during crawl: {cause:#}")
                }
                other => other.to_string(),
            };
            RankOutcome::Error { message }
        }
    }
}

async fn crawl(
    config: &CrawlerConfig,
    keyword: &str,
    target_id: &str,
) -> Result<RankOutcome, CrawlError> {
    let session = SearchSession::launch(config)?;

    let mut rank_counter: u32 = 0;

    for page in 1..=config.max_pages {
        let url = search_url(keyword, page);
        info!("Page {}/{}: {}", page, config.max_pages, url);

        session.load_page(&url, page, config.page_timeout)?;

        // Let the client-side render settle before reading the DOM.
        sleep(jitter(0.5, 1.0)).await;

        let html = session.page_content()?;
        let listings = parse_listings(&html);

        if listings.is_empty() {
            if is_bot_challenge(&html, &session.page_title()) {
                return Err(CrawlError::Blocked);
            }
            info!("Page {}: no listings rendered, treating as end of results", page);
            return Ok(RankOutcome::NotFound {
                pages_searched: page,
            });
        }

        let organic = listings.iter().filter(|l| !l.sponsored).count();
        info!("Page {}: {} listings ({} organic)", page, listings.len(), organic);

        if let Some((rank, product_name)) = scan_listings(&listings, target_id, &mut rank_counter) {
            info!("✅ Match on page {} at organic rank {}", page, rank);
            return Ok(RankOutcome::Success {
                rank,
                page,
                product_name,
            });
        }

        if page < config.max_pages {
            sleep(jitter(1.0, 2.5)).await;
        }
    }

    Ok(RankOutcome::NotFound {
        pages_searched: config.max_pages,
    })
}

/// Build the search URL for one page: URL-encoded keyword, relevance sort,
/// fixed page size.
fn search_url(keyword: &str, page: u32) -> String {
    format!(
        "https://www.coupang.com/np/search?q={}&channel=user&sorter=scoreDesc&listSize={}&page={}",
        urlencoding::encode(keyword),
        LIST_SIZE,
        page
    )
}

/// Parse the rendered page into listings, in rendered order. Listings without
/// a name node are tolerated here; the name is only required for a match.
fn parse_listings(html: &str) -> Vec<Listing> {
    let document = Html::parse_document(html);
    let listing_sel = Selector::parse(LISTING_SELECTOR).unwrap();
    let ad_sel = Selector::parse(AD_MARK_SELECTOR).unwrap();
    let name_sel = Selector::parse(PRODUCT_NAME_SELECTOR).unwrap();

    document
        .select(&listing_sel)
        .map(|el| Listing {
            id: el.value().attr("data-id").unwrap_or_default().to_string(),
            sponsored: el.select(&ad_sel).next().is_some(),
            name: el
                .select(&name_sel)
                .next()
                .map(|n| n.text().collect::<String>().trim().to_string()),
        })
        .collect()
}

/// Walk one page's listings in rendered order, advancing the cumulative
/// organic rank counter. Sponsored listings never consume a rank. Returns the
/// rank and display name of the first listing whose id equals the target.
fn scan_listings(
    listings: &[Listing],
    target_id: &str,
    rank_counter: &mut u32,
) -> Option<(u32, String)> {
    for listing in listings {
        if listing.sponsored {
            continue;
        }
        *rank_counter += 1;
        if listing.id == target_id {
            let name = listing
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| NAME_UNAVAILABLE.to_string());
            return Some((*rank_counter, name));
        }
    }
    None
}

/// Recognize Coupang's bot-challenge interstitial: the Korean "I am not a
/// robot" prompt in the body, or a CAPTCHA title.
fn is_bot_challenge(html: &str, title: &str) -> bool {
    html.contains("로봇이 아닙니다") || title.to_lowercase().contains("captcha")
}

/// Randomized delay between page interactions.
fn jitter(low_secs: f64, high_secs: f64) -> Duration {
    let secs = rand::thread_rng().gen_range(low_secs..high_secs);
    Duration::from_millis((secs * 1000.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Render a synthetic result page from (id, sponsored, name) triples.
    fn page_html(entries: &[(&str, bool, Option<&str>)]) -> String {
        let mut items = String::new();
        for (id, sponsored, name) in entries {
            items.push_str(&format!(
                "<li class=\"ProductUnit_productUnit__Qd6sv\" data-id=\"{}\">",
                id
            ));
            if *sponsored {
                items.push_str("<span class=\"AdMark_adMark__KPMsC\">AD</span>");
            }
            if let Some(name) = name {
                items.push_str(&format!(
                    "<div class=\"ProductUnit_productName__gre7e\"> {} </div>",
                    name
                ));
            }
            items.push_str("<span class=\"Price_priceValue__A4KOr\">12,900원</span></li>");
        }
        format!(
            "<html><head><title>검색결과</title></head><body><ul id=\"product-list\">{}</ul></body></html>",
            items
        )
    }

    #[test]
    fn parses_listings_in_rendered_order() {
        let html = page_html(&[
            ("111", true, Some("Sponsored Mouse")),
            ("222", false, Some("Organic Mouse")),
            ("333", false, None),
        ]);
        let listings = parse_listings(&html);
        assert_eq!(listings.len(), 3);
        assert_eq!(listings[0].id, "111");
        assert!(listings[0].sponsored);
        assert!(!listings[1].sponsored);
        assert_eq!(listings[1].name.as_deref(), Some("Organic Mouse"));
        assert_eq!(listings[2].name, None);
    }

    #[test]
    fn unrelated_markup_yields_no_listings() {
        let listings = parse_listings("<html><body><div id=\"product-list\"></div></body></html>");
        assert!(listings.is_empty());
    }

    #[test]
    fn sponsored_listings_never_consume_a_rank() {
        let html = page_html(&[
            ("ad1", true, Some("Ad A")),
            ("org1", false, Some("First Organic")),
            ("ad2", true, Some("Ad B")),
            ("org2", false, Some("Second Organic")),
        ]);
        let listings = parse_listings(&html);
        let mut counter = 0;
        let hit = scan_listings(&listings, "org2", &mut counter);
        assert_eq!(hit, Some((2, "Second Organic".to_string())));
    }

    #[test]
    fn sponsored_copy_of_target_is_skipped() {
        let listings = vec![
            Listing {
                id: "12345".into(),
                sponsored: true,
                name: Some("Paid Placement".into()),
            },
            Listing {
                id: "12345".into(),
                sponsored: false,
                name: Some("Organic Placement".into()),
            },
        ];
        let mut counter = 0;
        let hit = scan_listings(&listings, "12345", &mut counter);
        assert_eq!(hit, Some((1, "Organic Placement".to_string())));
    }

    #[test]
    fn rank_is_cumulative_across_pages() {
        // Page 1: three organic listings, no match.
        let page1 = parse_listings(&page_html(&[
            ("a", false, Some("A")),
            ("b", false, Some("B")),
            ("c", false, Some("C")),
        ]));
        // Page 2: match is the second organic listing.
        let page2 = parse_listings(&page_html(&[
            ("d", false, Some("D")),
            ("12345", false, Some("Target")),
        ]));

        let mut counter = 0;
        assert_eq!(scan_listings(&page1, "12345", &mut counter), None);
        assert_eq!(counter, 3);
        let hit = scan_listings(&page2, "12345", &mut counter);
        assert_eq!(hit, Some((5, "Target".to_string())));
    }

    #[test]
    fn wireless_mouse_scenario_ranks_sixth_on_page_two() {
        // Page 1: five listings, one sponsored, none matching.
        let page1 = parse_listings(&page_html(&[
            ("s1", true, Some("Sponsored")),
            ("o1", false, Some("One")),
            ("o2", false, Some("Two")),
            ("o3", false, Some("Three")),
            ("o4", false, Some("Four")),
        ]));
        // Page 2: three listings, none sponsored, match is the second.
        let page2 = parse_listings(&page_html(&[
            ("o5", false, Some("Five")),
            ("12345", false, Some("Wireless Mouse Pro")),
            ("o6", false, Some("Six")),
        ]));

        let mut counter = 0;
        assert_eq!(scan_listings(&page1, "12345", &mut counter), None);
        let hit = scan_listings(&page2, "12345", &mut counter);
        assert_eq!(hit, Some((6, "Wireless Mouse Pro".to_string())));
    }

    #[test]
    fn first_match_in_rendered_order_wins() {
        let listings = vec![
            Listing {
                id: "12345".into(),
                sponsored: false,
                name: Some("First Copy".into()),
            },
            Listing {
                id: "12345".into(),
                sponsored: false,
                name: Some("Second Copy".into()),
            },
        ];
        let mut counter = 0;
        let hit = scan_listings(&listings, "12345", &mut counter);
        assert_eq!(hit, Some((1, "First Copy".to_string())));
        // The scan stops at the match; the counter does not run past it.
        assert_eq!(counter, 1);
    }

    #[test]
    fn matched_listing_without_name_gets_placeholder() {
        let html = page_html(&[("777", false, None)]);
        let listings = parse_listings(&html);
        let mut counter = 0;
        let hit = scan_listings(&listings, "777", &mut counter);
        assert_eq!(hit, Some((1, NAME_UNAVAILABLE.to_string())));
    }

    #[test]
    fn bot_challenge_detected_from_body_or_title() {
        assert!(is_bot_challenge("<html>로봇이 아닙니다</html>", ""));
        assert!(is_bot_challenge("<html></html>", "Captcha Check"));
        assert!(is_bot_challenge("<html></html>", "captcha"));
        assert!(!is_bot_challenge("<html>검색결과</html>", "쿠팡!"));
    }

    #[test]
    fn search_url_encodes_keyword_and_fixes_sort() {
        let url = search_url("wireless mouse", 3);
        assert!(url.starts_with("https://www.coupang.com/np/search?q=wireless%20mouse"));
        assert!(url.contains("sorter=scoreDesc"));
        assert!(url.contains("listSize=60"));
        assert!(url.ends_with("page=3"));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..50 {
            let d = jitter(1.0, 2.5);
            assert!(d >= Duration::from_millis(1000));
            assert!(d < Duration::from_millis(2500));
        }
    }
}
