use once_cell::sync::Lazy;
use regex::Regex;

static VENDOR_ITEM_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"vendorItemId=(\d+)").unwrap());

/// Extract the vendor item id from a Coupang product page URL.
///
/// The id is the numeric value of the `vendorItemId` query parameter, which is
/// also what the search result listings render in their `data-id` attribute.
/// Returns `None` when the parameter is missing or non-numeric; a `None` means
/// the request is invalid, not that the crawl failed.
pub fn extract_vendor_item_id(url: &str) -> Option<String> {
    VENDOR_ITEM_ID.captures(url).map(|caps| caps[1].to_string())
}
