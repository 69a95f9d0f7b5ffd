use crate::driver::RenderedPage;
use crate::error::{Result, ScanError};
use crate::record::CandidateRecord;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Container wrapping the friend grid on a profile's friends tab.
pub const DEFAULT_CONTAINER_SELECTOR: &str = "div.xyamay9.x1pi30zi.x1l90r2v.x1swvt13";
/// Name spans inside the profile anchors of the friend grid.
pub const DEFAULT_ITEM_SELECTOR: &str = "a.x1i10hfl span";

/// Produces candidate records from the currently rendered page.
///
/// Implementations must be pure functions of the page: the scroll controller
/// calls them once per cycle against an ever-growing document and handles
/// deduplication itself.
pub trait RecordExtractor {
    fn extract(&self, page: &RenderedPage) -> Result<Vec<CandidateRecord>>;
}

/// CSS selectors locating the listing and the items inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSelectors {
    pub container: String,
    pub item: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER_SELECTOR.to_string(),
            item: DEFAULT_ITEM_SELECTOR.to_string(),
        }
    }
}

/// Extracts `(label, locator)` pairs from a friend listing.
///
/// The label is the trimmed text of each item and the locator is the `href`
/// of the item itself or of its parent anchor, resolved against the page URL.
/// Items without text or without a usable link are rendering artifacts and are
/// skipped silently.
pub struct FriendListExtractor {
    container_css: String,
    container: Selector,
    item: Selector,
}

impl FriendListExtractor {
    pub fn new(selectors: &ListingSelectors) -> Result<Self> {
        Ok(Self {
            container_css: selectors.container.clone(),
            container: parse_selector(&selectors.container)?,
            item: parse_selector(&selectors.item)?,
        })
    }

    fn locator_for(element: ElementRef<'_>) -> Option<&str> {
        if let Some(href) = element.value().attr("href") {
            return Some(href);
        }
        element
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|parent| parent.value().attr("href"))
    }
}

impl RecordExtractor for FriendListExtractor {
    fn extract(&self, page: &RenderedPage) -> Result<Vec<CandidateRecord>> {
        let mut found_container = false;
        let mut records = Vec::new();

        // Pages appended by a "load more" fetch bring their own container
        for source in &page.documents {
            let document = Html::parse_document(&source.html);
            let base_url = Url::parse(&source.url).ok();

            for container in document.select(&self.container) {
                found_container = true;

                for element in container.select(&self.item) {
                    let text: String = element.text().collect();
                    let label = text.trim();
                    if label.is_empty() {
                        continue;
                    }

                    let Some(locator) = Self::locator_for(element)
                        .and_then(|href| resolve_locator(base_url.as_ref(), href))
                    else {
                        debug!("Skipping '{}': no usable link", label);
                        continue;
                    };

                    records.push(CandidateRecord::new(label, locator));
                }
            }
        }

        if !found_container {
            return Err(ScanError::ElementNotFound(self.container_css.clone()));
        }
        Ok(records)
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::ParseError(format!("selector '{}': {:?}", css, e)))
}

fn resolve_locator(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    // Skip empty, javascript:, mailto:, tel: and in-page anchors
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut resolved = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    resolved.set_fragment(None);

    Some(resolved.to_string())
}
