use crate::error::{Result, ScanError};
use reqwest::Client;
use reqwest::cookie::Jar;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default selector for the "load more" link of a paginated listing
pub const DEFAULT_NEXT_SELECTOR: &str = "a[rel=next]";

/// A cookie restored into the driver before the listing is loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl SessionCookie {
    fn to_header_value(&self) -> String {
        let mut cookie = format!("{}={}", self.name, self.value);
        if let Some(ref domain) = self.domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }
        cookie.push_str(&format!("; Path={}", self.path.as_deref().unwrap_or("/")));
        cookie
    }
}

/// One loaded document and the URL it was finally served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    pub url: String,
    pub html: String,
}

/// Everything currently loaded in the page, as seen by an extractor.
///
/// Relative links inside each document resolve against that document's own URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    pub documents: Vec<PageDocument>,
}

impl RenderedPage {
    /// A page made of a single document
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            documents: vec![PageDocument {
                url: url.into(),
                html: html.into(),
            }],
        }
    }
}

/// The page driver the scroll controller polls.
///
/// Every call returns once the page state has settled. A driver belongs to a
/// single run and must be released with [`PageDriver::quit`] on every exit
/// path.
#[allow(async_fn_in_trait)]
pub trait PageDriver {
    /// Restores a previous session into the driver
    async fn load_cookies(&mut self, cookies: &[SessionCookie]) -> Result<()>;

    /// Reloads the listing from the start
    async fn refresh(&mut self) -> Result<()>;

    /// Triggers loading of the next batch of content
    async fn scroll_to_end(&mut self) -> Result<()>;

    /// Returns the currently rendered state
    async fn rendered_page(&mut self) -> Result<RenderedPage>;

    async fn quit(&mut self) -> Result<()>;
}

/// Page driver for listings that lazy-load through a "load more" link.
///
/// Scrolling fetches the page behind the current next link and appends it to
/// the rendered document, so the rendered state only ever grows. Once the last
/// page has no next link, scrolling leaves the document unchanged.
pub struct HttpPageDriver {
    client: Client,
    jar: Arc<Jar>,
    start_url: Url,
    next_selector: Selector,
    loaded: Vec<PageDocument>,
    next_url: Option<Url>,
    closed: bool,
}

impl HttpPageDriver {
    pub fn new(start_url: &str) -> Result<Self> {
        Self::with_timeout(start_url, 10)
    }

    pub fn with_timeout(start_url: &str, timeout_secs: u64) -> Result<Self> {
        let start_url = Url::parse(start_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", start_url, e)))?;

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent("Amity/0.1 (https://github.com/trapdoorsec/amity)")
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .cookie_provider(jar.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            jar,
            start_url,
            next_selector: Selector::parse(DEFAULT_NEXT_SELECTOR)
                .map_err(|e| ScanError::ParseError(format!("{:?}", e)))?,
            loaded: Vec::new(),
            next_url: None,
            closed: false,
        })
    }

    pub fn with_next_selector(mut self, css: &str) -> Result<Self> {
        self.next_selector = Selector::parse(css)
            .map_err(|e| ScanError::ParseError(format!("selector '{}': {:?}", css, e)))?;
        Ok(self)
    }

    /// Number of listing pages loaded so far
    pub fn loaded_pages(&self) -> usize {
        self.loaded.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ScanError::DriverClosed);
        }
        Ok(())
    }

    async fn fetch(&self, url: &Url) -> Result<(Url, String)> {
        debug!("Fetching {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        let final_url = response.url().clone();
        let body = response.text().await?;
        Ok((final_url, body))
    }

    fn find_next(&self, html: &str, page_url: &Url) -> Option<Url> {
        let document = Html::parse_document(html);
        document
            .select(&self.next_selector)
            .filter_map(|link| link.value().attr("href"))
            .find_map(|href| page_url.join(href).ok())
    }
}

impl PageDriver for HttpPageDriver {
    async fn load_cookies(&mut self, cookies: &[SessionCookie]) -> Result<()> {
        self.ensure_open()?;
        for cookie in cookies {
            self.jar
                .add_cookie_str(&cookie.to_header_value(), &self.start_url);
        }
        debug!("Loaded {} session cookies", cookies.len());
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        self.ensure_open()?;
        let start_url = self.start_url.clone();
        let (final_url, body) = self.fetch(&start_url).await?;
        self.next_url = self.find_next(&body, &final_url);
        info!("Loaded {}", final_url);
        self.loaded = vec![PageDocument {
            url: final_url.to_string(),
            html: body,
        }];
        Ok(())
    }

    async fn scroll_to_end(&mut self) -> Result<()> {
        self.ensure_open()?;
        let Some(next_url) = self.next_url.take() else {
            debug!("No more content to load");
            return Ok(());
        };

        match self.fetch(&next_url).await {
            Ok((final_url, body)) => {
                self.next_url = self.find_next(&body, &final_url);
                self.loaded.push(PageDocument {
                    url: final_url.to_string(),
                    html: body,
                });
                Ok(())
            }
            Err(e) => {
                // Keep the link so the next cycle retries it
                self.next_url = Some(next_url);
                Err(e)
            }
        }
    }

    async fn rendered_page(&mut self) -> Result<RenderedPage> {
        self.ensure_open()?;
        Ok(RenderedPage {
            documents: self.loaded.clone(),
        })
    }

    async fn quit(&mut self) -> Result<()> {
        self.closed = true;
        self.loaded.clear();
        self.next_url = None;
        Ok(())
    }
}
