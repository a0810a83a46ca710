//! Archive and document location discovery for the House Clerk site
//!
//! The yearly bulk archive is linked from the financial disclosure
//! landing page as `/public_disc/financial-pdfs/{YEAR}FD.zip`. When the
//! page markup drifts and the link cannot be scraped, the URL is
//! constructed from the known pattern and probed; a probe miss means the
//! year has no published archive, which is terminal rather than
//! retryable.

use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::error::{IngestError, Result};

/// A discovered bulk archive for one year
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLocation {
    pub year: i32,
    pub url: String,
    /// Whether the link was scraped from the landing page or constructed
    /// from the known URL pattern
    pub from_landing_page: bool,
}

/// Locates archives and filing documents on the Clerk's site
pub struct HouseDiscovery {
    client: Client,
    base_url: String,
}

impl HouseDiscovery {
    /// The client is shared across components; construct it once per
    /// process with [`crate::ingest::build_http_client`].
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Landing page listing bulk downloads.
    pub fn landing_url(&self) -> String {
        format!("{}/FinancialDisclosure", self.base_url)
    }

    /// URL of an individual PTR document.
    pub fn document_url(&self, year: i32, document_id: &str) -> String {
        format!(
            "{}/public_disc/ptr-pdfs/{year}/{document_id}.pdf",
            self.base_url
        )
    }

    /// Every year archive published on the landing page, ascending by
    /// year. Drives the dry-run listing mode; nothing is probed or
    /// downloaded.
    pub async fn list_available(&self) -> Result<Vec<ArchiveLocation>> {
        let html = self.fetch_landing_page().await?;
        let locations = find_archive_links(&html, &self.base_url);
        info!(count = locations.len(), "Listed published year archives");
        Ok(locations)
    }

    /// Locate the bulk archive for one year.
    ///
    /// Scrapes the landing page first; falls back to the constructed URL
    /// verified with a HEAD probe. Returns [`IngestError::NotFound`] when
    /// no archive exists for the year.
    pub async fn discover_year_archive(&self, year: i32) -> Result<ArchiveLocation> {
        let html = self.fetch_landing_page().await?;

        if let Some(url) = find_year_archive_link(&html, &self.base_url, year) {
            info!(year, url = %url, "Found year archive link on landing page");
            return Ok(ArchiveLocation {
                year,
                url,
                from_landing_page: true,
            });
        }

        let constructed = format!("{}/public_disc/financial-pdfs/{year}FD.zip", self.base_url);
        debug!(year, url = %constructed, "No landing page link, probing constructed URL");

        if self.probe(&constructed).await? {
            info!(year, url = %constructed, "Using constructed year archive URL");
            Ok(ArchiveLocation {
                year,
                url: constructed,
                from_landing_page: false,
            })
        } else {
            Err(IngestError::NotFound(format!(
                "no bulk archive published for year {year}"
            )))
        }
    }

    async fn fetch_landing_page(&self) -> Result<String> {
        let url = self.landing_url();
        debug!(url = %url, "Fetching disclosure landing page");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(IngestError::Discovery(format!(
                "landing page returned {}",
                response.status()
            )));
        }

        Ok(response.text().await?)
    }

    /// HEAD probe; true when the resource exists.
    async fn probe(&self, url: &str) -> Result<bool> {
        let response = self.client.head(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else if status.is_success() {
            Ok(true)
        } else {
            Err(IngestError::Discovery(format!(
                "archive probe returned {status} for {url}"
            )))
        }
    }
}

/// Scan landing page links for the year's archive href.
fn find_year_archive_link(html: &str, base_url: &str, year: i32) -> Option<String> {
    find_archive_links(html, base_url)
        .into_iter()
        .find(|location| location.year == year)
        .map(|location| location.url)
}

/// Collect every year archive linked from the page, one location per
/// year, ascending.
///
/// Synchronous on purpose: the parsed document is not `Send` and must
/// not be held across an await point.
fn find_archive_links(html: &str, base_url: &str) -> Vec<ArchiveLocation> {
    let document = Html::parse_document(html);
    let link_selector = match Selector::parse("a") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let mut locations: Vec<ArchiveLocation> = Vec::new();
    for element in document.select(&link_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(year) = parse_archive_year(href) else {
            continue;
        };
        if locations.iter().any(|location| location.year == year) {
            continue;
        }
        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{base_url}{href}")
        };
        locations.push(ArchiveLocation {
            year,
            url,
            from_landing_page: true,
        });
    }

    locations.sort_by_key(|location| location.year);
    locations
}

/// Year encoded in a bulk archive href,
/// `/public_disc/financial-pdfs/2024FD.zip` -> 2024.
fn parse_archive_year(href: &str) -> Option<i32> {
    let stem = href.strip_suffix("FD.zip")?;
    let digits_at = stem.len().checked_sub(4)?;
    let path = stem.get(..digits_at)?;
    if !path.ends_with("/public_disc/financial-pdfs/") {
        return None;
    }
    stem.get(digits_at..)?.parse().ok()
}
