// src/sources/html.rs
//! Generic listing-page adapter: fetch a search URL, pick listing cards with CSS
//! selectors, read raw field text. One instance per marketplace, configured
//! entirely from the sources file.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use url::Url;

use super::{ExtractRequest, SourceAdapter};
use crate::error::AdapterError;
use crate::listing::RawListing;

const USER_AGENT: &str = "market-scraper/0.1 (+pricing research)";

/// CSS selectors for one marketplace's listing cards.
/// A trailing `@attr` reads an attribute instead of text, e.g. `div.stars@data-rating`.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSpec {
    pub item: String,
    pub title: String,
    pub price: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub reviews: Option<String>,
    #[serde(default)]
    pub delivery: Option<String>,
    #[serde(default)]
    pub seller_name: Option<String>,
    #[serde(default)]
    pub seller_level: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the first anchor's `href`.
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HtmlAdapterSpec {
    pub name: String,
    /// Search page template. Placeholders: `{query}` (form-encoded),
    /// `{query_slug}` (lowercase, hyphenated) and `{region}`.
    pub search_url: String,
    /// Currency hint attached to every record when the page has none.
    #[serde(default)]
    pub currency: Option<String>,
    pub selectors: SelectorSpec,
}

struct Field {
    selector: Selector,
    attr: Option<String>,
}

impl Field {
    fn compile(adapter: &str, raw: &str) -> Result<Self> {
        let (css, attr) = match raw.rsplit_once('@') {
            Some((css, attr)) if !attr.trim().is_empty() => (css, Some(attr.trim().to_string())),
            _ => (raw, None),
        };
        let selector = Selector::parse(css.trim())
            .map_err(|e| anyhow!("invalid selector '{raw}' for {adapter}: {e:?}"))?;
        Ok(Self { selector, attr })
    }

    fn read(&self, card: &ElementRef<'_>) -> Option<String> {
        let el = card.select(&self.selector).next()?;
        let value = match &self.attr {
            Some(attr) => el.value().attr(attr)?.to_string(),
            None => el.text().collect::<Vec<_>>().join(" "),
        };
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

struct CompiledSelectors {
    item: Selector,
    title: Field,
    price: Field,
    currency: Option<Field>,
    rating: Option<Field>,
    reviews: Option<Field>,
    delivery: Option<Field>,
    seller_name: Option<Field>,
    seller_level: Option<Field>,
    description: Option<Field>,
    link: Field,
}

impl CompiledSelectors {
    fn compile(adapter: &str, spec: &SelectorSpec) -> Result<Self> {
        let opt = |s: &Option<String>| s.as_deref().map(|s| Field::compile(adapter, s)).transpose();
        Ok(Self {
            item: Selector::parse(spec.item.trim())
                .map_err(|e| anyhow!("invalid item selector for {adapter}: {e:?}"))?,
            title: Field::compile(adapter, &spec.title)?,
            price: Field::compile(adapter, &spec.price)?,
            currency: opt(&spec.currency)?,
            rating: opt(&spec.rating)?,
            reviews: opt(&spec.reviews)?,
            delivery: opt(&spec.delivery)?,
            seller_name: opt(&spec.seller_name)?,
            seller_level: opt(&spec.seller_level)?,
            description: opt(&spec.description)?,
            link: Field::compile(adapter, spec.link.as_deref().unwrap_or("a@href"))?,
        })
    }
}

pub struct HtmlAdapter {
    spec: HtmlAdapterSpec,
    selectors: CompiledSelectors,
    client: reqwest::Client,
}

impl HtmlAdapter {
    pub fn new(spec: HtmlAdapterSpec) -> Result<Self> {
        Url::parse(&spec.search_url.replace(['{', '}'], ""))
            .map_err(|e| anyhow!("invalid search_url for {}: {e}", spec.name))?;
        let selectors = CompiledSelectors::compile(&spec.name, &spec.selectors)?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            spec,
            selectors,
            client,
        })
    }

    pub fn search_url(&self, query: &str, region: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.trim().as_bytes()).collect();
        let slug = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-");
        let region: String = url::form_urlencoded::byte_serialize(region.trim().as_bytes()).collect();
        self.spec
            .search_url
            .replace("{query_slug}", &slug)
            .replace("{query}", &encoded)
            .replace("{region}", &region)
    }

    /// Pull up to `limit` raw records out of a listing page. Cards without a
    /// title are skipped; everything else is passed through untouched.
    ///
    /// A page with cards but no readable title on any of them means the
    /// markup no longer matches the selectors and is reported as a parse
    /// failure. A page with no cards at all is an empty result.
    pub fn parse_page(
        &self,
        html: &str,
        base: &Url,
        limit: usize,
    ) -> Result<Vec<RawListing>, AdapterError> {
        let doc = Html::parse_document(html);
        let sel = &self.selectors;
        let read = |f: &Option<Field>, card: &ElementRef<'_>| f.as_ref().and_then(|f| f.read(card));

        let mut cards = 0usize;
        let listings: Vec<RawListing> = doc
            .select(&sel.item)
            .inspect(|_| cards += 1)
            .filter_map(|card| {
                let title = sel.title.read(&card)?;
                let url = sel
                    .link
                    .read(&card)
                    .and_then(|href| base.join(&href).ok())
                    .map(|u| u.to_string());
                Some(RawListing {
                    source: self.spec.name.clone(),
                    title,
                    price: sel.price.read(&card),
                    currency: read(&sel.currency, &card).or_else(|| self.spec.currency.clone()),
                    rating: read(&sel.rating, &card),
                    reviews: read(&sel.reviews, &card),
                    delivery: read(&sel.delivery, &card),
                    seller_name: read(&sel.seller_name, &card),
                    seller_level: read(&sel.seller_level, &card),
                    description: read(&sel.description, &card),
                    url,
                    category: None,
                })
            })
            .take(limit)
            .collect();

        if listings.is_empty() && cards > 0 {
            return Err(AdapterError::parse(
                &self.spec.name,
                format!("{cards} cards matched but none had a title"),
            ));
        }
        Ok(listings)
    }
}

#[async_trait]
impl SourceAdapter for HtmlAdapter {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn extract(&self, request: &ExtractRequest) -> Result<Vec<RawListing>, AdapterError> {
        let name = self.spec.name.as_str();
        let target = self.search_url(&request.query, &request.region);
        let base = Url::parse(&target).map_err(|e| AdapterError::fetch(name, e.to_string()))?;

        let resp = self
            .client
            .get(base.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdapterError::timeout(name, request.timeout)
                } else {
                    AdapterError::fetch(name, e.to_string())
                }
            })?;

        let status = resp.status();
        if matches!(status.as_u16(), 401 | 403 | 429) {
            return Err(AdapterError::blocked(name, format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(AdapterError::fetch(name, format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| AdapterError::fetch(name, format!("reading body: {e}")))?;

        let listings = self.parse_page(&body, &base, request.limit)?;
        tracing::debug!(target: "sources", adapter = name, count = listings.len(), "parsed listing page");
        Ok(listings)
    }
}
