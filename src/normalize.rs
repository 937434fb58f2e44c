//! Field normalizer: raw marketplace strings → canonical listing fields.
//!
//! Every field rule is total: on bad input it returns a safe default
//! (`0.0`, `0`, `None`). The only way a record is rejected is the record-level
//! gate in [`Normalizer::normalize`] (non-positive price or empty title).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::listing::{Listing, RawListing};

pub const DEFAULT_DESCRIPTION_LIMIT: usize = 200;
/// Ratings above 5 are assumed to be on a 10-point scale and divided by this.
pub const DEFAULT_TEN_POINT_DIVISOR: f64 = 2.0;
pub const MAX_RATING: f64 = 5.0;
pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub ten_point_divisor: f64,
    pub description_limit: usize,
    pub default_currency: String,
    /// Lowercase source id → currency used when the adapter gives no usable hint.
    pub source_currencies: HashMap<String, String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        let source_currencies = [("indiamart", "INR"), ("justdial", "INR"), ("urbanclap", "INR")]
            .into_iter()
            .map(|(s, c)| (s.to_string(), c.to_string()))
            .collect();
        Self {
            ten_point_divisor: DEFAULT_TEN_POINT_DIVISOR,
            description_limit: DEFAULT_DESCRIPTION_LIMIT,
            default_currency: DEFAULT_CURRENCY.to_string(),
            source_currencies,
        }
    }
}

/// Stateless apart from its configuration; cheap to share behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    cfg: NormalizerConfig,
}

impl Normalizer {
    pub fn new(cfg: NormalizerConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.cfg
    }

    /// Normalize one raw record collected under `category`.
    /// `scraped_at` always comes from the caller; nothing in `raw` can set it.
    /// Returns `None` when the record fails the price/title gate.
    pub fn normalize(
        &self,
        raw: &RawListing,
        category: &str,
        scraped_at: DateTime<Utc>,
    ) -> Option<Listing> {
        let title = clean_text(&raw.title);
        let price = raw.price.as_deref().map(parse_price).unwrap_or(0.0);
        if title.is_empty() || price <= 0.0 {
            return None;
        }

        let source = raw.source.trim().to_string();
        let currency = self.currency_for(&source, raw.currency.as_deref(), raw.price.as_deref());

        Some(Listing {
            title,
            price,
            currency,
            rating: raw
                .rating
                .as_deref()
                .and_then(|r| parse_rating(r, self.cfg.ten_point_divisor)),
            reviews: raw.reviews.as_deref().map(parse_reviews).unwrap_or(0),
            delivery_days: raw.delivery.as_deref().and_then(parse_delivery_days),
            seller_name: clean_optional(raw.seller_name.as_deref()),
            seller_level: clean_optional(raw.seller_level.as_deref()),
            description: raw
                .description
                .as_deref()
                .and_then(|d| truncate_description(d, self.cfg.description_limit)),
            category: category.trim().to_string(),
            url: raw
                .url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            scraped_at,
            source,
        })
    }

    /// Explicit 3-letter hint wins, then a currency symbol found in the hint or
    /// price text, then the per-source default, then the global default.
    pub fn currency_for(&self, source: &str, hint: Option<&str>, price_text: Option<&str>) -> String {
        if let Some(code) = hint.map(str::trim).filter(|h| is_currency_code(h)) {
            return code.to_ascii_uppercase();
        }
        for text in [hint, price_text].into_iter().flatten() {
            if let Some(code) = currency_from_symbol(text) {
                return code.to_string();
            }
        }
        self.cfg
            .source_currencies
            .get(&source.trim().to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| self.cfg.default_currency.clone())
    }
}

fn is_currency_code(s: &str) -> bool {
    s.len() == 3 && s.chars().all(|c| c.is_ascii_alphabetic())
}

fn currency_from_symbol(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    if text.contains('₹') || lower.contains("rs.") || lower.contains("inr") {
        Some("INR")
    } else if text.contains('€') {
        Some("EUR")
    } else if text.contains('£') {
        Some("GBP")
    } else if text.contains('$') {
        Some("USD")
    } else {
        None
    }
}

fn re_first_amount() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?|\.\d+").expect("amount regex"))
}

fn re_first_decimal() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("decimal regex"))
}

fn re_whitespace() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

/// `"$1,200.50"` → `1200.5`, `"₹5,000 / Piece"` → `5000.0`, `"$.99"` → `0.99`.
/// Currency symbols, unit text and thousands separators are dropped; the
/// first amount in the text wins. Unparseable or negative → `0.0`.
pub fn parse_price(raw: &str) -> f64 {
    let Some(m) = re_first_amount().find(raw) else {
        return 0.0;
    };
    let mut digits: String = m.as_str().chars().filter(|c| *c != ',').collect();
    if digits.starts_with('.') {
        digits.insert(0, '0');
    }
    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => 0.0,
    }
}

/// Parse a rating onto the 0–5 scale. Values above 5 are treated as 10-point
/// input and divided by `ten_point_divisor`; the result is clipped to `[0, 5]`.
pub fn parse_rating(raw: &str, ten_point_divisor: f64) -> Option<f64> {
    let m = re_first_decimal().find(raw)?;
    let v = m.as_str().parse::<f64>().ok().filter(|v| v.is_finite())?;
    let divisor = if ten_point_divisor > 0.0 {
        ten_point_divisor
    } else {
        DEFAULT_TEN_POINT_DIVISOR
    };
    let scaled = if v > MAX_RATING { v / divisor } else { v };
    Some(scaled.clamp(0.0, MAX_RATING))
}

/// `"(1,234)"` → `1234`, `"1.2k"` → `1200`. Unparseable → `0`.
pub fn parse_reviews(raw: &str) -> u64 {
    let text: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let Some(m) = re_first_decimal().find(&text) else {
        return 0;
    };
    let Ok(v) = m.as_str().parse::<f64>() else {
        return 0;
    };
    let thousands = text[m.end()..].trim_start().starts_with('k');
    let v = if thousands { v * 1000.0 } else { v };
    if v.is_finite() && v >= 0.0 {
        v.round() as u64
    } else {
        0
    }
}

/// `"3 days"` → 3, `"2 weeks"` → 14, `"1 month"` → 30. No unit keyword → `None`.
pub fn parse_delivery_days(raw: &str) -> Option<u32> {
    let text = raw.to_lowercase();
    let factor = if text.contains("day") {
        1
    } else if text.contains("week") {
        7
    } else if text.contains("month") {
        30
    } else {
        return None;
    };
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<u32>().ok()?.checked_mul(factor)
}

/// Decode HTML entities, collapse whitespace, trim.
pub fn clean_text(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    re_whitespace()
        .replace_all(&decoded, " ")
        .trim()
        .to_string()
}

fn clean_optional(raw: Option<&str>) -> Option<String> {
    raw.map(clean_text).filter(|s| !s.is_empty())
}

/// Clean and cap at `limit` characters (not bytes). Empty → `None`.
pub fn truncate_description(raw: &str, limit: usize) -> Option<String> {
    let cleaned = clean_text(raw);
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.chars().count() <= limit {
        return Some(cleaned);
    }
    let cut: String = cleaned.chars().take(limit).collect();
    Some(cut.trim_end().to_string())
}
