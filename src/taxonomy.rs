//! Business taxonomy: which kind of business is asking for prices.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessKind {
    Digital,
    Physical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferingKind {
    Product,
    Service,
}

impl BusinessKind {
    pub const ALL: [BusinessKind; 2] = [BusinessKind::Digital, BusinessKind::Physical];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Digital => "digital",
            Self::Physical => "physical",
        }
    }
}

impl OfferingKind {
    pub const ALL: [OfferingKind; 2] = [OfferingKind::Product, OfferingKind::Service];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Service => "service",
        }
    }
}

impl FromStr for BusinessKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "digital" => Ok(Self::Digital),
            "physical" => Ok(Self::Physical),
            _ => Err(Error::validation(
                "business_type must be 'digital' or 'physical'",
            )),
        }
    }
}

impl FromStr for OfferingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "product" => Ok(Self::Product),
            "service" => Ok(Self::Service),
            _ => Err(Error::validation(
                "offering_type must be 'product' or 'service'",
            )),
        }
    }
}

/// (business kind, offering kind) pair selecting the marketplaces to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxonomyKey {
    pub business: BusinessKind,
    pub offering: OfferingKind,
}

impl TaxonomyKey {
    pub const fn new(business: BusinessKind, offering: OfferingKind) -> Self {
        Self { business, offering }
    }

    /// Validate raw request strings against the closed enums.
    pub fn parse(business: &str, offering: &str) -> Result<Self, Error> {
        Ok(Self {
            business: business.parse()?,
            offering: offering.parse()?,
        })
    }

    pub fn all() -> impl Iterator<Item = TaxonomyKey> {
        BusinessKind::ALL.into_iter().flat_map(|b| {
            OfferingKind::ALL
                .into_iter()
                .map(move |o| TaxonomyKey::new(b, o))
        })
    }

    /// Config-file spelling, e.g. `digital_service`.
    pub fn config_key(&self) -> String {
        format!("{}_{}", self.business.as_str(), self.offering.as_str())
    }

    pub fn from_config_key(key: &str) -> Result<Self, Error> {
        let (b, o) = key
            .trim()
            .split_once(['_', '/', ':'])
            .ok_or_else(|| Error::configuration(format!("malformed taxonomy key '{key}'")))?;
        Self::parse(b, o).map_err(|e| Error::configuration(format!("taxonomy key '{key}': {e}")))
    }
}

impl fmt::Display for TaxonomyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.business.as_str(), self.offering.as_str())
    }
}
