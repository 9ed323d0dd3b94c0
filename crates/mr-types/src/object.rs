//! Domain records stored in containers.
//!
//! Every record is a flat JSON object keyed informally by `name`. Fields the
//! schema knows about are typed; anything else is kept verbatim in `extra`
//! so a read/modify/write cycle never drops data written by other tools.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::container::ContainerName;
use crate::link::LinkMap;

/// A record type that lives in exactly one container.
pub trait ContainerObject: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The container holding records of this type.
    const CONTAINER: ContainerName;

    /// The informal primary key.
    fn name(&self) -> &str;

    /// Links from this record into `target`, if the type carries them.
    fn links(&self, target: ContainerName) -> Option<&LinkMap>;
}

/// A number or free-form string, as found in hand-edited containers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

// Text fields also accept `null`, numbers, and booleans, as written by other
// tools or by `--set zip_postal=94105`.
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!("expected text, found {other}"))),
    }
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") || s.is_empty() => Ok(false),
        other => Err(D::Error::custom(format!("expected true or false, found {other}"))),
    }
}

fn links<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LinkMap, D::Error> {
    Ok(Option::<LinkMap>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    #[serde(default, deserialize_with = "text")]
    pub role: String,
    #[serde(default, deserialize_with = "text")]
    pub company_type: String,
    #[serde(default, deserialize_with = "text")]
    pub region: String,
    #[serde(default, deserialize_with = "text")]
    pub industry: String,
    #[serde(default, deserialize_with = "text")]
    pub industry_code: String,
    #[serde(default, deserialize_with = "text")]
    pub industry_group_code: String,
    #[serde(default, deserialize_with = "text")]
    pub industry_group_description: String,
    #[serde(default, deserialize_with = "text")]
    pub major_group_code: String,
    #[serde(default, deserialize_with = "text")]
    pub major_group_description: String,
    #[serde(default, deserialize_with = "text")]
    pub url: String,
    #[serde(default, deserialize_with = "text")]
    pub logo_url: String,
    #[serde(default, deserialize_with = "text")]
    pub wikipedia_url: String,
    #[serde(default, deserialize_with = "text")]
    pub street_address: String,
    #[serde(default, deserialize_with = "text")]
    pub city: String,
    #[serde(default, deserialize_with = "text")]
    pub state_province: String,
    #[serde(default, deserialize_with = "text")]
    pub country: String,
    #[serde(default, deserialize_with = "text")]
    pub zip_postal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Scalar>,
    #[serde(default, deserialize_with = "text")]
    pub phone: String,
    #[serde(default, deserialize_with = "text")]
    pub cik: String,
    #[serde(default, deserialize_with = "text")]
    pub stock_symbol: String,
    #[serde(default, deserialize_with = "text")]
    pub stock_exchange: String,
    #[serde(default, deserialize_with = "text")]
    pub recent10k_url: String,
    #[serde(default, deserialize_with = "text")]
    pub recent10q_url: String,
    #[serde(default, deserialize_with = "text")]
    pub firmographics_url: String,
    #[serde(default, deserialize_with = "text")]
    pub filings_url: String,
    #[serde(default, deserialize_with = "text")]
    pub owner_transactions: String,
    #[serde(default, deserialize_with = "text")]
    pub google_maps_url: String,
    #[serde(default, deserialize_with = "text")]
    pub google_news_url: String,
    #[serde(default, deserialize_with = "text")]
    pub google_finance_url: String,
    #[serde(default, deserialize_with = "text")]
    pub google_patents_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quadrant: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
    #[serde(default, deserialize_with = "links")]
    pub linked_interactions: LinkMap,
    #[serde(default, deserialize_with = "links")]
    pub linked_studies: LinkMap,
    #[serde(default, deserialize_with = "text")]
    pub creation_date: String,
    #[serde(default, deserialize_with = "text")]
    pub modification_date: String,
    #[serde(default, deserialize_with = "text")]
    pub creator_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Company {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl ContainerObject for Company {
    const CONTAINER: ContainerName = ContainerName::Companies;

    fn name(&self) -> &str {
        &self.name
    }

    fn links(&self, target: ContainerName) -> Option<&LinkMap> {
        match target {
            ContainerName::Interactions => Some(&self.linked_interactions),
            ContainerName::Studies => Some(&self.linked_studies),
            ContainerName::Companies => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    #[serde(default, deserialize_with = "text")]
    pub interaction_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Scalar>,
    #[serde(default, deserialize_with = "text")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_time: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<Scalar>,
    #[serde(default, rename = "abstract", deserialize_with = "text")]
    pub abstract_text: String,
    #[serde(default, deserialize_with = "text")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Value>,
    #[serde(default, deserialize_with = "text")]
    pub url: String,
    #[serde(default, deserialize_with = "text")]
    pub street_address: String,
    #[serde(default, deserialize_with = "text")]
    pub city: String,
    #[serde(default, deserialize_with = "text")]
    pub state_province: String,
    #[serde(default, deserialize_with = "text")]
    pub country: String,
    #[serde(default, deserialize_with = "text")]
    pub zip_postal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Scalar>,
    #[serde(default, deserialize_with = "flag")]
    pub public: bool,
    #[serde(default, deserialize_with = "text")]
    pub contact_name: String,
    #[serde(default, deserialize_with = "text")]
    pub contact_email: String,
    #[serde(default, deserialize_with = "text")]
    pub contact_phone: String,
    #[serde(default, deserialize_with = "text")]
    pub contact_linkedin: String,
    #[serde(default, deserialize_with = "text")]
    pub contact_twitter: String,
    #[serde(default, deserialize_with = "links")]
    pub linked_companies: LinkMap,
    #[serde(default, deserialize_with = "links")]
    pub linked_studies: LinkMap,
    #[serde(default, deserialize_with = "text")]
    pub creation_date: String,
    #[serde(default, deserialize_with = "text")]
    pub modification_date: String,
    #[serde(default, deserialize_with = "text")]
    pub creator_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Interaction {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl ContainerObject for Interaction {
    const CONTAINER: ContainerName = ContainerName::Interactions;

    fn name(&self) -> &str {
        &self.name
    }

    fn links(&self, target: ContainerName) -> Option<&LinkMap> {
        match target {
            ContainerName::Companies => Some(&self.linked_companies),
            ContainerName::Studies => Some(&self.linked_studies),
            ContainerName::Interactions => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Scalar>,
    #[serde(default, deserialize_with = "flag")]
    pub public: bool,
    #[serde(default, deserialize_with = "links")]
    pub linked_companies: LinkMap,
    #[serde(default, deserialize_with = "links")]
    pub linked_interactions: LinkMap,
    #[serde(default, deserialize_with = "text")]
    pub creation_date: String,
    #[serde(default, deserialize_with = "text")]
    pub modification_date: String,
    #[serde(default, deserialize_with = "text")]
    pub creator_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Study {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl ContainerObject for Study {
    const CONTAINER: ContainerName = ContainerName::Studies;

    fn name(&self) -> &str {
        &self.name
    }

    fn links(&self, target: ContainerName) -> Option<&LinkMap> {
        match target {
            ContainerName::Companies => Some(&self.linked_companies),
            ContainerName::Interactions => Some(&self.linked_interactions),
            ContainerName::Studies => None,
        }
    }
}
