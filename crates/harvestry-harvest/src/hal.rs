//! HAL adapter.
//!
//! HAL (<https://hal.science>) exposes a Solr-style search API. We
//! query by the person's `id_hal` numeric identifier and normalize the
//! Solr documents: multilang fields carry their language as the field
//! name prefix (`en_title_s`, `fr_abstract_s`), and author mentions
//! arrive in `authFullNameFormIDPersonIDIDHal_fs` as
//! `Full Name_FacetSep_formId-personId_FacetSep_idHal` triples; an
//! empty trailing idHal means the author has no HAL identity and the
//! mention is name-only.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use harvestry_core::model::{IdentifierKind, Manifestation, Person, Reference};

use crate::error::{HarvestError, HarvestResult};
use crate::harvester::{Harvester, NormalizedReference, RawDocument};
use crate::identity::ContributorMention;
use crate::resilience::RateLimiter;

pub const SOURCE_NAME: &str = "hal";
pub const DEFAULT_API_URL: &str = "https://api.archives-ouvertes.fr/search/";

const FACET_SEP: &str = "_FacetSep_";
const DEFAULT_ROLE: &str = "aut";
const ROWS: u32 = 1000;

/// Document types worth harvesting; everything else is filtered out
/// server-side.
const DOC_TYPES: [&str; 9] = [
    "ART",
    "OUV",
    "COUV",
    "COMM",
    "THESE",
    "HDR",
    "REPORT",
    "NOTICE",
    "PROCEEDINGS",
];

const FIELDS: [&str; 10] = [
    "docid",
    "halId_s",
    "*_title_s",
    "*_abstract_s",
    "uri_s",
    "fileMain_s",
    "files_s",
    "authFullNameFormIDPersonIDIDHal_fs",
    "authQuality_s",
    "docType_s",
];

fn http_error(message: impl Into<String>) -> HarvestError {
    HarvestError::Http {
        source_name: SOURCE_NAME.to_string(),
        message: message.into(),
    }
}

fn parse_error(message: impl Into<String>) -> HarvestError {
    HarvestError::Parse {
        source_name: SOURCE_NAME.to_string(),
        message: message.into(),
    }
}

/// Harvester for the HAL open archive.
#[derive(Debug)]
pub struct HalHarvester {
    http: Client,
    api_url: String,
    rate_limiter: RateLimiter,
}

impl HalHarvester {
    /// Create a HAL harvester against the given API endpoint.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("harvestry/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.into(),
            rate_limiter: RateLimiter::new(5),
        })
    }

    /// Multilang string values matching `*{suffix}`, paired with the
    /// language taken from the field name prefix.
    fn multilang_values(payload: &Value, suffix: &str) -> Vec<(String, Option<String>)> {
        let Some(object) = payload.as_object() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (field, value) in object {
            let Some(prefix) = field.strip_suffix(suffix) else {
                continue;
            };
            let language = (!prefix.is_empty()).then(|| prefix.to_string());
            match value {
                Value::Array(values) => {
                    out.extend(
                        values
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|v| (v.to_string(), language.clone())),
                    );
                }
                Value::String(v) => out.push((v.clone(), language)),
                _ => {}
            }
        }
        out
    }

    fn string_list(payload: &Value, field: &str) -> Vec<String> {
        match payload.get(field) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            Some(Value::String(v)) => vec![v.clone()],
            _ => Vec::new(),
        }
    }

    /// Parse one `authFullNameFormIDPersonIDIDHal_fs` entry into a
    /// contributor mention. The trailing idHal segment may be empty.
    fn parse_author(entry: &str, role: &str) -> Option<ContributorMention> {
        let mut parts = entry.split(FACET_SEP);
        let name = parts.next()?.trim();
        if name.is_empty() {
            return None;
        }
        let id_hal = parts.nth(1).map(str::trim).filter(|s| !s.is_empty());
        Some(ContributorMention::new(id_hal.map(String::from), name).with_role(role))
    }

    fn contributor_mentions(payload: &Value) -> Vec<ContributorMention> {
        let authors = Self::string_list(payload, "authFullNameFormIDPersonIDIDHal_fs");
        let qualities = Self::string_list(payload, "authQuality_s");
        authors
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let role = qualities.get(i).map_or(DEFAULT_ROLE, String::as_str);
                Self::parse_author(entry, role)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Harvester for HalHarvester {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn is_relevant(&self, person: &Person) -> bool {
        person.identifier(IdentifierKind::IdHal).is_some()
    }

    async fn fetch(&self, person: &Person) -> HarvestResult<Vec<RawDocument>> {
        let id_hal =
            person
                .identifier(IdentifierKind::IdHal)
                .ok_or(HarvestError::MissingIdentifier {
                    source_name: SOURCE_NAME.to_string(),
                    kind: "id_hal",
                })?;

        self.rate_limiter.acquire().await;

        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("q", format!("authIdHal_i:{id_hal}")),
                ("fq", format!("docType_s:({})", DOC_TYPES.join(" OR "))),
                ("fl", FIELDS.join(",")),
                ("sort", "halId_s asc".to_string()),
                ("rows", ROWS.to_string()),
                ("wt", "json".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(HarvestError::RateLimited {
                source_name: SOURCE_NAME.to_string(),
            });
        }
        if !status.is_success() {
            return Err(http_error(format!("status {status}")));
        }

        let body: Value = response.json().await?;
        let docs = body
            .get("response")
            .and_then(|r| r.get("docs"))
            .and_then(Value::as_array)
            .ok_or_else(|| parse_error("missing response.docs in payload"))?;

        Ok(docs.iter().cloned().map(RawDocument::new).collect())
    }

    fn normalize(
        &self,
        person: &Person,
        document: &RawDocument,
    ) -> HarvestResult<NormalizedReference> {
        let payload = &document.payload;

        // docid arrives as either a JSON number or a string.
        let docid = match payload.get("docid") {
            Some(Value::String(v)) => v.clone(),
            Some(Value::Number(v)) => v.to_string(),
            _ => return Err(parse_error("missing docid")),
        };

        let mut reference = Reference::new(SOURCE_NAME, docid, person.id);

        for (value, language) in Self::multilang_values(payload, "_title_s") {
            reference = reference.with_title(value, language.as_deref());
        }
        for (value, language) in Self::multilang_values(payload, "_abstract_s") {
            reference = reference.with_abstract(value, language.as_deref());
        }

        if let Some(doc_type) = payload.get("docType_s").and_then(Value::as_str) {
            reference = reference.with_document_type(doc_type);
        }

        if let Some(uri) = payload.get("uri_s").and_then(Value::as_str) {
            let mut manifestation = Manifestation::new(uri);
            if let Some(main_file) = payload.get("fileMain_s").and_then(Value::as_str) {
                manifestation = manifestation.with_download_url(main_file);
            }
            manifestation.additional_files = Self::string_list(payload, "files_s");
            reference = reference.with_manifestation(manifestation);
        }

        Ok(NormalizedReference {
            reference,
            contributors: Self::contributor_mentions(payload),
        })
    }
}
