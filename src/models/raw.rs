//! Provider payload shapes, as deserialized from the wire.
//!
//! Every field is optional and every list defaults to empty (the provider
//! sends `null` for some of them), so a sparse or `select`-ed payload still
//! deserializes.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Treat `null` like a missing field
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawNamed {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSummaryStats {
    pub h_index: Option<u64>,
    pub i10_index: Option<u64>,
    #[serde(rename = "2yr_mean_citedness")]
    pub two_year_mean_citedness: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawOpenAccess {
    pub is_oa: Option<bool>,
    pub oa_status: Option<String>,
    pub oa_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSourceRef {
    pub display_name: Option<String>,
    pub host_organization_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLocation {
    pub source: Option<RawSourceRef>,
    pub landing_page_url: Option<String>,
    pub pdf_url: Option<String>,
    pub license: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBiblio {
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub first_page: Option<String>,
    pub last_page: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAuthorRef {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawInstitutionRef {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAuthorship {
    pub author: Option<RawAuthorRef>,
    pub author_position: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub institutions: Vec<RawInstitutionRef>,
    #[serde(deserialize_with = "nullable")]
    pub countries: Vec<String>,
    pub is_corresponding: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawScored {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFunderRef {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub country_code: Option<String>,
}

/// Legacy `grants` entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawGrant {
    pub funder: Option<String>,
    pub funder_display_name: Option<String>,
    pub award_id: Option<String>,
}

/// `awards` entry, which replaces `grants` in newer payloads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAward {
    pub funder_id: Option<String>,
    pub funder_display_name: Option<String>,
    pub funder_award_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTopicRef {
    pub display_name: Option<String>,
    pub field: Option<RawNamed>,
    pub domain: Option<RawNamed>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawWork {
    pub id: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub display_name: Option<String>,
    pub publication_year: Option<i32>,
    pub publication_date: Option<String>,
    #[serde(rename = "type")]
    pub work_type: Option<String>,
    pub language: Option<String>,
    pub cited_by_count: Option<u64>,
    pub fwci: Option<f64>,
    pub is_retracted: Option<bool>,
    pub open_access: Option<RawOpenAccess>,
    pub primary_location: Option<RawLocation>,
    pub biblio: Option<RawBiblio>,
    #[serde(deserialize_with = "nullable")]
    pub authorships: Vec<RawAuthorship>,
    #[serde(deserialize_with = "nullable")]
    pub keywords: Vec<RawScored>,
    #[serde(deserialize_with = "nullable")]
    pub funders: Vec<RawFunderRef>,
    #[serde(deserialize_with = "nullable")]
    pub grants: Vec<RawGrant>,
    #[serde(deserialize_with = "nullable")]
    pub awards: Vec<RawAward>,
    #[serde(deserialize_with = "nullable")]
    pub sustainable_development_goals: Vec<RawScored>,
    pub primary_topic: Option<RawTopicRef>,
    pub referenced_works_count: Option<u64>,
    pub abstract_inverted_index: Option<BTreeMap<String, Vec<usize>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAffiliation {
    pub institution: Option<RawInstitutionRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAuthor {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub orcid: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub summary_stats: Option<RawSummaryStats>,
    #[serde(deserialize_with = "nullable")]
    pub affiliations: Vec<RawAffiliation>,
    #[serde(deserialize_with = "nullable")]
    pub last_known_institutions: Vec<RawInstitutionRef>,
    #[serde(deserialize_with = "nullable")]
    pub topics: Vec<RawTopicRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSource {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub issn_l: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub issn: Vec<String>,
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    pub host_organization_name: Option<String>,
    pub country_code: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub summary_stats: Option<RawSummaryStats>,
    pub is_oa: Option<bool>,
    pub is_in_doaj: Option<bool>,
    pub apc_usd: Option<u64>,
    pub homepage_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawGeo {
    pub city: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawInstitution {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub ror: Option<String>,
    #[serde(rename = "type")]
    pub institution_type: Option<String>,
    pub country_code: Option<String>,
    pub geo: Option<RawGeo>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub summary_stats: Option<RawSummaryStats>,
    pub homepage_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTopic {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub subfield: Option<RawNamed>,
    pub field: Option<RawNamed>,
    pub domain: Option<RawNamed>,
    #[serde(deserialize_with = "nullable")]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPublisher {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub hierarchy_level: Option<u32>,
    #[serde(deserialize_with = "nullable")]
    pub country_codes: Vec<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub summary_stats: Option<RawSummaryStats>,
    pub homepage_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFunder {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub country_code: Option<String>,
    pub description: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub grants_count: Option<u64>,
    pub summary_stats: Option<RawSummaryStats>,
    pub homepage_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawContinent {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    #[serde(deserialize_with = "nullable")]
    pub countries: Vec<RawNamed>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCountry {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub country_code: Option<String>,
    pub continent: Option<RawNamed>,
    pub is_global_south: Option<bool>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
}

/// Listing metadata block
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawMeta {
    pub count: Option<u64>,
    pub page: Option<u32>,
    pub next_cursor: Option<String>,
}

/// One bucket of a `group_by` answer
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawGroup {
    pub key: Option<serde_json::Value>,
    pub key_display_name: Option<serde_json::Value>,
    pub count: Option<u64>,
}

/// Listing envelope; results stay untyped until the kind is applied
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawListing {
    pub meta: RawMeta,
    #[serde(deserialize_with = "nullable")]
    pub results: Vec<serde_json::Value>,
    #[serde(deserialize_with = "nullable")]
    pub group_by: Vec<RawGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nulls_and_missing_fields() {
        let work: RawWork = serde_json::from_value(json!({
            "id": "https://openalex.org/W1",
            "authorships": null,
            "fwci": null,
            "abstract_inverted_index": null
        }))
        .unwrap();
        assert!(work.authorships.is_empty());
        assert!(work.fwci.is_none());
        assert!(work.abstract_inverted_index.is_none());
        assert!(work.title.is_none());
    }

    #[test]
    fn test_summary_stats_rename() {
        let author: RawAuthor = serde_json::from_value(json!({
            "summary_stats": {"h_index": 0, "2yr_mean_citedness": 1.5}
        }))
        .unwrap();
        let stats = author.summary_stats.unwrap();
        assert_eq!(stats.h_index, Some(0));
        assert_eq!(stats.two_year_mean_citedness, Some(1.5));
    }

    #[test]
    fn test_listing_without_next_cursor() {
        let listing: RawListing = serde_json::from_value(json!({
            "meta": {"count": 3, "per_page": 25, "next_cursor": null},
            "results": [{"id": "W1"}]
        }))
        .unwrap();
        assert_eq!(listing.meta.count, Some(3));
        assert!(listing.meta.next_cursor.is_none());
        assert_eq!(listing.results.len(), 1);
        assert!(listing.group_by.is_empty());
    }
}
