//! Normalized per-kind records returned to callers.
//!
//! Each kind has a fixed field set. Absent values serialize as `null`;
//! nothing is skipped and no metric is defaulted to zero.

use serde::Serialize;
use std::collections::BTreeMap;

use super::entity::EntityKind;
use super::raw::*;

/// Strip the provider's URL prefix from an entity ID, plus `continents/`-style segments
pub fn clean_id(id: Option<&str>) -> Option<String> {
    id.map(|id| {
        let id = id.trim_start_matches("https://openalex.org/");
        id.rsplit('/').next().unwrap_or(id).to_string()
    })
}

/// Rebuild abstract text from the provider's word → positions index
///
/// Words are ordered by position; an empty index yields `None`.
pub fn rebuild_abstract(index: &BTreeMap<String, Vec<usize>>) -> Option<String> {
    let mut words: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |pos| (*pos, word.as_str())))
        .collect();
    if words.is_empty() {
        return None;
    }
    words.sort_unstable();
    Some(
        words
            .into_iter()
            .map(|(_, word)| word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn display(named: Option<&RawNamed>) -> Option<String> {
    named.and_then(|n| n.display_name.clone())
}

fn h_index(stats: Option<&RawSummaryStats>) -> Option<u64> {
    stats.and_then(|s| s.h_index)
}

fn i10_index(stats: Option<&RawSummaryStats>) -> Option<u64> {
    stats.and_then(|s| s.i10_index)
}

fn mean_citedness(stats: Option<&RawSummaryStats>) -> Option<f64> {
    stats.and_then(|s| s.two_year_mean_citedness)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkAuthor {
    pub id: Option<String>,
    pub name: Option<String>,
    pub orcid: Option<String>,
    pub position: Option<String>,
    pub is_corresponding: Option<bool>,
    pub institutions: Vec<String>,
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredLabel {
    pub id: Option<String>,
    pub name: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunderRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub country: Option<String>,
}

/// Funding award of a work
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Award {
    pub funder_id: Option<String>,
    pub funder_name: Option<String>,
    pub award_id: Option<String>,
}

/// Awards from `awards`, falling back to the legacy `grants` list
fn awards(awards: Vec<RawAward>, grants: Vec<RawGrant>) -> Vec<Award> {
    if !awards.is_empty() {
        return awards
            .into_iter()
            .map(|a| Award {
                funder_id: clean_id(a.funder_id.as_deref()),
                funder_name: a.funder_display_name,
                award_id: a.funder_award_id,
            })
            .collect();
    }
    grants
        .into_iter()
        .map(|g| Award {
            funder_id: clean_id(g.funder.as_deref()),
            funder_name: g.funder_display_name,
            award_id: g.award_id,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkRecord {
    pub id: Option<String>,
    pub title: Option<String>,
    pub doi: Option<String>,
    pub publication_year: Option<i32>,
    pub publication_date: Option<String>,
    #[serde(rename = "type")]
    pub work_type: Option<String>,
    pub language: Option<String>,
    pub cited_by_count: Option<u64>,
    pub fwci: Option<f64>,
    pub is_retracted: Option<bool>,
    pub is_oa: Option<bool>,
    pub oa_status: Option<String>,
    pub oa_url: Option<String>,
    pub pdf_url: Option<String>,
    pub landing_page_url: Option<String>,
    pub license: Option<String>,
    pub journal: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub first_author: Option<String>,
    pub authors_count: usize,
    pub authors: Vec<WorkAuthor>,
    pub keywords: Vec<ScoredLabel>,
    pub funders: Vec<FunderRef>,
    pub awards: Vec<Award>,
    pub sustainable_development_goals: Vec<ScoredLabel>,
    pub primary_topic: Option<String>,
    pub field: Option<String>,
    pub domain: Option<String>,
    pub referenced_works_count: Option<u64>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

impl From<RawWork> for WorkRecord {
    fn from(w: RawWork) -> Self {
        let open_access = w.open_access.unwrap_or_default();
        let location = w.primary_location.unwrap_or_default();
        let source = location.source.unwrap_or_default();
        let biblio = w.biblio.unwrap_or_default();
        let topic = w.primary_topic.unwrap_or_default();

        let pages = match (biblio.first_page.as_deref(), biblio.last_page.as_deref()) {
            (Some(first), Some(last)) if first != last => Some(format!("{}-{}", first, last)),
            (Some(page), _) | (None, Some(page)) => Some(page.to_string()),
            (None, None) => None,
        };

        let authors: Vec<WorkAuthor> = w
            .authorships
            .into_iter()
            .map(|a| {
                let author = a.author.unwrap_or_default();
                WorkAuthor {
                    id: clean_id(author.id.as_deref()),
                    name: author.display_name,
                    orcid: author.orcid,
                    position: a.author_position,
                    is_corresponding: a.is_corresponding,
                    institutions: a
                        .institutions
                        .into_iter()
                        .filter_map(|i| i.display_name)
                        .collect(),
                    countries: a.countries,
                }
            })
            .collect();

        Self {
            id: clean_id(w.id.as_deref()),
            title: w.title.or(w.display_name),
            doi: w.doi,
            publication_year: w.publication_year,
            publication_date: w.publication_date,
            work_type: w.work_type,
            language: w.language,
            cited_by_count: w.cited_by_count,
            fwci: w.fwci,
            is_retracted: w.is_retracted,
            is_oa: open_access.is_oa,
            oa_status: open_access.oa_status,
            oa_url: open_access.oa_url,
            pdf_url: location.pdf_url,
            landing_page_url: location.landing_page_url,
            license: location.license,
            journal: source.display_name,
            publisher: source.host_organization_name,
            volume: biblio.volume,
            issue: biblio.issue,
            pages,
            first_author: authors.first().and_then(|a| a.name.clone()),
            authors_count: authors.len(),
            authors,
            keywords: w
                .keywords
                .into_iter()
                .take(15)
                .map(|k| ScoredLabel {
                    id: clean_id(k.id.as_deref()),
                    name: k.display_name,
                    score: k.score,
                })
                .collect(),
            funders: w
                .funders
                .into_iter()
                .map(|f| FunderRef {
                    id: clean_id(f.id.as_deref()),
                    name: f.display_name,
                    country: f.country_code,
                })
                .collect(),
            awards: awards(w.awards, w.grants),
            sustainable_development_goals: w
                .sustainable_development_goals
                .into_iter()
                .map(|s| ScoredLabel {
                    id: s.id,
                    name: s.display_name,
                    score: s.score,
                })
                .collect(),
            primary_topic: topic.display_name,
            field: display(topic.field.as_ref()),
            domain: display(topic.domain.as_ref()),
            referenced_works_count: w.referenced_works_count,
            abstract_text: w.abstract_inverted_index.as_ref().and_then(rebuild_abstract),
        }
    }
}

/// Compact work used in related-entity expansions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkSummary {
    pub id: Option<String>,
    pub title: Option<String>,
    pub doi: Option<String>,
    pub publication_year: Option<i32>,
    pub cited_by_count: Option<u64>,
    pub first_author: Option<String>,
    pub journal: Option<String>,
}

impl From<RawWork> for WorkSummary {
    fn from(w: RawWork) -> Self {
        let first_author = w
            .authorships
            .first()
            .and_then(|a| a.author.as_ref())
            .and_then(|a| a.display_name.clone());
        let journal = w
            .primary_location
            .and_then(|l| l.source)
            .and_then(|s| s.display_name);
        Self {
            id: clean_id(w.id.as_deref()),
            title: w.title.or(w.display_name),
            doi: w.doi,
            publication_year: w.publication_year,
            cited_by_count: w.cited_by_count,
            first_author,
            journal,
        }
    }
}

/// Compact author used in related-entity expansions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorSummary {
    pub id: Option<String>,
    pub name: Option<String>,
    pub orcid: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub h_index: Option<u64>,
}

impl From<RawAuthor> for AuthorSummary {
    fn from(a: RawAuthor) -> Self {
        Self {
            id: clean_id(a.id.as_deref()),
            name: a.display_name,
            orcid: a.orcid,
            works_count: a.works_count,
            cited_by_count: a.cited_by_count,
            h_index: h_index(a.summary_stats.as_ref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub orcid: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub h_index: Option<u64>,
    pub i10_index: Option<u64>,
    pub two_year_mean_citedness: Option<f64>,
    pub affiliations: Vec<String>,
    pub last_known_institutions: Vec<String>,
    pub topics: Vec<String>,
    /// Most cited works, filled only when expansion was requested
    pub top_works: Option<Vec<WorkSummary>>,
}

impl From<RawAuthor> for AuthorRecord {
    fn from(a: RawAuthor) -> Self {
        let stats = a.summary_stats.as_ref();
        Self {
            id: clean_id(a.id.as_deref()),
            name: a.display_name,
            orcid: a.orcid,
            works_count: a.works_count,
            cited_by_count: a.cited_by_count,
            h_index: h_index(stats),
            i10_index: i10_index(stats),
            two_year_mean_citedness: mean_citedness(stats),
            affiliations: a
                .affiliations
                .into_iter()
                .filter_map(|aff| aff.institution.and_then(|i| i.display_name))
                .take(5)
                .collect(),
            last_known_institutions: a
                .last_known_institutions
                .into_iter()
                .filter_map(|i| i.display_name)
                .collect(),
            topics: a
                .topics
                .into_iter()
                .filter_map(|t| t.display_name)
                .take(5)
                .collect(),
            top_works: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub issn_l: Option<String>,
    pub issn: Vec<String>,
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    pub publisher: Option<String>,
    pub country: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub h_index: Option<u64>,
    pub two_year_mean_citedness: Option<f64>,
    pub is_oa: Option<bool>,
    pub is_in_doaj: Option<bool>,
    pub apc_usd: Option<u64>,
    pub homepage: Option<String>,
    /// Most cited works published here, filled only when expansion was requested
    pub top_works: Option<Vec<WorkSummary>>,
}

impl From<RawSource> for SourceRecord {
    fn from(s: RawSource) -> Self {
        let stats = s.summary_stats.as_ref();
        Self {
            id: clean_id(s.id.as_deref()),
            name: s.display_name,
            issn_l: s.issn_l,
            issn: s.issn,
            source_type: s.source_type,
            publisher: s.host_organization_name,
            country: s.country_code,
            works_count: s.works_count,
            cited_by_count: s.cited_by_count,
            h_index: h_index(stats),
            two_year_mean_citedness: mean_citedness(stats),
            is_oa: s.is_oa,
            is_in_doaj: s.is_in_doaj,
            apc_usd: s.apc_usd,
            homepage: s.homepage_url,
            top_works: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstitutionRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub ror: Option<String>,
    #[serde(rename = "type")]
    pub institution_type: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub h_index: Option<u64>,
    pub homepage: Option<String>,
    /// Most cited affiliated authors, filled only when expansion was requested
    pub top_authors: Option<Vec<AuthorSummary>>,
}

impl From<RawInstitution> for InstitutionRecord {
    fn from(i: RawInstitution) -> Self {
        let geo = i.geo.unwrap_or_default();
        Self {
            id: clean_id(i.id.as_deref()),
            name: i.display_name,
            ror: i.ror,
            institution_type: i.institution_type,
            country: i.country_code,
            city: geo.city,
            region: geo.region,
            latitude: geo.latitude,
            longitude: geo.longitude,
            works_count: i.works_count,
            cited_by_count: i.cited_by_count,
            h_index: h_index(i.summary_stats.as_ref()),
            homepage: i.homepage_url,
            top_authors: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub subfield: Option<String>,
    pub field: Option<String>,
    pub domain: Option<String>,
    pub keywords: Vec<String>,
    /// Representative works, filled only when expansion was requested
    pub top_works: Option<Vec<WorkSummary>>,
}

impl From<RawTopic> for TopicRecord {
    fn from(t: RawTopic) -> Self {
        Self {
            id: clean_id(t.id.as_deref()),
            name: t.display_name,
            description: t.description,
            works_count: t.works_count,
            cited_by_count: t.cited_by_count,
            subfield: display(t.subfield.as_ref()),
            field: display(t.field.as_ref()),
            domain: display(t.domain.as_ref()),
            keywords: t.keywords.into_iter().take(10).collect(),
            top_works: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublisherRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub hierarchy_level: Option<u32>,
    pub countries: Vec<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub h_index: Option<u64>,
    pub homepage: Option<String>,
}

impl From<RawPublisher> for PublisherRecord {
    fn from(p: RawPublisher) -> Self {
        Self {
            id: clean_id(p.id.as_deref()),
            name: p.display_name,
            hierarchy_level: p.hierarchy_level,
            countries: p.country_codes,
            works_count: p.works_count,
            cited_by_count: p.cited_by_count,
            h_index: h_index(p.summary_stats.as_ref()),
            homepage: p.homepage_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunderRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub grants_count: Option<u64>,
    pub h_index: Option<u64>,
    pub homepage: Option<String>,
    /// Most cited funded works, filled only when expansion was requested
    pub top_works: Option<Vec<WorkSummary>>,
}

impl From<RawFunder> for FunderRecord {
    fn from(f: RawFunder) -> Self {
        Self {
            id: clean_id(f.id.as_deref()),
            name: f.display_name,
            country: f.country_code,
            description: f.description,
            works_count: f.works_count,
            cited_by_count: f.cited_by_count,
            grants_count: f.grants_count,
            h_index: h_index(f.summary_stats.as_ref()),
            homepage: f.homepage_url,
            top_works: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinentRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
    pub countries: Vec<String>,
}

impl From<RawContinent> for ContinentRecord {
    fn from(c: RawContinent) -> Self {
        Self {
            id: clean_id(c.id.as_deref()),
            name: c.display_name,
            works_count: c.works_count,
            cited_by_count: c.cited_by_count,
            countries: c.countries.into_iter().filter_map(|n| n.display_name).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub continent: Option<String>,
    pub is_global_south: Option<bool>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
}

impl From<RawCountry> for CountryRecord {
    fn from(c: RawCountry) -> Self {
        let id = clean_id(c.id.as_deref());
        let code = c.country_code.or_else(|| {
            id.as_deref()
                .and_then(|id| id.rsplit('/').next())
                .map(str::to_ascii_uppercase)
        });
        Self {
            id,
            name: c.display_name,
            code,
            continent: display(c.continent.as_ref()),
            is_global_south: c.is_global_south,
            works_count: c.works_count,
            cited_by_count: c.cited_by_count,
        }
    }
}

/// One normalized entity, tagged with its kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity_type", rename_all = "lowercase")]
pub enum NormalizedRecord {
    Work(WorkRecord),
    Author(AuthorRecord),
    Source(SourceRecord),
    Institution(InstitutionRecord),
    Topic(TopicRecord),
    Publisher(PublisherRecord),
    Funder(FunderRecord),
    Continent(ContinentRecord),
    Country(CountryRecord),
}

/// Related entities fetched by an expansion
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    Works(Vec<WorkSummary>),
    Authors(Vec<AuthorSummary>),
}

impl NormalizedRecord {
    /// Deserialize a provider payload of `kind` and normalize it
    pub fn from_value(kind: EntityKind, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            EntityKind::Work => NormalizedRecord::Work(serde_json::from_value::<RawWork>(value)?.into()),
            EntityKind::Author => {
                NormalizedRecord::Author(serde_json::from_value::<RawAuthor>(value)?.into())
            }
            EntityKind::Source => {
                NormalizedRecord::Source(serde_json::from_value::<RawSource>(value)?.into())
            }
            EntityKind::Institution => {
                NormalizedRecord::Institution(serde_json::from_value::<RawInstitution>(value)?.into())
            }
            EntityKind::Topic => NormalizedRecord::Topic(serde_json::from_value::<RawTopic>(value)?.into()),
            EntityKind::Publisher => {
                NormalizedRecord::Publisher(serde_json::from_value::<RawPublisher>(value)?.into())
            }
            EntityKind::Funder => {
                NormalizedRecord::Funder(serde_json::from_value::<RawFunder>(value)?.into())
            }
            EntityKind::Continent => {
                NormalizedRecord::Continent(serde_json::from_value::<RawContinent>(value)?.into())
            }
            EntityKind::Country => {
                NormalizedRecord::Country(serde_json::from_value::<RawCountry>(value)?.into())
            }
        })
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            NormalizedRecord::Work(_) => EntityKind::Work,
            NormalizedRecord::Author(_) => EntityKind::Author,
            NormalizedRecord::Source(_) => EntityKind::Source,
            NormalizedRecord::Institution(_) => EntityKind::Institution,
            NormalizedRecord::Topic(_) => EntityKind::Topic,
            NormalizedRecord::Publisher(_) => EntityKind::Publisher,
            NormalizedRecord::Funder(_) => EntityKind::Funder,
            NormalizedRecord::Continent(_) => EntityKind::Continent,
            NormalizedRecord::Country(_) => EntityKind::Country,
        }
    }

    /// Cleaned native ID
    pub fn id(&self) -> Option<&str> {
        match self {
            NormalizedRecord::Work(r) => r.id.as_deref(),
            NormalizedRecord::Author(r) => r.id.as_deref(),
            NormalizedRecord::Source(r) => r.id.as_deref(),
            NormalizedRecord::Institution(r) => r.id.as_deref(),
            NormalizedRecord::Topic(r) => r.id.as_deref(),
            NormalizedRecord::Publisher(r) => r.id.as_deref(),
            NormalizedRecord::Funder(r) => r.id.as_deref(),
            NormalizedRecord::Continent(r) => r.id.as_deref(),
            NormalizedRecord::Country(r) => r.id.as_deref(),
        }
    }

    /// Attach an expansion; returns false when the record has no slot for it
    pub fn attach_related(&mut self, related: Related) -> bool {
        match (self, related) {
            (NormalizedRecord::Author(r), Related::Works(works)) => r.top_works = Some(works),
            (NormalizedRecord::Source(r), Related::Works(works)) => r.top_works = Some(works),
            (NormalizedRecord::Topic(r), Related::Works(works)) => r.top_works = Some(works),
            (NormalizedRecord::Funder(r), Related::Works(works)) => r.top_works = Some(works),
            (NormalizedRecord::Institution(r), Related::Authors(authors)) => {
                r.top_authors = Some(authors)
            }
            _ => return false,
        }
        true
    }
}
