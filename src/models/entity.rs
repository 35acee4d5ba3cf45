//! Entity kinds and their per-kind metadata.
//!
//! Everything the compiler, resolver and normalizer need to know about a kind
//! lives here as exhaustive matches, so adding a kind is a compile error until
//! every table covers it.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ApiError;

bitflags::bitflags! {
    /// Alternate identifier schemes a kind accepts besides its native ID
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IdSchemes: u8 {
        const DOI = 1 << 0;
        const ORCID = 1 << 1;
        const ROR = 1 << 2;
        const ISSN = 1 << 3;
        const PMID = 1 << 4;
        const PMCID = 1 << 5;
    }
}

/// The nine top-level collections of the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Work,
    Author,
    Source,
    Institution,
    Topic,
    Publisher,
    Funder,
    Continent,
    Country,
}

/// Value type of a filterable field, which decides the operators it accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Integers and floats: every operator, including ranges
    Numeric,
    /// `true` / `false`, equality only
    Boolean,
    /// ISO dates: equality, negation and comparisons (no ranges, dates contain `-`)
    Date,
    /// Identifiers, codes and search terms: equality, negation, or-sets and and-sets
    Text,
}

/// One entry of a kind's filter allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
}

impl FieldSpec {
    const fn numeric(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Numeric,
        }
    }

    const fn boolean(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Boolean,
        }
    }

    const fn date(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Date,
        }
    }

    const fn text(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Text,
        }
    }
}

/// Which related collection an entity expands into, and through which filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelatedRule {
    /// Collection queried for the related entities
    pub target: EntityKind,
    /// Filter field on the target that points back at the entity
    pub filter_field: &'static str,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Work,
        EntityKind::Author,
        EntityKind::Source,
        EntityKind::Institution,
        EntityKind::Topic,
        EntityKind::Publisher,
        EntityKind::Funder,
        EntityKind::Continent,
        EntityKind::Country,
    ];

    /// Plural collection name used as the request path segment
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Work => "works",
            EntityKind::Author => "authors",
            EntityKind::Source => "sources",
            EntityKind::Institution => "institutions",
            EntityKind::Topic => "topics",
            EntityKind::Publisher => "publishers",
            EntityKind::Funder => "funders",
            EntityKind::Continent => "continents",
            EntityKind::Country => "countries",
        }
    }

    /// Singular name, as used in tool parameters
    pub fn singular(&self) -> &'static str {
        match self {
            EntityKind::Work => "work",
            EntityKind::Author => "author",
            EntityKind::Source => "source",
            EntityKind::Institution => "institution",
            EntityKind::Topic => "topic",
            EntityKind::Publisher => "publisher",
            EntityKind::Funder => "funder",
            EntityKind::Continent => "continent",
            EntityKind::Country => "country",
        }
    }

    /// Letter prefix of native IDs, for kinds whose IDs are `<letter><digits>`
    pub fn id_prefix(&self) -> Option<char> {
        match self {
            EntityKind::Work => Some('W'),
            EntityKind::Author => Some('A'),
            EntityKind::Source => Some('S'),
            EntityKind::Institution => Some('I'),
            EntityKind::Topic => Some('T'),
            EntityKind::Publisher => Some('P'),
            EntityKind::Funder => Some('F'),
            EntityKind::Continent | EntityKind::Country => None,
        }
    }

    /// Whether `value` has the shape of a native ID of this kind
    ///
    /// Continents use Wikidata IDs (`Q15`), countries ISO 3166 alpha-2 codes.
    pub fn is_native_id(&self, value: &str) -> bool {
        match self {
            EntityKind::Continent => prefixed_digits(value, 'Q'),
            EntityKind::Country => {
                value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic())
            }
            _ => self
                .id_prefix()
                .is_some_and(|prefix| prefixed_digits(value, prefix)),
        }
    }

    /// Canonical spelling of a native ID (`w123` becomes `W123`, `us` becomes `US`)
    pub fn canonical_id(&self, value: &str) -> String {
        value.to_ascii_uppercase()
    }

    /// Alternate identifier schemes accepted for lookups of this kind
    pub fn accepted_schemes(&self) -> IdSchemes {
        match self {
            EntityKind::Work => IdSchemes::DOI | IdSchemes::PMID | IdSchemes::PMCID,
            EntityKind::Author => IdSchemes::ORCID,
            EntityKind::Source => IdSchemes::ISSN,
            EntityKind::Institution => IdSchemes::ROR,
            _ => IdSchemes::empty(),
        }
    }

    /// Field holding the publication year, for kinds that have one
    pub fn year_field(&self) -> Option<&'static str> {
        match self {
            EntityKind::Work => Some("publication_year"),
            _ => None,
        }
    }

    /// Field carrying an ISO country code
    pub fn country_field(&self) -> Option<&'static str> {
        match self {
            EntityKind::Work => Some("authorships.countries"),
            EntityKind::Author => Some("affiliations.institution.country_code"),
            EntityKind::Source | EntityKind::Institution | EntityKind::Funder => {
                Some("country_code")
            }
            EntityKind::Publisher => Some("country_codes"),
            EntityKind::Topic | EntityKind::Continent | EntityKind::Country => None,
        }
    }

    /// Boolean field for the open-access shortcut
    pub fn open_access_field(&self) -> Option<&'static str> {
        match self {
            EntityKind::Work => Some("is_oa"),
            _ => None,
        }
    }

    /// Fields pointing at an institution, by native ID and by ROR
    pub fn institution_fields(&self) -> Option<(&'static str, &'static str)> {
        match self {
            EntityKind::Work => Some(("authorships.institutions.id", "authorships.institutions.ror")),
            EntityKind::Author => Some(("affiliations.institution.id", "affiliations.institution.ror")),
            _ => None,
        }
    }

    /// Related-entity expansion, if the kind has one
    pub fn related(&self) -> Option<RelatedRule> {
        match self {
            EntityKind::Author => Some(RelatedRule {
                target: EntityKind::Work,
                filter_field: "author.id",
            }),
            EntityKind::Source => Some(RelatedRule {
                target: EntityKind::Work,
                filter_field: "primary_location.source.id",
            }),
            EntityKind::Institution => Some(RelatedRule {
                target: EntityKind::Author,
                filter_field: "affiliations.institution.id",
            }),
            EntityKind::Topic => Some(RelatedRule {
                target: EntityKind::Work,
                filter_field: "topics.id",
            }),
            EntityKind::Funder => Some(RelatedRule {
                target: EntityKind::Work,
                filter_field: "funders.id",
            }),
            EntityKind::Work
            | EntityKind::Publisher
            | EntityKind::Continent
            | EntityKind::Country => None,
        }
    }

    /// Filter allow-list
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            EntityKind::Work => WORK_FIELDS,
            EntityKind::Author => AUTHOR_FIELDS,
            EntityKind::Source => SOURCE_FIELDS,
            EntityKind::Institution => INSTITUTION_FIELDS,
            EntityKind::Topic => TOPIC_FIELDS,
            EntityKind::Publisher => PUBLISHER_FIELDS,
            EntityKind::Funder => FUNDER_FIELDS,
            EntityKind::Continent => CONTINENT_FIELDS,
            EntityKind::Country => COUNTRY_FIELDS,
        }
    }

    /// Look up a field on the allow-list
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Fields the provider can sort this collection by
    pub fn sortable_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Work => &[
                "cited_by_count",
                "publication_date",
                "publication_year",
                "display_name",
                "relevance_score",
                "fwci",
            ],
            EntityKind::Author
            | EntityKind::Source
            | EntityKind::Institution
            | EntityKind::Publisher
            | EntityKind::Funder => &[
                "cited_by_count",
                "works_count",
                "display_name",
                "relevance_score",
                "summary_stats.h_index",
                "summary_stats.i10_index",
                "summary_stats.2yr_mean_citedness",
            ],
            EntityKind::Topic | EntityKind::Continent | EntityKind::Country => &[
                "cited_by_count",
                "works_count",
                "display_name",
                "relevance_score",
            ],
        }
    }
}

fn prefixed_digits(value: &str, prefix: char) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.eq_ignore_ascii_case(&prefix) => {
            let rest = chars.as_str();
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.singular())
    }
}

impl FromStr for EntityKind {
    type Err = ApiError;

    /// Accepts singular or plural names, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.singular() == name || kind.collection() == name)
            .ok_or_else(|| {
                ApiError::bad_request(format!(
                    "unknown entity_type '{}' (expected one of: {})",
                    s,
                    EntityKind::ALL
                        .iter()
                        .map(|k| k.collection())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

static WORK_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("publication_year"),
    FieldSpec::numeric("cited_by_count"),
    FieldSpec::numeric("fwci"),
    FieldSpec::numeric("authors_count"),
    FieldSpec::numeric("countries_distinct_count"),
    FieldSpec::numeric("institutions_distinct_count"),
    FieldSpec::numeric("citation_normalized_percentile.value"),
    FieldSpec::boolean("is_oa"),
    FieldSpec::boolean("open_access.is_oa"),
    FieldSpec::boolean("is_retracted"),
    FieldSpec::boolean("is_paratext"),
    FieldSpec::boolean("has_doi"),
    FieldSpec::boolean("has_abstract"),
    FieldSpec::boolean("has_fulltext"),
    FieldSpec::boolean("has_orcid"),
    FieldSpec::boolean("has_references"),
    FieldSpec::boolean("primary_location.is_oa"),
    FieldSpec::date("publication_date"),
    FieldSpec::date("from_publication_date"),
    FieldSpec::date("to_publication_date"),
    FieldSpec::date("from_created_date"),
    FieldSpec::date("to_created_date"),
    FieldSpec::text("ids.openalex"),
    FieldSpec::text("openalex"),
    FieldSpec::text("doi"),
    FieldSpec::text("ids.pmid"),
    FieldSpec::text("ids.pmcid"),
    FieldSpec::text("default.search"),
    FieldSpec::text("title.search"),
    FieldSpec::text("abstract.search"),
    FieldSpec::text("display_name.search"),
    FieldSpec::text("fulltext.search"),
    FieldSpec::text("title_and_abstract.search"),
    FieldSpec::text("language"),
    FieldSpec::text("type"),
    FieldSpec::text("type_crossref"),
    FieldSpec::text("oa_status"),
    FieldSpec::text("open_access.oa_status"),
    FieldSpec::text("authorships.countries"),
    FieldSpec::text("authorships.institutions.id"),
    FieldSpec::text("authorships.institutions.ror"),
    FieldSpec::text("authorships.institutions.country_code"),
    FieldSpec::text("authorships.institutions.continent"),
    FieldSpec::text("authorships.institutions.type"),
    FieldSpec::text("authorships.author.id"),
    FieldSpec::text("authorships.author.orcid"),
    FieldSpec::text("author.id"),
    FieldSpec::text("author.orcid"),
    FieldSpec::text("institutions.id"),
    FieldSpec::text("institutions.ror"),
    FieldSpec::text("institutions.country_code"),
    FieldSpec::text("primary_location.source.id"),
    FieldSpec::text("primary_location.source.issn"),
    FieldSpec::text("primary_location.source.type"),
    FieldSpec::text("primary_location.source.publisher_lineage"),
    FieldSpec::text("primary_location.license"),
    FieldSpec::text("locations.source.id"),
    FieldSpec::text("primary_topic.id"),
    FieldSpec::text("primary_topic.domain.id"),
    FieldSpec::text("primary_topic.field.id"),
    FieldSpec::text("primary_topic.subfield.id"),
    FieldSpec::text("topics.id"),
    FieldSpec::text("keywords.id"),
    FieldSpec::text("keywords.keyword"),
    FieldSpec::text("concepts.id"),
    FieldSpec::text("funders.id"),
    FieldSpec::text("grants.funder"),
    FieldSpec::text("grants.award_id"),
    FieldSpec::text("sustainable_development_goals.id"),
    FieldSpec::text("cites"),
    FieldSpec::text("cited_by"),
    FieldSpec::text("related_to"),
    FieldSpec::text("repository"),
];

static AUTHOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("works_count"),
    FieldSpec::numeric("cited_by_count"),
    FieldSpec::numeric("summary_stats.h_index"),
    FieldSpec::numeric("summary_stats.i10_index"),
    FieldSpec::numeric("summary_stats.2yr_mean_citedness"),
    FieldSpec::boolean("has_orcid"),
    FieldSpec::text("ids.openalex"),
    FieldSpec::text("openalex"),
    FieldSpec::text("orcid"),
    FieldSpec::text("display_name"),
    FieldSpec::text("display_name.search"),
    FieldSpec::text("default.search"),
    FieldSpec::text("affiliations.institution.id"),
    FieldSpec::text("affiliations.institution.ror"),
    FieldSpec::text("affiliations.institution.country_code"),
    FieldSpec::text("affiliations.institution.continent"),
    FieldSpec::text("affiliations.institution.type"),
    FieldSpec::text("last_known_institutions.id"),
    FieldSpec::text("last_known_institutions.ror"),
    FieldSpec::text("last_known_institutions.country_code"),
    FieldSpec::text("last_known_institutions.continent"),
    FieldSpec::text("topics.id"),
];

static SOURCE_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("works_count"),
    FieldSpec::numeric("cited_by_count"),
    FieldSpec::numeric("summary_stats.h_index"),
    FieldSpec::numeric("summary_stats.i10_index"),
    FieldSpec::numeric("summary_stats.2yr_mean_citedness"),
    FieldSpec::numeric("apc_usd"),
    FieldSpec::boolean("is_oa"),
    FieldSpec::boolean("is_in_doaj"),
    FieldSpec::boolean("is_core"),
    FieldSpec::boolean("has_issn"),
    FieldSpec::text("ids.openalex"),
    FieldSpec::text("openalex"),
    FieldSpec::text("issn"),
    FieldSpec::text("display_name.search"),
    FieldSpec::text("default.search"),
    FieldSpec::text("type"),
    FieldSpec::text("country_code"),
    FieldSpec::text("continent"),
    FieldSpec::text("host_organization"),
    FieldSpec::text("host_organization_lineage"),
    FieldSpec::text("topics.id"),
];

static INSTITUTION_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("works_count"),
    FieldSpec::numeric("cited_by_count"),
    FieldSpec::numeric("summary_stats.h_index"),
    FieldSpec::numeric("summary_stats.i10_index"),
    FieldSpec::numeric("summary_stats.2yr_mean_citedness"),
    FieldSpec::boolean("is_global_south"),
    FieldSpec::boolean("has_ror"),
    FieldSpec::text("ids.openalex"),
    FieldSpec::text("openalex"),
    FieldSpec::text("ror"),
    FieldSpec::text("display_name.search"),
    FieldSpec::text("default.search"),
    FieldSpec::text("country_code"),
    FieldSpec::text("continent"),
    FieldSpec::text("type"),
    FieldSpec::text("lineage"),
    FieldSpec::text("repositories.id"),
    FieldSpec::text("topics.id"),
];

static TOPIC_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("works_count"),
    FieldSpec::numeric("cited_by_count"),
    FieldSpec::text("ids.openalex"),
    FieldSpec::text("openalex"),
    FieldSpec::text("display_name.search"),
    FieldSpec::text("default.search"),
    FieldSpec::text("description.search"),
    FieldSpec::text("domain.id"),
    FieldSpec::text("field.id"),
    FieldSpec::text("subfield.id"),
];

static PUBLISHER_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("works_count"),
    FieldSpec::numeric("cited_by_count"),
    FieldSpec::numeric("hierarchy_level"),
    FieldSpec::numeric("summary_stats.h_index"),
    FieldSpec::numeric("summary_stats.i10_index"),
    FieldSpec::numeric("summary_stats.2yr_mean_citedness"),
    FieldSpec::text("ids.openalex"),
    FieldSpec::text("openalex"),
    FieldSpec::text("ror"),
    FieldSpec::text("display_name.search"),
    FieldSpec::text("default.search"),
    FieldSpec::text("country_codes"),
    FieldSpec::text("continent"),
    FieldSpec::text("parent_publisher"),
    FieldSpec::text("lineage"),
];

static FUNDER_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("works_count"),
    FieldSpec::numeric("cited_by_count"),
    FieldSpec::numeric("grants_count"),
    FieldSpec::numeric("summary_stats.h_index"),
    FieldSpec::numeric("summary_stats.i10_index"),
    FieldSpec::numeric("summary_stats.2yr_mean_citedness"),
    FieldSpec::boolean("is_global_south"),
    FieldSpec::text("ids.openalex"),
    FieldSpec::text("openalex"),
    FieldSpec::text("ror"),
    FieldSpec::text("display_name.search"),
    FieldSpec::text("default.search"),
    FieldSpec::text("description.search"),
    FieldSpec::text("country_code"),
    FieldSpec::text("continent"),
];

static CONTINENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("works_count"),
    FieldSpec::numeric("cited_by_count"),
    FieldSpec::text("openalex"),
    FieldSpec::text("ids.wikidata"),
    FieldSpec::text("display_name.search"),
    FieldSpec::text("default.search"),
];

static COUNTRY_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("works_count"),
    FieldSpec::numeric("cited_by_count"),
    FieldSpec::boolean("is_global_south"),
    FieldSpec::text("openalex"),
    FieldSpec::text("country_code"),
    FieldSpec::text("continent"),
    FieldSpec::text("display_name.search"),
    FieldSpec::text("default.search"),
];
