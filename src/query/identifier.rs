//! Identifier classification and lookup routing.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{ApiError, Result};
use crate::models::{EntityKind, IdSchemes};

const OPENALEX_PREFIXES: &[&str] = &["https://openalex.org/", "http://openalex.org/", "openalex.org/"];
const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
    "doi:",
];
const ORCID_PREFIXES: &[&str] = &["https://orcid.org/", "http://orcid.org/", "orcid.org/"];
const ROR_MARKER: &str = "ror.org/";
const ISSN_PREFIXES: &[&str] = &["issn:"];
const PMID_PREFIXES: &[&str] = &[
    "https://pubmed.ncbi.nlm.nih.gov/",
    "http://pubmed.ncbi.nlm.nih.gov/",
    "pubmed.ncbi.nlm.nih.gov/",
    "pmid:",
];
const PMCID_PREFIXES: &[&str] = &[
    "https://www.ncbi.nlm.nih.gov/pmc/articles/",
    "http://www.ncbi.nlm.nih.gov/pmc/articles/",
    "https://pmc.ncbi.nlm.nih.gov/articles/",
    "pmc.ncbi.nlm.nih.gov/articles/",
    "pmcid:",
];

fn doi_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^10\.[0-9]{4,9}/\S+$").expect("DOI pattern is valid"))
}

fn orcid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{4}-[0-9]{4}-[0-9]{4}-[0-9]{3}[0-9Xx]$").expect("ORCID pattern is valid"))
}

fn ror_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0[a-z0-9]{6}[0-9]{2}$").expect("ROR pattern is valid"))
}

fn issn_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{4}-[0-9]{3}[0-9Xx]$").expect("ISSN pattern is valid"))
}

fn pmid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{1,9}$").expect("PMID pattern is valid"))
}

fn pmcid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?i:pmc)[0-9]{1,9}$").expect("PMCID pattern is valid"))
}

/// A caller-supplied identifier, tagged by scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Native ID of the requested kind, in canonical spelling
    NativeId { kind: EntityKind, id: String },
    /// Bare DOI (`10.xxxx/...`)
    Doi(String),
    /// Bare ORCID (`0000-0000-0000-000X`)
    Orcid(String),
    /// Bare ROR ID (`0xxxxxx00`)
    Ror(String),
    /// ISSN with a valid check digit (`0028-0836`)
    Issn(String),
    /// PubMed ID; needs a `pmid:` or PubMed URL prefix
    Pmid(String),
    /// PubMed Central ID (`PMC1234567`)
    Pmcid(String),
    /// Anything else; resolved by searching on the name
    FreeText(String),
}

/// Where a resolved identifier is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTarget {
    /// Direct entity path, e.g. `/works/doi:10.1038/...`
    Path(String),
    /// Search the kind's collection and take the best hit
    Search(String),
}

impl Identifier {
    /// Classify `raw` for `kind`; total and deterministic
    ///
    /// Order: native ID of `kind`, DOI, ORCID, ROR URL, ISSN, PMID, PMCID,
    /// free text.
    pub fn classify(kind: EntityKind, raw: &str) -> Self {
        let trimmed = raw.trim();

        let native = strip_native_prefix(kind, trimmed);
        if kind.is_native_id(native) {
            return Identifier::NativeId {
                kind,
                id: kind.canonical_id(native),
            };
        }

        let doi = strip_any_prefix(trimmed, DOI_PREFIXES);
        if doi_pattern().is_match(doi) {
            return Identifier::Doi(doi.to_string());
        }

        let orcid = strip_any_prefix(trimmed, ORCID_PREFIXES);
        if orcid_pattern().is_match(orcid) {
            return Identifier::Orcid(orcid.to_ascii_uppercase());
        }

        if let Some(pos) = trimmed.to_ascii_lowercase().find(ROR_MARKER) {
            let id = trimmed[pos + ROR_MARKER.len()..].trim_end_matches('/').to_ascii_lowercase();
            if ror_pattern().is_match(&id) {
                return Identifier::Ror(id);
            }
        }

        let issn = strip_any_prefix(trimmed, ISSN_PREFIXES);
        if issn_pattern().is_match(issn) && issn_check_digit_ok(issn) {
            return Identifier::Issn(issn.to_ascii_uppercase());
        }

        let pmid = strip_any_prefix(trimmed, PMID_PREFIXES);
        if pmid.len() < trimmed.len() && pmid_pattern().is_match(pmid.trim_end_matches('/')) {
            return Identifier::Pmid(pmid.trim_end_matches('/').to_string());
        }

        let pmcid = strip_any_prefix(trimmed, PMCID_PREFIXES).trim_end_matches('/');
        if pmcid_pattern().is_match(pmcid) {
            return Identifier::Pmcid(pmcid.to_ascii_uppercase());
        }

        Identifier::FreeText(trimmed.to_string())
    }

    /// Classify and route, rejecting schemes `kind` does not accept
    pub fn resolve(kind: EntityKind, raw: &str) -> Result<(Identifier, LookupTarget)> {
        let identifier = Self::classify(kind, raw);
        let target = identifier.lookup_target(kind)?;
        Ok((identifier, target))
    }

    /// Alternate scheme of this identifier, if it is one
    pub fn scheme(&self) -> Option<IdSchemes> {
        match self {
            Identifier::Doi(_) => Some(IdSchemes::DOI),
            Identifier::Orcid(_) => Some(IdSchemes::ORCID),
            Identifier::Ror(_) => Some(IdSchemes::ROR),
            Identifier::Issn(_) => Some(IdSchemes::ISSN),
            Identifier::Pmid(_) => Some(IdSchemes::PMID),
            Identifier::Pmcid(_) => Some(IdSchemes::PMCID),
            Identifier::NativeId { .. } | Identifier::FreeText(_) => None,
        }
    }

    /// Short tag, used in log lines and error messages
    pub fn tag(&self) -> &'static str {
        match self {
            Identifier::NativeId { .. } => "native_id",
            Identifier::Doi(_) => "doi",
            Identifier::Orcid(_) => "orcid",
            Identifier::Ror(_) => "ror",
            Identifier::Issn(_) => "issn",
            Identifier::Pmid(_) => "pmid",
            Identifier::Pmcid(_) => "pmcid",
            Identifier::FreeText(_) => "free_text",
        }
    }

    /// Check that `kind` accepts this identifier's scheme
    pub fn check_scheme(&self, kind: EntityKind) -> Result<()> {
        if let Some(scheme) = self.scheme() {
            if !kind.accepted_schemes().contains(scheme) {
                return Err(ApiError::bad_request(format!(
                    "{} identifiers cannot be used to look up a {}",
                    self.tag().to_ascii_uppercase(),
                    kind
                )));
            }
        }
        Ok(())
    }

    /// Lookup route for `kind`
    pub fn lookup_target(&self, kind: EntityKind) -> Result<LookupTarget> {
        self.check_scheme(kind)?;
        let collection = kind.collection();
        match self {
            Identifier::NativeId { id, .. } => Ok(LookupTarget::Path(format!("/{}/{}", collection, id))),
            Identifier::Doi(doi) => Ok(LookupTarget::Path(format!("/{}/doi:{}", collection, doi))),
            Identifier::Orcid(orcid) => {
                Ok(LookupTarget::Path(format!("/{}/orcid:{}", collection, orcid)))
            }
            Identifier::Ror(ror) => Ok(LookupTarget::Path(format!("/{}/ror:{}", collection, ror))),
            Identifier::Issn(issn) => Ok(LookupTarget::Path(format!("/{}/issn:{}", collection, issn))),
            Identifier::Pmid(pmid) => Ok(LookupTarget::Path(format!("/{}/pmid:{}", collection, pmid))),
            Identifier::Pmcid(pmcid) => {
                Ok(LookupTarget::Path(format!("/{}/pmcid:{}", collection, pmcid)))
            }
            Identifier::FreeText(text) => {
                if text.is_empty() {
                    return Err(ApiError::bad_request("identifier is empty"));
                }
                if let Some(other) = foreign_native_kind(kind, text) {
                    return Err(ApiError::bad_request(format!(
                        "'{}' is a{} {} ID, not a {} ID",
                        text,
                        if other.singular().starts_with(['a', 'e', 'i', 'o', 'u']) { "n" } else { "" },
                        other,
                        kind
                    )));
                }
                Ok(LookupTarget::Search(text.clone()))
            }
        }
    }

    /// Filter field used to select entities of `kind` by this identifier
    pub fn filter_field(&self, kind: EntityKind) -> Option<&'static str> {
        match self {
            Identifier::NativeId { .. } if kind == EntityKind::Country => Some("country_code"),
            Identifier::NativeId { .. } => Some("openalex"),
            Identifier::Doi(_) => Some("doi"),
            Identifier::Orcid(_) => Some("orcid"),
            Identifier::Ror(_) => Some("ror"),
            Identifier::Issn(_) => Some("issn"),
            Identifier::Pmid(_) => Some("ids.pmid"),
            Identifier::Pmcid(_) => Some("ids.pmcid"),
            Identifier::FreeText(_) => None,
        }
    }

    /// Value as it appears in a filter clause and in provider records
    pub fn filter_value(&self) -> String {
        match self {
            Identifier::NativeId { id, .. } => id.clone(),
            Identifier::Doi(doi) => format!("https://doi.org/{}", doi),
            Identifier::Orcid(orcid) => format!("https://orcid.org/{}", orcid),
            Identifier::Ror(ror) => format!("https://ror.org/{}", ror),
            Identifier::Issn(issn) => issn.clone(),
            Identifier::Pmid(pmid) => pmid.clone(),
            Identifier::Pmcid(pmcid) => pmcid.clone(),
            Identifier::FreeText(text) => text.clone(),
        }
    }

    /// Normalized key for matching provider records back to this identifier
    pub fn match_key(&self) -> String {
        match self {
            Identifier::NativeId { id, .. } => id.to_ascii_uppercase(),
            Identifier::Doi(doi) => doi.to_ascii_lowercase(),
            Identifier::Orcid(orcid) => orcid.to_ascii_uppercase(),
            Identifier::Ror(ror) => ror.to_ascii_lowercase(),
            Identifier::Issn(issn) => issn.to_ascii_uppercase(),
            Identifier::Pmid(pmid) => pmid.clone(),
            Identifier::Pmcid(pmcid) => pmcid.to_ascii_uppercase(),
            Identifier::FreeText(text) => text.to_ascii_lowercase(),
        }
    }
}

/// Strip the provider's URL prefix from an ID, plus `countries/`-style path segments
pub fn clean_native_id(raw: &str) -> &str {
    let stripped = strip_any_prefix(raw.trim(), OPENALEX_PREFIXES);
    stripped.rsplit('/').next().unwrap_or(stripped)
}

/// Normalized DOI key from a provider `doi` value
pub fn doi_key(raw: &str) -> String {
    strip_any_prefix(raw.trim(), DOI_PREFIXES).to_ascii_lowercase()
}

/// Normalized ORCID key from a provider `orcid` value
pub fn orcid_key(raw: &str) -> String {
    strip_any_prefix(raw.trim(), ORCID_PREFIXES).to_ascii_uppercase()
}

/// Normalized ROR key from a provider `ror` value
pub fn ror_key(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    match lower.find(ROR_MARKER) {
        Some(pos) => lower[pos + ROR_MARKER.len()..].trim_end_matches('/').to_string(),
        None => lower,
    }
}

/// Normalized ISSN key from a provider `issn` or `issn_l` value
pub fn issn_key(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Normalized PMID key from a provider `ids.pmid` value (a PubMed URL)
pub fn pmid_key(raw: &str) -> String {
    strip_any_prefix(raw.trim(), PMID_PREFIXES)
        .trim_end_matches('/')
        .to_string()
}

/// Normalized PMCID key from a provider `ids.pmcid` value
///
/// The provider sometimes drops the `PMC` prefix from the URL's last segment.
pub fn pmcid_key(raw: &str) -> String {
    let tail = raw.trim().trim_end_matches('/');
    let tail = tail.rsplit('/').next().unwrap_or(tail).to_ascii_uppercase();
    if tail.starts_with("PMC") {
        tail
    } else {
        format!("PMC{}", tail)
    }
}

/// ISSN mod-11 check digit over the first seven digits
fn issn_check_digit_ok(issn: &str) -> bool {
    let chars: Vec<char> = issn.chars().filter(|c| *c != '-').collect();
    if chars.len() != 8 {
        return false;
    }
    let sum: u32 = chars[..7]
        .iter()
        .zip((2..=8).rev())
        .map(|(c, weight)| c.to_digit(10).unwrap_or(0) * weight)
        .sum();
    let expected = match (11 - sum % 11) % 11 {
        10 => 'X',
        n => char::from_digit(n, 10).unwrap_or('0'),
    };
    chars[7].to_ascii_uppercase() == expected
}

fn strip_any_prefix<'a>(value: &'a str, prefixes: &[&str]) -> &'a str {
    for prefix in prefixes {
        if let Some(head) = value.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) {
                return &value[prefix.len()..];
            }
        }
    }
    value
}

fn strip_native_prefix(kind: EntityKind, value: &str) -> &str {
    let stripped = strip_any_prefix(value, OPENALEX_PREFIXES);
    let collection_prefix = format!("{}/", kind.collection());
    strip_any_prefix(stripped, &[collection_prefix.as_str()])
}

/// Another kind whose native ID `text` looks like, for prefixed kinds only
fn foreign_native_kind(kind: EntityKind, text: &str) -> Option<EntityKind> {
    let bare = clean_native_id(text);
    EntityKind::ALL
        .into_iter()
        .filter(|other| *other != kind && other.id_prefix().is_some())
        .find(|other| other.is_native_id(bare))
}
