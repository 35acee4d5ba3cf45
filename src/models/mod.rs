//! Entity kinds, provider payloads and the normalized shapes returned to callers.

mod entity;
mod listing;
pub mod raw;
mod record;

pub use entity::{EntityKind, FieldSpec, FieldType, IdSchemes, RelatedRule};
pub use listing::{BatchResult, BatchSlot, Group, GroupListing, ListingPage, Success};
pub use record::{
    clean_id, rebuild_abstract, AuthorRecord, AuthorSummary, Award, ContinentRecord,
    CountryRecord, FunderRecord, FunderRef, InstitutionRecord, NormalizedRecord, PublisherRecord,
    Related, ScoredLabel, SourceRecord, TopicRecord, WorkAuthor, WorkRecord, WorkSummary,
};
