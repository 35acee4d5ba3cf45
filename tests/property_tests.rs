use openalex_mcp::client::BatchFetcher;
use openalex_mcp::models::{BatchSlot, EntityKind};
use openalex_mcp::query::{FilterCompiler, FilterExpression, FilterParams, Identifier};
use openalex_mcp::transport::mock::listing_page;
use openalex_mcp::transport::MockTransport;
use proptest::prelude::*;

/// Property-based tests for filter compilation and parsing
mod filter_props {
    use super::*;

    fn country() -> impl Strategy<Value = Option<String>> {
        prop::option::of(prop::collection::vec("[a-z]{2}", 1..4).prop_map(|codes| codes.join(",")))
    }

    proptest! {
        #[test]
        fn test_compiled_filter_reparses(
            year_from in prop::option::of(1900i32..2030),
            span in 0i32..50,
            open_access in prop::option::of(any::<bool>()),
            country in country(),
        ) {
            let compiler = FilterCompiler::with_current_year(2030);
            let params = FilterParams {
                year_from,
                year_to: year_from.map(|from| from + span),
                country,
                open_access,
                ..FilterParams::default()
            };

            let compiled = compiler.compile(EntityKind::Work, &params).unwrap();
            let rendered = compiled.to_string();
            let reparsed = FilterExpression::parse(EntityKind::Work, &rendered).unwrap();
            prop_assert_eq!(reparsed, compiled, "filter did not survive a round trip: {}", rendered);
        }

        #[test]
        fn test_year_range_is_ordered(a in 1900i32..2030, b in 1900i32..2030) {
            let compiler = FilterCompiler::with_current_year(2030);
            let params = FilterParams {
                year_from: Some(a),
                year_to: Some(b),
                ..FilterParams::default()
            };
            let result = compiler.compile(EntityKind::Work, &params);
            prop_assert_eq!(result.is_ok(), a <= b);
        }

        #[test]
        fn test_unknown_field_rejected(field in "zz_[a-z]{3,10}", value in "[a-z0-9]{1,10}") {
            let raw = format!("{}:{}", field, value);
            prop_assert!(FilterExpression::parse(EntityKind::Work, &raw).is_err());
        }
    }
}

/// Property-based tests for identifier classification
mod identifier_props {
    use super::*;

    proptest! {
        #[test]
        fn test_classify_is_total_and_deterministic(raw in ".{0,64}") {
            for kind in EntityKind::ALL {
                let first = Identifier::classify(kind, &raw);
                let second = Identifier::classify(kind, &raw);
                prop_assert_eq!(first, second);
            }
        }

        #[test]
        fn test_doi_never_classified_as_orcid(doi in r"10\.[0-9]{4,9}/[a-z0-9._-]{1,20}") {
            for kind in [EntityKind::Work, EntityKind::Author] {
                let identifier = Identifier::classify(kind, &doi);
                prop_assert!(matches!(identifier, Identifier::Doi(_)), "{} classified as {:?}", doi, identifier);
            }
        }

        #[test]
        fn test_orcid_url_classified_as_orcid(digits in r"[0-9]{4}-[0-9]{4}-[0-9]{4}-[0-9]{3}[0-9X]") {
            let raw = format!("https://orcid.org/{}", digits);
            prop_assert_eq!(
                Identifier::classify(EntityKind::Author, &raw),
                Identifier::Orcid(digits)
            );
        }

        #[test]
        fn test_native_id_canonical(n in 1u64..10_000_000_000) {
            let identifier = Identifier::classify(EntityKind::Work, &format!("w{}", n));
            prop_assert_eq!(
                identifier,
                Identifier::NativeId { kind: EntityKind::Work, id: format!("W{}", n) }
            );
        }
    }
}

/// Property-based tests for batch lookups
mod batch_props {
    use super::*;

    fn identifier() -> impl Strategy<Value = String> {
        prop_oneof![
            r"W[0-9]{1,9}",
            r"10\.[0-9]{4}/[a-z0-9]{1,8}",
            "[a-z ,|+]{0,12}",
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_one_slot_per_input(ids in prop::collection::vec(identifier(), 0..130)) {
            let mock = MockTransport::with_handler(|_| Ok(listing_page(vec![], 0, None)));
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let result = runtime
                .block_on(BatchFetcher::new(&mock).fetch(EntityKind::Work, &ids))
                .unwrap();

            prop_assert_eq!(result.requested, ids.len());
            prop_assert_eq!(result.results.len(), ids.len());
            prop_assert_eq!(result.found, 0);
            for (slot, id) in result.results.iter().zip(&ids) {
                prop_assert_eq!(slot.identifier(), id.as_str());
                prop_assert!(!matches!(slot, BatchSlot::Found { .. }), "slot for {} unexpectedly Found", id);
            }
        }
    }
}
