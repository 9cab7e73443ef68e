//! Property tests for query-string and payload normalization.

use proptest::prelude::*;
use vitrine_api::{ListQuery, ProductPayload, SearchQuery};
use vitrine_core::MAX_PER_PAGE;
use vitrine_test_utils::generators::arb_new_record;

proptest! {
    #[test]
    fn prop_list_query_stays_in_bounds(page in proptest::option::of(any::<u32>()), per_page in proptest::option::of(any::<u32>())) {
        let (page, per_page) = ListQuery { page, per_page }.resolve();
        prop_assert!(page >= 1);
        prop_assert!((1..=100).contains(&per_page));
    }

    #[test]
    fn prop_search_page_size_is_capped(per_page in 1u32..10_000) {
        let request = SearchQuery { per_page: Some(per_page), ..SearchQuery::default() }
            .into_request();
        prop_assert!(request.is_ok());
        if let Ok(request) = request {
            prop_assert!(request.per_page <= MAX_PER_PAGE);
        }
    }

    #[test]
    fn prop_generated_records_pass_payload_rules(record in arb_new_record()) {
        let payload = ProductPayload {
            sku: Some(record.sku.clone()),
            name: Some(record.name.clone()),
            description: record.description.clone(),
            price: Some(record.price.as_f64()),
            category: Some(record.category.clone()),
            status: Some(record.status.as_str().to_string()),
            image_path: None,
        };
        let parsed = payload.into_new_record();
        prop_assert!(parsed.is_ok(), "rejected {:?}", parsed);
        if let Ok(parsed) = parsed {
            prop_assert_eq!(parsed.price, record.price);
            prop_assert_eq!(parsed.status, record.status);
        }
    }
}
