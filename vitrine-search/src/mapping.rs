//! Index settings and field mapping for catalog documents.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name of the custom analyzer used by the analyzed text fields.
pub const PRODUCT_ANALYZER: &str = "product_analyzer";

/// Settings and mappings sent when an index is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMapping {
    pub settings: Value,
    pub mappings: Value,
}

impl IndexMapping {
    /// Mapping for catalog documents.
    ///
    /// `name` and `description` are analyzed for full-text matching; `sku`,
    /// `name` and `category` carry a `keyword` sub-field used for exact
    /// filtering and sorting.
    pub fn catalog() -> Self {
        let settings = json!({
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "analysis": {
                "analyzer": {
                    PRODUCT_ANALYZER: {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lowercase", "asciifolding"]
                    }
                }
            }
        });

        let mappings = json!({
            "properties": {
                "id": { "type": "integer" },
                "sku": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword" } }
                },
                "name": {
                    "type": "text",
                    "analyzer": PRODUCT_ANALYZER,
                    "fields": { "keyword": { "type": "keyword" } }
                },
                "description": {
                    "type": "text",
                    "analyzer": PRODUCT_ANALYZER
                },
                "price": { "type": "float" },
                "category": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword" } }
                },
                "status": { "type": "keyword" },
                "created_at": { "type": "date" },
                "updated_at": { "type": "date" },
                "deleted_at": { "type": "date" }
            }
        });

        Self { settings, mappings }
    }

    /// Request body of an index-creation call.
    pub fn to_body(&self) -> Value {
        json!({
            "settings": self.settings,
            "mappings": self.mappings,
        })
    }
}

impl Default for IndexMapping {
    fn default() -> Self {
        Self::catalog()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_subfields_back_exact_filters() {
        let mapping = IndexMapping::catalog();
        let props = &mapping.mappings["properties"];
        for field in ["sku", "name", "category"] {
            assert_eq!(props[field]["fields"]["keyword"]["type"], "keyword", "{}", field);
        }
        assert_eq!(props["status"]["type"], "keyword");
        assert_eq!(props["price"]["type"], "float");
    }

    #[test]
    fn test_analyzer_is_declared_and_used() {
        let mapping = IndexMapping::catalog();
        let analyzer = &mapping.settings["analysis"]["analyzer"][PRODUCT_ANALYZER];
        assert_eq!(analyzer["tokenizer"], "standard");
        assert_eq!(mapping.mappings["properties"]["name"]["analyzer"], PRODUCT_ANALYZER);
        assert_eq!(
            mapping.mappings["properties"]["description"]["analyzer"],
            PRODUCT_ANALYZER
        );
    }

    #[test]
    fn test_body_shape() {
        let body = IndexMapping::catalog().to_body();
        assert_eq!(body["settings"]["number_of_shards"], 1);
        assert!(body["mappings"]["properties"].is_object());
    }
}
