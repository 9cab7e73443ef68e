//! Catalog record and index document types.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest price accepted by the record store (`DECIMAL(10, 2)`), in cents.
pub const MAX_PRICE_CENTS: i64 = 9_999_999_999;

// ============================================================================
// IDENTITY
// ============================================================================

/// Record identifier assigned by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for RecordId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<i64>() {
            Ok(value) if value > 0 => Ok(Self(value)),
            _ => Err(ValidationError::InvalidValue {
                field: "id".to_string(),
                reason: format!("'{}' is not a positive integer", s),
            }),
        }
    }
}

// ============================================================================
// PRICE
// ============================================================================

/// Positive decimal price with two fractional digits, held as integer cents.
///
/// Serialized as a JSON number (`10.5`) so the search engine can range over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Price(i64);

impl Price {
    /// Build a price from integer cents. Rejects zero, negatives and values
    /// outside the storable range.
    pub fn from_cents(cents: i64) -> Result<Self, ValidationError> {
        if cents <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "price".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if cents > MAX_PRICE_CENTS {
            return Err(ValidationError::InvalidValue {
                field: "price".to_string(),
                reason: "exceeds the maximum storable price".to_string(),
            });
        }
        Ok(Self(cents))
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl TryFrom<f64> for Price {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(ValidationError::InvalidValue {
                field: "price".to_string(),
                reason: "must be a finite number".to_string(),
            });
        }
        let cents = (value * 100.0).round();
        if cents > MAX_PRICE_CENTS as f64 {
            return Price::from_cents(MAX_PRICE_CENTS + 1);
        }
        Price::from_cents(cents as i64)
    }
}

impl From<Price> for f64 {
    fn from(price: Price) -> Self {
        price.as_f64()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// STATUS
// ============================================================================

/// Sale status of a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(RecordStatus::Active),
            "inactive" => Ok(RecordStatus::Inactive),
            other => Err(ValidationError::InvalidValue {
                field: "status".to_string(),
                reason: format!("'{}' is not one of: active, inactive", other),
            }),
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// Authoritative representation of a sellable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CatalogRecord {
    pub id: RecordId,
    pub sku: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = f64))]
    pub price: Price,
    pub category: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CatalogRecord {
    pub fn is_soft_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// A record is live when it is visible to listings and search.
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Fields supplied when creating a record. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub category: String,
    pub status: RecordStatus,
    pub image_path: Option<String>,
}

/// Partial update. `None` leaves the stored value untouched; the nested
/// options on `description` and `image_path` allow clearing them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub price: Option<Price>,
    pub category: Option<String>,
    pub status: Option<RecordStatus>,
    pub image_path: Option<Option<String>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self == &RecordPatch::default()
    }

    /// Apply the patch onto a record in place.
    pub fn apply_to(&self, record: &mut CatalogRecord) {
        if let Some(sku) = &self.sku {
            record.sku = sku.clone();
        }
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(price) = self.price {
            record.price = price;
        }
        if let Some(category) = &self.category {
            record.category = category.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(image_path) = &self.image_path {
            record.image_path = image_path.clone();
        }
    }
}

impl From<NewRecord> for RecordPatch {
    /// A full replacement expressed as a patch (used by `PUT`).
    fn from(new: NewRecord) -> Self {
        Self {
            sku: Some(new.sku),
            name: Some(new.name),
            description: Some(new.description),
            price: Some(new.price),
            category: Some(new.category),
            status: Some(new.status),
            image_path: Some(new.image_path),
        }
    }
}

// ============================================================================
// INDEX DOCUMENT
// ============================================================================

/// Denormalized search projection of a [`CatalogRecord`], keyed by the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IndexDocument {
    pub id: RecordId,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    pub category: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<&CatalogRecord> for IndexDocument {
    fn from(record: &CatalogRecord) -> Self {
        Self {
            id: record.id,
            sku: record.sku.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            price: record.price.as_f64(),
            category: record.category.clone(),
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_record() -> CatalogRecord {
        let now = Utc::now();
        CatalogRecord {
            id: RecordId::new(7),
            sku: "SKU1".to_string(),
            name: "Widget".to_string(),
            description: None,
            price: Price::from_cents(1000).expect("valid price"),
            category: "tools".to_string(),
            status: RecordStatus::Active,
            image_path: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_price_rejects_non_positive_values() {
        assert!(Price::from_cents(0).is_err());
        assert!(Price::from_cents(-5).is_err());
        assert!(Price::try_from(0.0).is_err());
        assert!(Price::try_from(f64::NAN).is_err());
        assert!(Price::try_from(1e12).is_err());
    }

    #[test]
    fn test_price_rounds_to_cents() {
        let price = Price::try_from(19.999).expect("valid price");
        assert_eq!(price.cents(), 2000);
        assert_eq!(price.to_string(), "20.00");
        assert_eq!(Price::from_cents(1005).map(|p| p.to_string()), Ok("10.05".to_string()));
    }

    #[test]
    fn test_price_serializes_as_number() -> Result<(), serde_json::Error> {
        let price = Price::from_cents(1050).expect("valid price");
        assert_eq!(serde_json::to_value(price)?, serde_json::json!(10.5));
        let parsed: Price = serde_json::from_str("10.5")?;
        assert_eq!(parsed, price);
        assert!(serde_json::from_str::<Price>("-1").is_err());
        Ok(())
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("ACTIVE".parse::<RecordStatus>(), Ok(RecordStatus::Active));
        assert_eq!("inactive".parse::<RecordStatus>(), Ok(RecordStatus::Inactive));
        assert!("archived".parse::<RecordStatus>().is_err());
        assert_eq!(RecordStatus::default(), RecordStatus::Active);
    }

    #[test]
    fn test_record_id_parsing() {
        assert_eq!("42".parse::<RecordId>(), Ok(RecordId::new(42)));
        assert!("0".parse::<RecordId>().is_err());
        assert!("abc".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_patch_applies_only_present_fields() {
        let mut record = sample_record();
        let patch = RecordPatch {
            name: Some("Gadget".to_string()),
            description: Some(Some("shiny".to_string())),
            ..Default::default()
        };
        patch.apply_to(&mut record);
        assert_eq!(record.name, "Gadget");
        assert_eq!(record.description.as_deref(), Some("shiny"));
        assert_eq!(record.sku, "SKU1");
        assert!(RecordPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_index_document_projection() {
        let mut record = sample_record();
        record.image_path = Some("images/widget.png".to_string());
        let doc = IndexDocument::from(&record);
        assert_eq!(doc.id, record.id);
        assert_eq!(doc.price, 10.0);
        assert_eq!(doc.status, RecordStatus::Active);
        let json = serde_json::to_value(&doc).expect("serializable");
        assert!(json.get("image_path").is_none());
    }
}
