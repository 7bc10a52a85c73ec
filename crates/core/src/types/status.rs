//! Order status.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Order status as recorded by the checkout and fulfilment tooling.
///
/// Known values are matched case-insensitively. Anything else is preserved
/// verbatim in [`OrderStatus::Other`] so that a status introduced by another
/// tool still renders instead of failing the whole order list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    /// Parse a stored status value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "shipped" => Self::Shipped,
            "delivered" => Self::Delivered,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Other(value.to_string()),
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map_or_else(Self::default, |s| Self::parse(&s)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_values_case_insensitively() {
        assert_eq!(OrderStatus::parse("SHIPPED"), OrderStatus::Shipped);
        assert_eq!(OrderStatus::parse("canceled"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::parse(" pending "), OrderStatus::Pending);
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let status: OrderStatus = serde_json::from_str("\"Awaiting pickup\"").unwrap();
        assert_eq!(status, OrderStatus::Other("Awaiting pickup".to_string()));
        assert_eq!(status.to_string(), "Awaiting pickup");
    }

    #[test]
    fn test_null_status_defaults_to_pending() {
        let status: OrderStatus = serde_json::from_str("null").unwrap();
        assert_eq!(status, OrderStatus::Pending);
    }
}
