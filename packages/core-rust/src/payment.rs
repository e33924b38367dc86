//! The example record entity and its enumerated ordering.
//!
//! Ordering is never passed through as free text: callers parse the raw
//! `order_by` / `order_from` values into [`PaymentOrder`], and stores build
//! their queries from the enumerated column and direction only.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum number of payments returned by a single listing.
pub const PAYMENT_LIMIT: usize = 100;

/// A payment row. Immutable once read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "PaymentID")]
    pub id: i64,
    #[serde(rename = "CustomerName")]
    pub customer_name: String,
}

/// Errors from parsing ordering parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("unknown order field: {0:?}")]
    UnknownField(String),
    #[error("unknown order direction: {0:?}")]
    UnknownDirection(String),
}

/// Column a payment listing may be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderField {
    #[default]
    Id,
    CustomerName,
}

impl OrderField {
    /// The SQL column name for this field.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::CustomerName => "customer_name",
        }
    }
}

impl FromStr for OrderField {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "id" => Ok(Self::Id),
            "customer_name" => Ok(Self::CustomerName),
            _ => Err(OrderError::UnknownField(s.to_string())),
        }
    }
}

/// Sort direction for a payment listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    /// The SQL keyword for this direction.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for OrderDirection {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(OrderError::UnknownDirection(s.to_string())),
        }
    }
}

/// A validated ordering for payment listings. Defaults to `id ASC`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentOrder {
    pub field: OrderField,
    pub direction: OrderDirection,
}

impl PaymentOrder {
    /// Parses raw request parameters. Empty values fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError`] if either value is not one of the allowed names.
    pub fn parse(order_by: &str, order_from: &str) -> Result<Self, OrderError> {
        Ok(Self {
            field: order_by.parse()?,
            direction: order_from.parse()?,
        })
    }

    /// Compares two payments according to this ordering.
    #[must_use]
    pub fn compare(&self, a: &Payment, b: &Payment) -> Ordering {
        let ordering = match self.field {
            OrderField::Id => a.id.cmp(&b.id),
            OrderField::CustomerName => a.customer_name.cmp(&b.customer_name),
        };
        match self.direction {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for PaymentOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.column(), self.direction.keyword())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(id: i64, name: &str) -> Payment {
        Payment {
            id,
            customer_name: name.to_string(),
        }
    }

    #[test]
    fn serializes_with_entity_field_names() {
        let json = serde_json::to_value(payment(7, "Ana")).unwrap();
        assert_eq!(json, serde_json::json!({ "PaymentID": 7, "CustomerName": "Ana" }));
    }

    #[test]
    fn empty_parameters_use_defaults() {
        let order = PaymentOrder::parse("", "").unwrap();
        assert_eq!(order, PaymentOrder::default());
        assert_eq!(order.to_string(), "id ASC");
    }

    #[test]
    fn parses_known_values_case_insensitively() {
        let order = PaymentOrder::parse("Customer_Name", " DESC ").unwrap();
        assert_eq!(order.field, OrderField::CustomerName);
        assert_eq!(order.direction, OrderDirection::Desc);
        assert_eq!(order.to_string(), "customer_name DESC");
    }

    #[test]
    fn rejects_injection_attempts() {
        let err = PaymentOrder::parse("id; DROP TABLE payments", "asc").unwrap_err();
        assert!(matches!(err, OrderError::UnknownField(_)));

        let err = PaymentOrder::parse("id", "asc, (select 1)").unwrap_err();
        assert!(matches!(err, OrderError::UnknownDirection(_)));
    }

    #[test]
    fn compare_respects_field_and_direction() {
        let mut rows = vec![payment(2, "Budi"), payment(1, "Citra"), payment(3, "Ana")];

        let by_name = PaymentOrder {
            field: OrderField::CustomerName,
            direction: OrderDirection::Asc,
        };
        rows.sort_by(|a, b| by_name.compare(a, b));
        assert_eq!(rows.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 2, 1]);

        let by_id_desc = PaymentOrder {
            field: OrderField::Id,
            direction: OrderDirection::Desc,
        };
        rows.sort_by(|a, b| by_id_desc.compare(a, b));
        assert_eq!(rows.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 2, 1]);
    }
}
