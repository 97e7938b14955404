// Typed filters for order listing
//
// Raw query-string parameters are validated into an `OrderQuery`; stores
// render it with bound parameters only.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::orders::models::{Order, OrderStatus, OrderType};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Query parameters extracted from HTTP request
/// All fields are optional to support flexible querying
#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    pub status: Option<String>,
    pub order_type: Option<String>,
    pub customer_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// "asc" or "desc" on created_at (defaults to desc)
    pub order: Option<String>,
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Sort order options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Validated order filter
#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub order_type: Option<OrderType>,
    pub customer_id: Option<Uuid>,
    /// Orders with at least one item from this supplier
    pub supplier_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort_order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            status: None,
            order_type: None,
            customer_id: None,
            supplier_id: None,
            created_from: None,
            created_to: None,
            sort_order: SortOrder::Desc,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl OrderQuery {
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    /// Scalar predicates; the supplier filter needs the order's items
    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status == s)
            && self.order_type.map_or(true, |t| order.order_type == t)
            && self.customer_id.map_or(true, |c| order.customer_id == c)
            && self.created_from.map_or(true, |from| order.created_at >= from)
            && self.created_to.map_or(true, |to| order.created_at <= to)
    }
}

/// Query parameter validator
pub struct QueryValidator;

impl QueryValidator {
    pub fn validate(params: OrderListParams) -> EngineResult<OrderQuery> {
        let status = Self::parse_optional::<OrderStatus>("status", params.status)?;
        let order_type = Self::parse_optional::<OrderType>("order_type", params.order_type)?;

        if let (Some(from), Some(to)) = (params.created_from, params.created_to) {
            if from > to {
                return Err(EngineError::invalid_field(
                    "created_from",
                    "created_from must not be after created_to",
                ));
            }
        }

        let sort_order = match params.order.as_deref().map(|o| o.trim().to_lowercase()) {
            None => SortOrder::Desc,
            Some(o) if o == "desc" => SortOrder::Desc,
            Some(o) if o == "asc" => SortOrder::Asc,
            Some(o) => {
                return Err(EngineError::invalid_field(
                    "order",
                    format!("order must be 'asc' or 'desc', got '{}'", o),
                ))
            }
        };

        let page = params.page.unwrap_or(1);
        if page == 0 {
            return Err(EngineError::invalid_field("page", "page must be at least 1"));
        }
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(EngineError::invalid_field(
                "limit",
                format!("limit must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }

        Ok(OrderQuery {
            status,
            order_type,
            customer_id: params.customer_id,
            supplier_id: params.supplier_id,
            created_from: params.created_from,
            created_to: params.created_to,
            sort_order,
            page,
            limit,
        })
    }

    /// Blank strings count as absent
    fn parse_optional<T: FromStr<Err = String>>(
        field: &str,
        raw: Option<String>,
    ) -> EngineResult<Option<T>> {
        match raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            Some(value) => value
                .parse::<T>()
                .map(Some)
                .map_err(|e| EngineError::invalid_field(field, e)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let query = QueryValidator::validate(OrderListParams::default()).unwrap();
        assert_eq!(query, OrderQuery::default());
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn test_parses_filters() {
        let query = QueryValidator::validate(OrderListParams {
            status: Some("Out_For_Delivery".to_string()),
            order_type: Some(" emergency ".to_string()),
            order: Some("ASC".to_string()),
            page: Some(3),
            limit: Some(10),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.status, Some(OrderStatus::OutForDelivery));
        assert_eq!(query.order_type, Some(OrderType::Emergency));
        assert_eq!(query.sort_order, SortOrder::Asc);
        assert_eq!(query.offset(), 20);
    }

    #[test]
    fn test_blank_status_is_ignored() {
        let query = QueryValidator::validate(OrderListParams {
            status: Some("  ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert!(query.status.is_none());
    }

    #[test]
    fn test_rejects_bad_input() {
        let bad = [
            OrderListParams {
                status: Some("shipped".to_string()),
                ..Default::default()
            },
            OrderListParams {
                page: Some(0),
                ..Default::default()
            },
            OrderListParams {
                limit: Some(MAX_PAGE_SIZE + 1),
                ..Default::default()
            },
            OrderListParams {
                order: Some("sideways".to_string()),
                ..Default::default()
            },
            OrderListParams {
                created_from: Some(Utc::now()),
                created_to: Some(Utc::now() - chrono::Duration::days(1)),
                ..Default::default()
            },
        ];
        for params in bad {
            assert!(matches!(
                QueryValidator::validate(params),
                Err(EngineError::Validation { .. })
            ));
        }
    }
}
