//! Upstream page request parameters and validation.

use serde::Serialize;

use super::UpstreamError;

/// Largest page the upstream API accepts.
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Query parameters for one page of the bookmark listing.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Items per page (1-500).
    pub limit: u32,

    /// Opaque continuation token from the previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self { limit, cursor: None }
    }

    pub fn after(limit: u32, cursor: impl Into<String>) -> Self {
        Self { limit, cursor: Some(cursor.into()) }
    }

    /// Validate the request parameters.
    pub fn validate(&self) -> Result<(), UpstreamError> {
        if !(1..=MAX_PAGE_LIMIT).contains(&self.limit) {
            return Err(UpstreamError::InvalidRequest(format!(
                "limit must be 1-{MAX_PAGE_LIMIT}, got {}",
                self.limit
            )));
        }

        if let Some(cursor) = &self.cursor
            && cursor.trim().is_empty()
        {
            return Err(UpstreamError::InvalidRequest("cursor cannot be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request() {
        assert!(PageRequest::first(100).validate().is_ok());
        assert!(PageRequest::after(1, "abc").validate().is_ok());
    }

    #[test]
    fn test_invalid_limit() {
        assert!(matches!(PageRequest::first(0).validate(), Err(UpstreamError::InvalidRequest(_))));
        assert!(PageRequest::first(MAX_PAGE_LIMIT + 1).validate().is_err());
    }

    #[test]
    fn test_blank_cursor() {
        assert!(PageRequest::after(10, "  ").validate().is_err());
    }

    #[test]
    fn test_query_serialization() {
        let first = serde_json::to_value(PageRequest::first(50)).unwrap();
        assert_eq!(first, serde_json::json!({"limit": 50}));

        let next = serde_json::to_value(PageRequest::after(50, "c2")).unwrap();
        assert_eq!(next, serde_json::json!({"limit": 50, "cursor": "c2"}));
    }
}
