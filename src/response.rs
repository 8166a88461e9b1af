use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
        }
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
        }
    }
}

/// Error payload carried in the envelope's data slot so failures and
/// successes share one response shape on the wire.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }
}

impl ApiResponse<ErrorDetail> {
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            data: Some(ErrorDetail {
                error: message.clone(),
            }),
            message,
            meta: Some(Meta::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_mirrors_message_into_error_detail() {
        let resp = ApiResponse::failure("Insufficient stock: product 'agua'");
        assert_eq!(resp.message, "Insufficient stock: product 'agua'");
        assert_eq!(resp.data.unwrap().error, "Insufficient stock: product 'agua'");
        assert!(resp.meta.unwrap().total.is_none());
    }
}
