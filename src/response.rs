//! Standard response envelope: `{success, data, error, meta}`.

use crate::query::Meta;
use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T, meta: Option<Meta>) -> Self {
        Envelope {
            success: true,
            data: Some(data),
            error: None,
            meta,
        }
    }

    pub fn failure(message: String) -> Self {
        Envelope {
            success: false,
            data: None,
            error: Some(message),
            meta: None,
        }
    }
}

pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::OK, Json(Envelope::ok(data, None)))
}

pub fn success_created<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, Json(Envelope::ok(data, None)))
}

pub fn success_page<T: Serialize>(data: Vec<T>, meta: Meta) -> (StatusCode, Json<Envelope<Vec<T>>>) {
    (StatusCode::OK, Json(Envelope::ok(data, Some(meta))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_omits_data_and_meta() {
        let body = serde_json::to_value(Envelope::<()>::failure("boom".into())).unwrap();
        assert_eq!(body, json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn page_carries_meta() {
        let (status, Json(env)) = success_page(vec![json!({"id": 1})], Meta::new(2, 5, 12));
        assert_eq!(status, StatusCode::OK);
        let body = serde_json::to_value(env).unwrap();
        assert_eq!(body["meta"], json!({"page": 2, "page_size": 5, "total": 12, "pages": 3}));
        assert_eq!(body["success"], json!(true));
    }
}
