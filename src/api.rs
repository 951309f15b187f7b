use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Uniform result envelope every endpoint responds with.
#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub fn ok<T: Serialize>(message: &str, data: T) -> Response {
    with_status(StatusCode::OK, message, data)
}

pub fn created<T: Serialize>(message: &str, data: T) -> Response {
    with_status(StatusCode::CREATED, message, data)
}

pub fn failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(Envelope::<()> {
            success: false,
            message: message.to_string(),
            data: None,
        }),
    )
        .into_response()
}

fn with_status<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    (
        status,
        Json(Envelope {
            success: true,
            message: message.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_skip_missing_data() {
        let json = serde_json::to_string(&Envelope::<()> {
            success: false,
            message: "nope".into(),
            data: None,
        })
        .unwrap();

        assert_eq!(json, r#"{"success":false,"message":"nope"}"#);
    }

    #[test]
    fn should_serialize_data() {
        let json = serde_json::to_string(&Envelope {
            success: true,
            message: "ok".into(),
            data: Some(vec![1, 2, 3]),
        })
        .unwrap();

        assert_eq!(json, r#"{"success":true,"message":"ok","data":[1,2,3]}"#);
    }
}
