//! API error type and the stable numeric error-code namespaces.
//!
//! Every failure surfaces as the envelope
//! `{"result":"fail","error":{"code":<int>,"msg":<string>}}`. Codes are
//! stable and namespaced: 100xx transport/auth, 200xx resources, 210xx
//! carpool groups, 230xx wallet, 402xx vendors, 460xx promo, 470xx
//! referral.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Stable numeric error codes.
pub mod codes {
    pub const MALFORMED_REQUEST: i32 = 10001;
    pub const MISSING_USER_HEADER: i32 = 10002;
    pub const MISSING_FIELD: i32 = 10003;
    pub const BAD_AUTH: i32 = 10004;

    pub const NOT_FOUND: i32 = 20001;

    pub const GROUP_NOT_FOUND: i32 = 21003;
    pub const ALREADY_MEMBER: i32 = 21005;
    pub const NOT_A_MEMBER: i32 = 21006;
    pub const MEMBERSHIP_PENDING: i32 = 21008;
    pub const NOT_GROUP_OWNER: i32 = 21009;
    pub const EMAIL_NOT_ELIGIBLE: i32 = 21016;

    pub const REFILL_PLAN_NOT_FOUND: i32 = 23008;
    pub const POINT_INSUFFICIENT: i32 = 23018;
    pub const USER_COIN_SUSPENDED: i32 = 23032;
    pub const COIN_PURCHASE_DAILY_LIMIT: i32 = 23033;
    pub const COIN_REDEEM_DAILY_LIMIT: i32 = 23034;

    pub const VENDOR_AUTH: i32 = 40202;
    pub const VENDOR_SERVICE: i32 = 40205;
    pub const VENDOR_DUPLICATE_SESSION: i32 = 40210;
    pub const VENDOR_PAYMENT: i32 = 40211;

    pub const PROMO_INVALID: i32 = 46001;

    pub const REFERRAL_INVALID_CODE: i32 = 47001;
    pub const REFERRAL_SELF: i32 = 47002;
    pub const REFERRAL_ALREADY_REFERRED: i32 = 47003;
    pub const REFERRAL_WINDOW_EXPIRED: i32 = 47004;
    pub const REFERRAL_NOT_ELIGIBLE: i32 = 47005;

    pub const INTERNAL: i32 = 50001;
}

/// User-facing message attached to coin suspensions.
pub const SUSPENSION_MESSAGE: &str =
    "Your Coin purchases have been suspended. Please contact support to restore access.";

/// API error carrying the stable code, the HTTP status and a message.
#[derive(Debug, thiserror::Error)]
#[error("[{code}] {msg}")]
pub struct ApiError {
    pub code: i32,
    pub status: StatusCode,
    pub msg: String,
}

impl ApiError {
    pub fn new(code: i32, status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            status,
            msg: msg.into(),
        }
    }

    pub fn bad_request(code: i32, msg: impl Into<String>) -> Self {
        Self::new(code, StatusCode::BAD_REQUEST, msg)
    }

    pub fn forbidden(code: i32, msg: impl Into<String>) -> Self {
        Self::new(code, StatusCode::FORBIDDEN, msg)
    }

    pub fn unauthorized(code: i32, msg: impl Into<String>) -> Self {
        Self::new(code, StatusCode::UNAUTHORIZED, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(codes::NOT_FOUND, StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::bad_request(codes::MISSING_FIELD, format!("missing field: {}", field))
    }

    pub fn insufficient_points() -> Self {
        Self::bad_request(codes::POINT_INSUFFICIENT, "insufficient coin balance")
    }

    pub fn coin_suspended() -> Self {
        Self::forbidden(codes::USER_COIN_SUSPENDED, SUSPENSION_MESSAGE)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Internal errors are logged in full; the envelope stays opaque.
        let msg = if self.status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(code = self.code, error = %self.msg, "internal error");
            "internal error".to_string()
        } else {
            self.msg
        };
        let body = Json(serde_json::json!({
            "result": "fail",
            "error": { "code": self.code, "msg": msg }
        }));
        (self.status, body).into_response()
    }
}

/// Result type for API handlers and services.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Success envelope helper.
pub fn success<T: serde::Serialize>(data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "result": "success", "data": data }))
}
