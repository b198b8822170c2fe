//! Wire-level payload tests for the Click webhook bodies.

use serde_json::json;
use sherlar_backend::click::types::{ClickResponse, CompleteRequest, PrepareRequest};

#[test]
fn prepare_payload_parses_from_gateway_json() {
    let body = json!({
        "click_trans_id": 12079144,
        "service_id": "22130",
        "merchant_trans_id": "f47ac10b58cc4372a5670e02b2c3d479",
        "merchant_user_id": "7789445876",
        "amount": "1111.0",
        "action": 0,
        "sign_time": "2026-01-05 12:31:08",
        "sign_string": "6cd address"
    });

    let request: PrepareRequest =
        serde_json::from_value(body).expect("gateway payload should parse");
    assert_eq!(request.click_trans_id, 12079144);
    assert_eq!(request.service_id, "22130");
    // The amount string is preserved verbatim; it feeds the signature as-is.
    assert_eq!(request.amount, "1111.0");
}

#[test]
fn complete_payload_parses_with_negative_gateway_error() {
    let body = json!({
        "click_trans_id": "12079150",
        "service_id": 22130,
        "merchant_trans_id": "f47ac10b58cc4372a5670e02b2c3d479",
        "merchant_prepare_id": "41",
        "amount": 1111,
        "action": "1",
        "error": -5017,
        "sign_time": "2026-01-05 12:34:00",
        "sign_string": "deadbeef"
    });

    let request: CompleteRequest =
        serde_json::from_value(body).expect("gateway payload should parse");
    assert_eq!(request.merchant_prepare_id, 41);
    assert_eq!(request.error, -5017);
    assert_eq!(request.amount, "1111");
}

#[test]
fn response_serializes_with_full_click_shape() {
    let response = ClickResponse {
        click_trans_id: 12079144,
        merchant_trans_id: "f47ac10b58cc4372a5670e02b2c3d479".to_string(),
        merchant_prepare_id: 41,
        error: 0,
        error_note: "Success".to_string(),
        sign_time: "2026-01-05 12:31:08".to_string(),
        sign_string: "abcdef".to_string(),
    };

    let value = serde_json::to_value(&response).expect("should serialize");
    for key in [
        "click_trans_id",
        "merchant_trans_id",
        "merchant_prepare_id",
        "error",
        "error_note",
        "sign_time",
        "sign_string",
    ] {
        assert!(value.get(key).is_some(), "missing response field {}", key);
    }
    assert_eq!(value["error"], 0);
    assert_eq!(value["merchant_prepare_id"], 41);
}

#[test]
fn malformed_prepare_body_is_rejected_by_parser() {
    let body = json!({
        "click_trans_id": 1,
        "service_id": "22130"
    });
    assert!(serde_json::from_value::<PrepareRequest>(body).is_err());
}
