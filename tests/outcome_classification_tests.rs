//! Integration tests for outcome classification.
//!
//! These pin down the classification order: transport failure first, then
//! status 200, then the body phrases, then the fallthrough to Other.

use flashsale_loadtest::errors::TransportErrorKind;
use flashsale_loadtest::outcome::{classify, OutcomeCategory, TransactionResponse};

fn completed(status: u16, body: &str) -> OutcomeCategory {
    classify(&TransactionResponse::completed(status, body))
}

#[test]
fn test_200_is_success_for_any_body() {
    assert_eq!(completed(200, ""), OutcomeCategory::Success);
    assert_eq!(completed(200, "{\"ok\":true}"), OutcomeCategory::Success);
    assert_eq!(completed(200, "sold out"), OutcomeCategory::Success);
    assert_eq!(completed(200, "too many clients"), OutcomeCategory::Success);
}

#[test]
fn test_sold_out_anywhere_in_body() {
    assert_eq!(completed(409, "sold out"), OutcomeCategory::SoldOut);
    assert_eq!(
        completed(400, "{\"error\":\"tickets are sold out for this event\"}"),
        OutcomeCategory::SoldOut
    );
    assert_eq!(
        completed(500, "connection refused while checking: sold out"),
        OutcomeCategory::SoldOut
    );
}

#[test]
fn test_db_exhaustion_phrases() {
    assert_eq!(
        completed(503, "FATAL: sorry, too many clients already"),
        OutcomeCategory::ResourceExhaustion
    );
    assert_eq!(
        completed(500, "dial tcp [::1]:5432: connect: connection refused"),
        OutcomeCategory::ResourceExhaustion
    );
}

#[test]
fn test_only_the_two_exhaustion_phrases_match() {
    assert_eq!(
        completed(500, "remaining connection slots are reserved"),
        OutcomeCategory::Other
    );
    assert_eq!(completed(500, "connection reset"), OutcomeCategory::Other);
    assert_eq!(completed(500, "too many connections"), OutcomeCategory::Other);
}

#[test]
fn test_unmatched_failures_fall_to_other() {
    assert_eq!(completed(500, "internal error"), OutcomeCategory::Other);
    assert_eq!(completed(404, ""), OutcomeCategory::Other);
    assert_eq!(completed(204, ""), OutcomeCategory::Other);
    assert_eq!(completed(302, "moved"), OutcomeCategory::Other);
}

#[test]
fn test_case_sensitive_matching() {
    assert_eq!(completed(409, "Sold Out"), OutcomeCategory::Other);
    assert_eq!(completed(503, "TOO MANY CLIENTS"), OutcomeCategory::Other);
}

#[test]
fn test_no_response_is_transport_failure() {
    for kind in [
        TransportErrorKind::Timeout,
        TransportErrorKind::Connect,
        TransportErrorKind::Tls,
        TransportErrorKind::Body,
        TransportErrorKind::Other,
    ] {
        let response = TransactionResponse::transport_error(kind, "sold out");
        assert_eq!(
            classify(&response),
            OutcomeCategory::TransportFailure,
            "kind {}",
            kind
        );
    }
}

#[test]
fn test_categories_are_closed_and_ordered() {
    assert_eq!(OutcomeCategory::ALL.len(), OutcomeCategory::COUNT);
    let names: Vec<&str> = OutcomeCategory::ALL.iter().map(|c| c.name()).collect();
    assert_eq!(
        names,
        vec![
            "Success",
            "SoldOut",
            "ResourceExhaustion",
            "TransportFailure",
            "Other"
        ]
    );
}
