use super::*;

fn row_with_counts() -> RawTicketRow {
    RawTicketRow {
        train_code: "G101".to_string(),
        departure_station: "北京南".to_string(),
        destination_station: "上海虹桥".to_string(),
        depart_time: "06:36".to_string(),
        arrive_time: "12:40".to_string(),
        during_time: "06:04".to_string(),
        hs: "y".to_string(),
        business_class: Some("有".to_string()),
        first_class: Some("  ".to_string()),
        second_class: Some("50".to_string()),
        no_seat: Some(String::new()),
        ..RawTicketRow::default()
    }
}

#[test]
fn blank_seat_columns_produce_no_offers() {
    let offers = row_with_counts().offers();

    let classes: Vec<SeatClass> = offers.iter().map(|offer| offer.seat_class).collect();
    assert_eq!(classes, vec![SeatClass::Business, SeatClass::Second]);
    assert_eq!(offers[1].availability, Availability::Seats(50));
    assert_eq!(offers[1].service, ServiceKind::HighSpeed);
    assert_eq!(offers[1].origin, "北京南");
}

#[test]
fn decodes_ticket_batch() {
    let payload = StreamPayload::decode(
        r#"[{"train_code":"G101","departure_station":"北京","destination_station":"上海","second_class":"50","first_class":12}]"#,
    )
    .expect("decode")
    .expect("payload");

    let StreamPayload::Batch(rows) = payload else {
        panic!("expected batch");
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].seat_count(SeatClass::Second), Some("50"));
    assert_eq!(rows[0].seat_count(SeatClass::First), Some("12"));
    assert_eq!(rows[0].seat_count(SeatClass::HardSeat), None);
}

#[test]
fn decodes_empty_batch_and_blank_event() {
    assert_eq!(
        StreamPayload::decode("[]").expect("decode"),
        Some(StreamPayload::Batch(Vec::new()))
    );
    assert_eq!(StreamPayload::decode("  ").expect("decode"), None);
}

#[test]
fn decodes_no_data_sentinel_in_both_forms() {
    assert_eq!(
        StreamPayload::decode("__NO_DATA__").expect("decode"),
        Some(StreamPayload::NoRouteData)
    );
    assert_eq!(
        StreamPayload::decode("\"__NO_DATA__\"").expect("decode"),
        Some(StreamPayload::NoRouteData)
    );
}

#[test]
fn decodes_upstream_error_object() {
    assert_eq!(
        StreamPayload::decode(r#"{"error":"crawler crashed"}"#).expect("decode"),
        Some(StreamPayload::UpstreamError("crawler crashed".to_string()))
    );
}

#[test]
fn rejects_malformed_payloads() {
    assert!(matches!(
        StreamPayload::decode("[{"),
        Err(PayloadError::Decode(_))
    ));
    assert!(matches!(
        StreamPayload::decode(r#"{"status":"ok"}"#),
        Err(PayloadError::UnexpectedObject(_))
    ));
    assert!(matches!(
        StreamPayload::decode("42"),
        Err(PayloadError::UnexpectedShape(_))
    ));
}

#[test]
fn stop_request_bodies_match_backend_contract() {
    let query = SearchQuery {
        student_ticket: true,
        ..SearchQuery::stations("2025-05-01", "北京", "上海")
    };
    let StopRequest::Stations(body) = StopRequest::for_query(&query) else {
        panic!("expected station stop");
    };
    assert_eq!(
        serde_json::to_value(&body).expect("serialize"),
        serde_json::json!({
            "departure": "北京",
            "destination": "上海",
            "date": "2025-05-01",
            "studentTicket": true,
            "highSpeed": false,
            "strictmode": false,
        })
    );

    let request = StopRequest::for_query(&SearchQuery::train_code("2025-05-01", "G101"));
    assert_eq!(request.mode(), SearchMode::TrainCode);
    let StopRequest::TrainCode(body) = request else {
        panic!("expected train code stop");
    };
    assert_eq!(
        serde_json::to_value(&body).expect("serialize"),
        serde_json::json!({
            "trainCode": "G101",
            "date": "2025-05-01",
            "studentTicket": false,
        })
    );
}

#[test]
fn stop_response_success_status() {
    let ok: StopResponse = serde_json::from_str(r#"{"status":"success"}"#).expect("parse");
    let failed: StopResponse = serde_json::from_str(r#"{"status":"not_found"}"#).expect("parse");
    assert!(ok.is_success());
    assert!(!failed.is_success());
}
