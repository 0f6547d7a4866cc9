//! Tests for the fetched lead shape and its field reduction.

use super::*;
use serde_json::json;

fn field(name: &str, values: &[&str]) -> LeadFieldData {
    LeadFieldData {
        name: name.to_string(),
        values: values.iter().map(|v| v.to_string()).collect(),
    }
}

fn lead_with_fields(field_data: Vec<LeadFieldData>) -> GraphLead {
    GraphLead {
        id: "4444".to_string(),
        created_time: Some("2026-08-25T10:00:00+0000".to_string()),
        field_data,
        ad_id: None,
        form_id: None,
        adgroup_id: None,
    }
}

#[test]
fn test_first_values_takes_first_value_per_field() {
    let lead = lead_with_fields(vec![
        field("phone_number", &["+4915112345678", "+4915100000000"]),
        field("email", &["lead@example.com"]),
    ]);

    let fields = lead.first_values();
    assert_eq!(fields["phone_number"], "+4915112345678");
    assert_eq!(fields["email"], "lead@example.com");
}

#[test]
fn test_first_values_later_duplicate_wins() {
    let lead = lead_with_fields(vec![
        field("email", &["first@example.com"]),
        field("email", &["second@example.com"]),
    ]);

    let fields = lead.first_values();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields["email"], "second@example.com");
}

#[test]
fn test_first_values_empty_list_maps_to_empty_string() {
    let lead = lead_with_fields(vec![field("phone_number", &[])]);

    assert_eq!(lead.first_values()["phone_number"], "");
}

#[test]
fn test_first_values_empty_field_data() {
    let lead = lead_with_fields(vec![]);

    assert!(lead.first_values().is_empty());
}

#[test]
fn test_graph_lead_decodes_from_api_response() {
    let payload = json!({
        "id": "4444",
        "created_time": "2026-08-25T10:00:00+0000",
        "ad_id": "5555",
        "form_id": "6666",
        "field_data": [
            {"name": "full_name", "values": ["Ada Lovelace"]},
            {"name": "email", "values": ["ada@example.com"]}
        ]
    });

    let lead: GraphLead = serde_json::from_value(payload).unwrap();
    assert_eq!(lead.id, "4444");
    assert_eq!(lead.ad_id.as_deref(), Some("5555"));
    assert!(lead.adgroup_id.is_none());
    assert_eq!(lead.field_data.len(), 2);
}

#[test]
fn test_graph_lead_decodes_without_field_data() {
    let lead: GraphLead = serde_json::from_value(json!({"id": "4444"})).unwrap();

    assert!(lead.field_data.is_empty());
    assert!(lead.created_time.is_none());
}

#[test]
fn test_error_transience_classification() {
    assert!(!GraphError::AccessTokenMissing.is_transient());
    assert!(!GraphError::InvalidResponse {
        message: "truncated".to_string()
    }
    .is_transient());
    assert!(GraphError::RequestFailed {
        message: "connection reset".to_string()
    }
    .is_transient());
    assert!(GraphError::Status {
        status: 503,
        body: "unavailable".to_string()
    }
    .is_transient());
    assert!(GraphError::Status {
        status: 429,
        body: "rate limited".to_string()
    }
    .is_transient());
    assert!(!GraphError::Status {
        status: 400,
        body: "bad id".to_string()
    }
    .is_transient());
}
