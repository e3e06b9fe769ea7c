//! End-to-end inventory runs through the public API against one mock server
//! standing in for Salesforce, HubSpot and Google Analytics.

use cdp_inventory_core::adapters::{AdapterSettings, AggregatorConfig, PlatformEndpoints};
use cdp_inventory_core::validation::validate_response;
use cdp_inventory_core::{InventoryAggregator, InventoryRequest};
use httpmock::prelude::*;
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

const TEST_KEY: &str = include_str!("fixtures/service_account_key.pem");

fn aggregator_for(server: &MockServer) -> InventoryAggregator {
    let base = Url::parse(&server.base_url()).unwrap();
    let settings = AdapterSettings::default()
        .with_request_timeout(Duration::from_secs(5))
        .with_endpoints(PlatformEndpoints::all(&base));
    InventoryAggregator::with_default_platforms(
        settings,
        AggregatorConfig::default().with_pipeline_timeout(Duration::from_secs(20)),
    )
}

fn request(connections: Value, options: Value) -> InventoryRequest {
    InventoryRequest::from_value(json!({
        "user": {"first_name": "Ada", "email": "ada@example.com", "connections": connections},
        "options": options
    }))
    .unwrap()
}

fn salesforce_connection() -> Value {
    json!({
        "name": "salesforce",
        "username": "ops@example.com",
        "password": "hunter2",
        "security_token": "TOKEN42"
    })
}

fn hubspot_connection() -> Value {
    json!({"type": "HubSpot", "access_token": "pat-na1-secret"})
}

fn analytics_connection() -> Value {
    json!({
        "name": "Google Analytics",
        "client_email": "inventory@acme-analytics.iam.gserviceaccount.com",
        "private_key": TEST_KEY,
        "private_key_id": "key-1",
        "project_id": "acme-analytics"
    })
}

async fn mock_salesforce(server: &MockServer) {
    let login_body = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?><soapenv:Envelope><soapenv:Body>"#,
            r#"<loginResponse><result><serverUrl>{}/services/Soap/u/59.0/00D000000000001</serverUrl>"#,
            r#"<sessionId>SF-SESSION-SECRET</sessionId></result></loginResponse></soapenv:Body></soapenv:Envelope>"#
        ),
        server.base_url()
    );
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/services/Soap/u/59.0")
                .body_contains("<n1:password>hunter2TOKEN42</n1:password>");
            then.status(200).header("content-type", "text/xml").body(login_body);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/services/data/v59.0/sobjects/Contact/describe");
            then.status(200).json_body(json!({
                "name": "Contact",
                "fields": [
                    {"name": "Email", "type": "email", "filterable": true},
                    {"name": "Phone", "type": "phone", "filterable": true},
                    {"name": "FirstName", "type": "string", "filterable": true}
                ]
            }));
        })
        .await;
    for (soql, total) in [
        ("SELECT COUNT() FROM Contact", 10),
        ("SELECT COUNT() FROM Contact WHERE Email != null", 8),
        ("SELECT COUNT() FROM Contact WHERE Phone != null", 4),
        ("SELECT COUNT() FROM Contact WHERE FirstName != null", 10),
    ] {
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/services/data/v59.0/query")
                    .header("authorization", "Bearer SF-SESSION-SECRET")
                    .query_param("q", soql);
                then.status(200)
                    .json_body(json!({"totalSize": total, "done": true, "records": []}));
            })
            .await;
    }
}

async fn mock_hubspot(server: &MockServer, status: u16) {
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/account-info/v3/details")
                .header("authorization", "Bearer pat-na1-secret");
            if status == 200 {
                then.status(200).json_body(json!({"portalId": 4455}));
            } else {
                then.status(status)
                    .json_body(json!({"status": "error", "message": "Authentication credentials not found"}));
            }
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/crm/v3/properties/contacts");
            then.status(200).json_body(json!({"results": [
                {"name": "email", "label": "Email", "type": "string"},
                {"name": "phone", "label": "Phone Number", "type": "string"},
                {"name": "firstname", "label": "First Name", "type": "string"},
                {"name": "lastname", "label": "Last Name", "type": "string"}
            ]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/crm/v3/objects/contacts");
            then.status(200).json_body(json!({"results": [
                {"id": "1", "properties": {"email": "a@example.com", "phone": null, "firstname": "A", "lastname": ""}},
                {"id": "2", "properties": {"email": "b@example.com", "phone": "555", "firstname": "B", "lastname": "Bee"}}
            ]}));
        })
        .await;
}

async fn mock_analytics(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/token").body_contains("assertion=");
            then.status(200)
                .json_body(json!({"access_token": "ya29.secret-token", "expires_in": 3599}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1beta/properties/123456/metadata");
            then.status(200).json_body(json!({
                "dimensions": [
                    {"apiName": "sessionSource", "uiName": "Session source"},
                    {"apiName": "eventName", "uiName": "Event name"},
                    {"apiName": "country", "uiName": "Country"}
                ],
                "metrics": [{"apiName": "totalUsers", "uiName": "Total users"}]
            }));
        })
        .await;
    for (dimension, value) in [("sessionSource", "150"), ("eventName", "200"), ("country", "100")] {
        let filter = format!(r#""dimensions":[{{"name":"{dimension}"}}]"#);
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/properties/123456:runReport")
                    .body_contains(filter.as_str());
                then.status(200)
                    .json_body(json!({"totals": [{"metricValues": [{"value": value}]}]}));
            })
            .await;
    }
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1beta/properties/123456:runReport")
                .body_contains(r#""metricAggregations":["TOTAL"]}"#);
            then.status(200)
                .json_body(json!({"totals": [{"metricValues": [{"value": "200"}]}]}));
        })
        .await;
}

fn assert_no_secrets(value: &Value) {
    let text = value.to_string();
    for secret in [
        "hunter2",
        "TOKEN42",
        "SF-SESSION-SECRET",
        "pat-na1-secret",
        "ya29.secret-token",
        "PRIVATE KEY",
    ] {
        assert!(!text.contains(secret), "response leaked {secret}");
    }
}

#[tokio::test]
async fn test_integration_all_platforms_merge_into_one_response() {
    let server = MockServer::start_async().await;
    mock_salesforce(&server).await;
    mock_hubspot(&server, 200).await;
    mock_analytics(&server).await;

    let response = aggregator_for(&server)
        .run_request(request(
            json!([salesforce_connection(), hubspot_connection(), analytics_connection()]),
            json!({"property_id": 123456}),
        ))
        .await
        .unwrap();

    assert_eq!(response.error_count(), 0, "{:?}", response.errors);
    assert_eq!(response.inventory_count(), 3);

    let salesforce = response.get("Salesforce").unwrap();
    assert_eq!(salesforce.total_records, 10);
    assert_eq!(salesforce.fields.len(), 3);
    assert_eq!(salesforce.fields[0].completeness_pct, Some(0.8));
    assert!(salesforce.metadata.warnings.iter().any(|w| w.contains("LastName")));

    let hubspot = response.get("HubSpot").unwrap();
    assert_eq!(hubspot.total_records, 2);
    let counts: Vec<Option<u64>> = hubspot.fields.iter().map(|f| f.non_null_count).collect();
    assert_eq!(counts, vec![Some(2), Some(1), Some(2), Some(1)]);

    let analytics = response.get("Google Analytics").unwrap();
    assert_eq!(analytics.entity, "users");
    assert_eq!(analytics.total_records, 200);
    let pct: Vec<Option<f64>> = analytics.fields.iter().map(|f| f.completeness_pct).collect();
    assert_eq!(pct, vec![Some(0.75), Some(1.0), Some(0.5)]);

    let value = validate_response(&response).unwrap();
    assert!(value.get("_errors").is_none());
    assert_no_secrets(&value);
}

#[tokio::test]
async fn test_integration_failures_are_isolated_per_connection() {
    let server = MockServer::start_async().await;
    mock_salesforce(&server).await;
    mock_hubspot(&server, 401).await;

    let response = aggregator_for(&server)
        .run_request(request(
            json!([
                salesforce_connection(),
                hubspot_connection(),
                {"name": "Marketo", "api_key": "k"},
                {"name": "google_analytics", "client_email": "x@example.com"}
            ]),
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.inventory_count(), 1);
    assert!(response.get("Salesforce").is_some());

    assert_eq!(response.error_count(), 3);
    assert!(response.errors["HubSpot"].starts_with("Authentication failed"));
    assert!(response.errors["HubSpot"].contains("401"));
    assert_eq!(response.errors["Marketo"], "Unknown platform 'Marketo'");
    assert!(response.errors["Google Analytics"].contains("private_key"));

    let value = validate_response(&response).unwrap();
    assert_no_secrets(&value);
}

#[tokio::test]
async fn test_integration_invalid_request_aborts_before_any_call() {
    let server = MockServer::start_async().await;
    let login = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(500);
        })
        .await;

    let err = aggregator_for(&server)
        .run_request(request(
            json!([salesforce_connection()]),
            json!({"date_ranges": [{"start_date": "2024-02-01", "end_date": "2024-01-01"}]}),
        ))
        .await
        .unwrap_err();

    assert!(err.is_request_fatal());
    assert!(err.to_string().contains("date_ranges[0]"));
    login.assert_hits_async(0).await;
}
