//! HubSpot adapter.
//!
//! A private-app or OAuth access token is checked against the account-info
//! endpoint, properties are read from the CRM properties API, and counts
//! come from paging through the CRM objects API: every record adds to the
//! total, every non-empty property value adds to that field's count.
//!
//! # Views
//! `object_types` produces one view per type, keyed `HubSpot-{type}`.
//! Otherwise a single unnamed view over `object_type` (default `contacts`).


use super::http::{self, Stage};
use super::{
    AdapterSettings, PlatformAdapter, PlatformDescriptor, ViewTargets, build_inventory,
    requested_fields,
};
use crate::error::{InventoryError, Result};
use crate::models::{EntitySchema, EntityView, FieldDefinition, PlatformInventory};
use crate::options::Options;
use crate::security::{Credential, CredentialKind};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use url::Url;
use zeroize::Zeroizing;

/// HubSpot platform identity.
pub static DESCRIPTOR: PlatformDescriptor = PlatformDescriptor {
    key: "hubspot",
    label: "HubSpot",
    credential_kind: CredentialKind::AccessToken,
};

const DEFAULT_API_BASE: &str = "https://api.hubapi.com/";
const DEFAULT_OBJECT_TYPE: &str = "contacts";
/// Properties requested per record scan; larger sets are split across scans
/// to keep the list URL short.
const MAX_PROPERTIES_PER_SCAN: usize = 100;
const CONTACT_FIELDS: &[&str] = &["email", "phone", "firstname", "lastname"];
const DEAL_FIELDS: &[&str] = &["dealname", "amount", "dealstage", "closedate", "pipeline"];
const TICKET_FIELDS: &[&str] = &[
    "subject",
    "content",
    "hs_pipeline_stage",
    "hs_ticket_priority",
    "createdate",
];

/// Default profiled properties for an object type; empty means every property.
fn default_fields(object_type: &str) -> &'static [&'static str] {
    match object_type.to_ascii_lowercase().as_str() {
        "contacts" => CONTACT_FIELDS,
        "deals" => DEAL_FIELDS,
        "tickets" => TICKET_FIELDS,
        _ => &[],
    }
}

/// Object types: standard names (`contacts`), custom names (`p_widgets`) or ids (`2-123456`).
fn is_valid_object_type(object_type: &str) -> bool {
    !object_type.is_empty()
        && object_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// HubSpot adapter.
pub struct HubSpotAdapter {
    client: reqwest::Client,
    api_base: Url,
}

/// Verified access token plus account details when the token may read them.
pub struct HubSpotSession {
    token: Zeroizing<String>,
    portal_id: Option<u64>,
}

impl fmt::Debug for HubSpotSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubSpotSession")
            .field("portal_id", &self.portal_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct AccountDetails {
    #[serde(rename = "portalId", default)]
    portal_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PropertiesResponse {
    #[serde(default)]
    results: Vec<Property>,
}

#[derive(Debug, Deserialize)]
struct Property {
    name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(rename = "type", default)]
    property_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectPage {
    #[serde(default)]
    results: Vec<ObjectRecord>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct ObjectRecord {
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    after: String,
}

/// A property value counts when it is neither null nor an empty string.
fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Splits requested properties into scan-sized batches; an empty list still scans once.
fn property_batches<'a>(names: &'a [&'a str]) -> Vec<&'a [&'a str]> {
    if names.is_empty() {
        vec![names]
    } else {
        names.chunks(MAX_PROPERTIES_PER_SCAN).collect()
    }
}

/// Totals accumulated while paging through one object type.
#[derive(Debug, Default)]
struct ScanTotals {
    records: u64,
    non_empty: Vec<u64>,
    pages: u64,
}

impl HubSpotAdapter {
    /// Creates an adapter from shared settings.
    ///
    /// # Errors
    /// Returns `InventoryError::Configuration` if the HTTP client cannot be built.
    pub fn new(settings: &AdapterSettings) -> Result<Self> {
        let api_base = match &settings.endpoints.hubspot_api {
            Some(base) => base.clone(),
            None => Url::parse(DEFAULT_API_BASE).map_err(|e| {
                InventoryError::configuration(format!("invalid HubSpot API base: {e}"))
            })?,
        };

        Ok(Self {
            client: http::build_client(settings)?,
            api_base,
        })
    }

    fn url(&self, path: &str, stage: Stage) -> Result<Url> {
        self.api_base
            .join(path)
            .map_err(|e| stage.error(format!("invalid HubSpot API path '{path}': {e}")))
    }

    async fn scan_records(
        &self,
        session: &HubSpotSession,
        object_type: &str,
        properties: &[&str],
        page_size: u32,
    ) -> Result<ScanTotals> {
        let action = format!("list {object_type}");
        let mut totals = ScanTotals {
            non_empty: vec![0; properties.len()],
            ..ScanTotals::default()
        };
        let mut after: Option<String> = None;

        loop {
            let url = self.url(&format!("crm/v3/objects/{object_type}"), Stage::FetchMetrics)?;
            let mut query: Vec<(&str, String)> = vec![
                ("limit", page_size.to_string()),
                ("archived", "false".to_string()),
            ];
            if !properties.is_empty() {
                query.push(("properties", properties.join(",")));
            }
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let request = self
                .client
                .get(url)
                .query(&query)
                .bearer_auth(session.token.as_str());
            let page: ObjectPage = http::send_json(request, Stage::FetchMetrics, &action).await?;
            totals.pages = totals.pages.saturating_add(1);

            for record in &page.results {
                totals.records = totals.records.saturating_add(1);
                for (count, property) in totals.non_empty.iter_mut().zip(properties) {
                    if record.properties.get(*property).is_some_and(has_value) {
                        *count = count.saturating_add(1);
                    }
                }
            }

            let next = page.paging.and_then(|p| p.next).map(|n| n.after);
            match next {
                Some(cursor) if after.as_deref() != Some(cursor.as_str()) => after = Some(cursor),
                _ => break,
            }
        }

        Ok(totals)
    }

    async fn profile_view(
        &self,
        session: &HubSpotSession,
        view: &EntityView,
        options: &Options,
    ) -> Result<PlatformInventory> {
        let page_size = options.effective_page_size();
        let profiled = view.profiled_fields();
        let names: Vec<&str> = profiled.iter().map(|f| f.name.as_str()).collect();

        let mut totals = ScanTotals::default();
        for (batch_index, batch) in property_batches(&names).into_iter().enumerate() {
            let batch_totals = self
                .scan_records(session, &view.entity, batch, page_size)
                .await?;
            if batch_index == 0 {
                totals.records = batch_totals.records;
            }
            totals.pages = totals.pages.saturating_add(batch_totals.pages);
            totals.non_empty.extend(batch_totals.non_empty);
        }

        let counts: Vec<(&FieldDefinition, Option<u64>)> = profiled
            .into_iter()
            .zip(totals.non_empty.iter().copied())
            .map(|(field, count)| (field, Some(count)))
            .collect();

        let mut inventory = build_inventory(&DESCRIPTOR, view, totals.records, counts, options);
        let mut metadata = std::mem::take(&mut inventory.metadata)
            .with_scope("object_type", view.entity.as_str())
            .with_scope("page_size", page_size)
            .with_scope("pages_fetched", totals.pages);
        if let Some(portal_id) = session.portal_id {
            metadata = metadata.with_scope("portal_id", portal_id);
        }
        inventory.metadata = metadata;

        tracing::debug!(
            object_type = %view.entity,
            total_records = totals.records,
            pages = totals.pages,
            "Profiled HubSpot object type"
        );
        Ok(inventory)
    }
}

#[async_trait]
impl PlatformAdapter for HubSpotAdapter {
    type Session = HubSpotSession;
    type Schema = EntitySchema;

    fn descriptor(&self) -> &'static PlatformDescriptor {
        &DESCRIPTOR
    }

    async fn authenticate(&self, credential: Credential, _options: &Options) -> Result<Self::Session> {
        let Credential::AccessToken(token) = credential else {
            return Err(InventoryError::authentication(
                "HubSpot expects an access token credential",
            ));
        };
        let token = token.into_secret();

        const ACTION: &str = "verify access token";
        let url = self.url("account-info/v3/details", Stage::Authenticate)?;
        let request = self.client.get(url).bearer_auth(token.as_str());
        let response = http::send(request, Stage::Authenticate, ACTION).await?;

        // 403 means the token is valid but lacks the account-info scope.
        let portal_id = if response.status() == StatusCode::FORBIDDEN {
            tracing::debug!("HubSpot token cannot read account details; continuing");
            None
        } else {
            let details: AccountDetails =
                http::read_json(response, Stage::Authenticate, ACTION).await?;
            details.portal_id
        };

        Ok(HubSpotSession { token, portal_id })
    }

    async fn discover_schema(&self, session: &Self::Session, options: &Options) -> Result<Self::Schema> {
        let targets = ViewTargets::resolve(
            &options.object_types,
            options.object_type.as_deref(),
            DEFAULT_OBJECT_TYPE,
        );

        let mut views = Vec::with_capacity(targets.entities.len());
        for object_type in &targets.entities {
            if !is_valid_object_type(object_type) {
                return Err(InventoryError::schema_discovery(format!(
                    "invalid HubSpot object type '{object_type}'"
                )));
            }

            let url = self.url(
                &format!("crm/v3/properties/{object_type}"),
                Stage::DiscoverSchema,
            )?;
            let request = self.client.get(url).bearer_auth(session.token.as_str());
            let properties: PropertiesResponse = http::send_json(
                request,
                Stage::DiscoverSchema,
                &format!("list {object_type} properties"),
            )
            .await?;

            let fields = properties
                .results
                .into_iter()
                .map(|property| {
                    let mut definition = FieldDefinition::new(property.name).with_label(property.label);
                    definition.data_type = property.property_type;
                    definition
                })
                .collect();

            views.push(EntityView {
                name: targets.view_name(object_type),
                display_name: None,
                entity: object_type.clone(),
                fields,
                requested_fields: requested_fields(options, default_fields(object_type)),
            });
        }

        Ok(EntitySchema { views })
    }

    async fn compute_field_metrics(
        &self,
        session: &Self::Session,
        schema: &Self::Schema,
        options: &Options,
    ) -> Result<Vec<PlatformInventory>> {
        let mut inventories = Vec::with_capacity(schema.views.len());
        for view in &schema.views {
            inventories.push(self.profile_view(session, view, options).await?);
        }
        Ok(inventories)
    }
}
