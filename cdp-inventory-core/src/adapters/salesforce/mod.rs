//! Salesforce adapter.
//!
//! Authenticates with the partner SOAP `login` call, describes each
//! requested sObject through the REST API, and counts records with SOQL
//! `COUNT()` queries: one for the object total and one per filterable field.
//!
//! # Views
//! `object_names` produces one view per object, keyed `Salesforce-{object}`.
//! Otherwise a single unnamed view over `object_name` (default `Contact`).

mod soap;


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
use futures::{FutureExt, StreamExt, TryStreamExt, stream};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::fmt;
use url::Url;
use zeroize::Zeroizing;

/// Salesforce platform identity.
pub static DESCRIPTOR: PlatformDescriptor = PlatformDescriptor {
    key: "salesforce",
    label: "Salesforce",
    credential_kind: CredentialKind::UsernamePassword,
};

/// REST and SOAP API version.
pub const API_VERSION: &str = "59.0";

const DEFAULT_DOMAIN: &str = "login";
const DEFAULT_OBJECT: &str = "Contact";
const CONTACT_FIELDS: &[&str] = &["Email", "Phone", "FirstName", "LastName"];
const CASE_FIELDS: &[&str] = &["Subject", "Description", "Status", "Priority", "Origin", "Type"];

/// Default profiled fields for an object; empty means every described field.
fn default_fields(object: &str) -> &'static [&'static str] {
    if object.eq_ignore_ascii_case("Contact") {
        CONTACT_FIELDS
    } else if object.eq_ignore_ascii_case("Case") {
        CASE_FIELDS
    } else {
        &[]
    }
}

/// sObject API names: a letter followed by letters, digits or underscores.
fn is_valid_object_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Login domain prefixes: `login`, `test`, `acme.my`, `acme--sandbox.sandbox.my`.
fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Salesforce adapter.
pub struct SalesforceAdapter {
    client: reqwest::Client,
    login_base: Option<Url>,
    field_concurrency: usize,
}

/// Session id and instance URL from a successful login.
pub struct SalesforceSession {
    instance_url: Url,
    session_id: Zeroizing<String>,
}

impl fmt::Debug for SalesforceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SalesforceSession")
            .field("instance_url", &self.instance_url.as_str())
            .field("session_id", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct DescribeResult {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    fields: Vec<DescribeField>,
}

#[derive(Debug, Deserialize)]
struct DescribeField {
    name: String,
    #[serde(rename = "type", default)]
    field_type: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default = "default_filterable")]
    filterable: bool,
}

const fn default_filterable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(rename = "totalSize")]
    total_size: u64,
}

impl SalesforceAdapter {
    /// Creates an adapter from shared settings.
    ///
    /// # Errors
    /// Returns `InventoryError::Configuration` if the HTTP client cannot be built.
    pub fn new(settings: &AdapterSettings) -> Result<Self> {
        Ok(Self {
            client: http::build_client(settings)?,
            login_base: settings.endpoints.salesforce_login.clone(),
            field_concurrency: settings.field_concurrency,
        })
    }

    fn login_url(&self, options: &Options) -> Result<Url> {
        let base = match &self.login_base {
            Some(base) => base.clone(),
            None => {
                let domain = options
                    .domain
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .unwrap_or(DEFAULT_DOMAIN);
                if !is_valid_domain(domain) {
                    return Err(InventoryError::authentication(format!(
                        "invalid Salesforce login domain '{domain}'"
                    )));
                }
                Url::parse(&format!("https://{domain}.salesforce.com/")).map_err(|e| {
                    InventoryError::authentication(format!("invalid Salesforce login domain: {e}"))
                })?
            }
        };

        base.join(&format!("services/Soap/u/{API_VERSION}"))
            .map_err(|e| InventoryError::configuration(format!("invalid Salesforce login URL: {e}")))
    }

    fn data_url(session: &SalesforceSession, path: &str, stage: Stage) -> Result<Url> {
        session
            .instance_url
            .join(&format!("services/data/v{API_VERSION}/{path}"))
            .map_err(|e| stage.error(format!("invalid Salesforce API path '{path}': {e}")))
    }

    async fn count(&self, session: &SalesforceSession, soql: &str, action: &str) -> Result<u64> {
        let url = Self::data_url(session, "query", Stage::FetchMetrics)?;
        let request = self
            .client
            .get(url)
            .query(&[("q", soql)])
            .bearer_auth(session.session_id.as_str());
        let result: QueryResult = http::send_json(request, Stage::FetchMetrics, action).await?;
        Ok(result.total_size)
    }

    async fn profile_view(
        &self,
        session: &SalesforceSession,
        view: &EntityView,
        options: &Options,
    ) -> Result<PlatformInventory> {
        let object = view.entity.as_str();
        let total = self
            .count(
                session,
                &format!("SELECT COUNT() FROM {object}"),
                &format!("count {object}"),
            )
            .await?;

        let profiled = view.profiled_fields();
        let unfilterable: Vec<String> = profiled
            .iter()
            .filter(|f| !f.filterable)
            .map(|f| f.name.clone())
            .collect();

        let futures: Vec<_> = profiled
            .into_iter()
            .map(|field| async move {
                if !field.filterable {
                    return Ok((field, None));
                }
                let soql = format!("SELECT COUNT() FROM {object} WHERE {} != null", field.name);
                let action = format!("count {object}.{}", field.name);
                self.count(session, &soql, &action)
                    .await
                    .map(|count| (field, Some(count)))
            }
            .boxed())
            .collect();
        let counts: Vec<(&FieldDefinition, Option<u64>)> = stream::iter(futures)
            .buffered(self.field_concurrency)
            .try_collect::<Vec<_>>()
            .await?;

        let mut inventory = build_inventory(&DESCRIPTOR, view, total, counts, options);
        for field in unfilterable {
            inventory.add_warning(format!(
                "field '{field}' cannot be filtered on {object}; non-null count unavailable"
            ));
        }
        inventory.metadata = inventory
            .metadata
            .with_scope("object", object)
            .with_scope("api_version", API_VERSION);

        tracing::debug!(
            object,
            total_records = total,
            fields = inventory.fields.len(),
            "Profiled Salesforce object"
        );
        Ok(inventory)
    }
}

#[async_trait]
impl PlatformAdapter for SalesforceAdapter {
    type Session = SalesforceSession;
    type Schema = EntitySchema;

    fn descriptor(&self) -> &'static PlatformDescriptor {
        &DESCRIPTOR
    }

    async fn authenticate(&self, credential: Credential, options: &Options) -> Result<Self::Session> {
        let Credential::UsernamePassword(credential) = credential else {
            return Err(InventoryError::authentication(
                "Salesforce expects a username/password credential",
            ));
        };

        let url = self.login_url(options)?;
        tracing::debug!(login_url = %crate::error::redact_url(url.as_str()), "Salesforce SOAP login");

        let envelope = soap::login_envelope(credential.username(), &credential.password_with_token());
        drop(credential);

        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/xml; charset=UTF-8")
            .header("SOAPAction", "login")
            .body(envelope.as_bytes().to_vec());
        let response = http::send(request, Stage::Authenticate, "SOAP login").await?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            InventoryError::authentication(format!(
                "SOAP login: failed to read response ({})",
                e.without_url()
            ))
        })?;

        if !status.is_success() {
            let detail = soap::parse_fault(&body)
                .unwrap_or_else(|| http::describe_status(status, &body));
            return Err(InventoryError::authentication(format!(
                "SOAP login rejected: {detail}"
            )));
        }

        let login = soap::parse_login_response(&body).ok_or_else(|| {
            InventoryError::authentication("SOAP login response did not contain a session")
        })?;
        let instance_url = Url::parse(&login.server_url)
            .and_then(|server| server.join("/"))
            .map_err(|_| {
                InventoryError::authentication("SOAP login returned an invalid server URL")
            })?;

        Ok(SalesforceSession {
            instance_url,
            session_id: login.session_id,
        })
    }

    async fn discover_schema(&self, session: &Self::Session, options: &Options) -> Result<Self::Schema> {
        let targets = ViewTargets::resolve(
            &options.object_names,
            options.object_name.as_deref(),
            DEFAULT_OBJECT,
        );

        let mut views = Vec::with_capacity(targets.entities.len());
        for object in &targets.entities {
            if !is_valid_object_name(object) {
                return Err(InventoryError::schema_discovery(format!(
                    "invalid Salesforce object name '{object}'"
                )));
            }

            let url = Self::data_url(
                session,
                &format!("sobjects/{object}/describe"),
                Stage::DiscoverSchema,
            )?;
            let request = self.client.get(url).bearer_auth(session.session_id.as_str());
            let describe: DescribeResult =
                http::send_json(request, Stage::DiscoverSchema, &format!("describe {object}"))
                    .await?;

            let fields = describe
                .fields
                .into_iter()
                .map(|field| {
                    let mut definition = FieldDefinition::new(field.name)
                        .with_label(field.label)
                        .with_filterable(field.filterable);
                    definition.data_type = field.field_type;
                    definition
                })
                .collect();

            views.push(EntityView {
                name: targets.view_name(object),
                display_name: None,
                entity: describe.name.unwrap_or_else(|| object.clone()),
                fields,
                requested_fields: requested_fields(options, default_fields(object)),
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
