//! Google Analytics 4 adapter.
//!
//! A service-account key signs an OAuth assertion that is exchanged for an
//! access token. The property's metadata lists every dimension and metric;
//! counts come from `runReport` totals:
//! - entity size: the view's metric total over the date ranges
//! - dimension: the coverage metric total over rows where the dimension is
//!   not `(not set)`
//! - metric: the metric's own total
//!
//! # Views
//! `metric_views` produces one view per entry, keyed by its `name` (or
//! `metric`) and labelled by its `displayName`. Otherwise a single unnamed
//! view sized by `metrics[0]`.

mod auth;
mod report;


use super::http::{self, Stage};
use super::{AdapterSettings, PlatformAdapter, PlatformDescriptor, build_inventory, requested_fields};
use crate::error::{InventoryError, Result};
use crate::models::{EntityView, FieldDefinition, PlatformInventory};
use crate::options::{DateRange, Options};
use crate::security::{Credential, CredentialKind};
use async_trait::async_trait;
use futures::{FutureExt, StreamExt, TryStreamExt, stream};
use report::{ReportRequest, ReportResponse};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use url::Url;
use zeroize::Zeroizing;

/// Google Analytics platform identity.
pub static DESCRIPTOR: PlatformDescriptor = PlatformDescriptor {
    key: "google_analytics",
    label: "Google Analytics",
    credential_kind: CredentialKind::ServiceAccount,
};

const DEFAULT_DATA_BASE: &str = "https://analyticsdata.googleapis.com/";
const DEFAULT_METRIC: &str = "totalUsers";
/// Dimensions profiled when a request names none.
///
/// `userPseudoId` exists only in the BigQuery export, not in the Data API
/// metadata, so it would always be skipped with a warning; `country` takes
/// its place.
const DEFAULT_FIELDS: &[&str] = &["sessionSource", "eventName", "country"];
const ENTITY: &str = "users";

/// `FieldDefinition::data_type` of a dimension.
pub const DIMENSION: &str = "dimension";
/// `FieldDefinition::data_type` of a metric.
pub const METRIC: &str = "metric";

/// Accepts `123456` or `properties/123456`.
fn normalize_property_id(raw: Option<&str>) -> Result<String> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(InventoryError::schema_discovery(
            "options.property_id is required for Google Analytics",
        ));
    }

    let id = raw.strip_prefix("properties/").unwrap_or(raw);
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InventoryError::schema_discovery(format!(
            "invalid Google Analytics property id '{raw}'"
        )));
    }
    Ok(id.to_string())
}

/// One report view before the property metadata is known.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewPlan {
    name: Option<String>,
    display_name: Option<String>,
    fields: Vec<String>,
    total_metric: String,
    coverage_metric: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn plan_views(options: &Options) -> Vec<ViewPlan> {
    if options.metric_views.is_empty() {
        let coverage = non_empty(options.completeness_metric.as_deref());
        let total_metric = options
            .metrics
            .iter()
            .map(String::as_str)
            .find_map(|m| non_empty(Some(m)))
            .or(coverage)
            .unwrap_or(DEFAULT_METRIC)
            .to_string();
        let coverage_metric = coverage.map_or_else(|| total_metric.clone(), str::to_string);

        return vec![ViewPlan {
            name: None,
            display_name: None,
            fields: requested_fields(options, DEFAULT_FIELDS),
            total_metric,
            coverage_metric,
        }];
    }

    let mut plans: Vec<ViewPlan> = Vec::with_capacity(options.metric_views.len());
    for view in &options.metric_views {
        let Some(key) = view.key() else { continue };
        if plans.iter().any(|p| p.name.as_deref() == Some(key)) {
            continue;
        }

        let metric = non_empty(view.metric.as_deref()).unwrap_or(DEFAULT_METRIC);
        let fields: Vec<String> = view
            .fields
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();

        plans.push(ViewPlan {
            name: Some(key.to_string()),
            display_name: view.display_name.clone(),
            fields: if fields.is_empty() {
                requested_fields(options, DEFAULT_FIELDS)
            } else {
                fields
            },
            total_metric: metric.to_string(),
            coverage_metric: metric.to_string(),
        });
    }
    plans
}

/// A report view: the entity view plus the metrics that size it.
#[derive(Debug, Clone)]
pub struct AnalyticsView {
    /// Fields and naming
    pub view: EntityView,
    /// Metric whose total is the view's record count
    pub total_metric: String,
    /// Metric counted for dimension coverage and used as the completeness denominator
    pub coverage_metric: String,
}

/// Property metadata resolved into report views.
#[derive(Debug, Clone)]
pub struct AnalyticsSchema {
    /// Numeric property id
    pub property_id: String,
    /// Views in request order
    pub views: Vec<AnalyticsView>,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    dimensions: Vec<MetadataItem>,
    #[serde(default)]
    metrics: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataItem {
    api_name: String,
    #[serde(default)]
    ui_name: Option<String>,
}

/// Google Analytics adapter.
pub struct GoogleAnalyticsAdapter {
    client: reqwest::Client,
    token_endpoint: Option<Url>,
    data_base: Url,
    field_concurrency: usize,
}

/// OAuth access token for the Data API.
pub struct GoogleAnalyticsSession {
    access_token: Zeroizing<String>,
}

impl fmt::Debug for GoogleAnalyticsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleAnalyticsSession")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl GoogleAnalyticsAdapter {
    /// Creates an adapter from shared settings.
    ///
    /// # Errors
    /// Returns `InventoryError::Configuration` if the HTTP client cannot be built.
    pub fn new(settings: &AdapterSettings) -> Result<Self> {
        let data_base = match &settings.endpoints.google_analytics_data {
            Some(base) => base.clone(),
            None => Url::parse(DEFAULT_DATA_BASE).map_err(|e| {
                InventoryError::configuration(format!("invalid Analytics Data API base: {e}"))
            })?,
        };

        Ok(Self {
            client: http::build_client(settings)?,
            token_endpoint: settings.endpoints.google_token.clone(),
            data_base,
            field_concurrency: settings.field_concurrency,
        })
    }

    fn property_url(&self, property_id: &str, method: &str, stage: Stage) -> Result<Url> {
        self.data_base
            .join(&format!("v1beta/properties/{property_id}{method}"))
            .map_err(|e| stage.error(format!("invalid Analytics Data API path: {e}")))
    }

    async fn run_report(
        &self,
        session: &GoogleAnalyticsSession,
        property_id: &str,
        body: &ReportRequest<'_>,
        action: &str,
    ) -> Result<u64> {
        let url = self.property_url(property_id, ":runReport", Stage::FetchMetrics)?;
        let request = self
            .client
            .post(url)
            .bearer_auth(session.access_token.as_str())
            .json(body);
        let response: ReportResponse = http::send_json(request, Stage::FetchMetrics, action).await?;
        response.first_metric_total()
    }

    async fn profile_view(
        &self,
        session: &GoogleAnalyticsSession,
        property_id: &str,
        view: &AnalyticsView,
        date_ranges: &[DateRange],
        options: &Options,
    ) -> Result<PlatformInventory> {
        let total = self
            .run_report(
                session,
                property_id,
                &ReportRequest::metric_total(&view.total_metric, date_ranges),
                &format!("total {}", view.total_metric),
            )
            .await?;

        let denominator = if view.coverage_metric == view.total_metric {
            total
        } else {
            self.run_report(
                session,
                property_id,
                &ReportRequest::metric_total(&view.coverage_metric, date_ranges),
                &format!("total {}", view.coverage_metric),
            )
            .await?
        };

        let futures: Vec<_> = view
            .view
            .profiled_fields()
            .into_iter()
            .map(|field| async move {
                let is_metric = field.data_type.as_deref() == Some(METRIC);
                let body = if is_metric {
                    ReportRequest::metric_total(&field.name, date_ranges)
                } else {
                    ReportRequest::dimension_coverage(&field.name, &view.coverage_metric, date_ranges)
                };
                self.run_report(session, property_id, &body, &format!("report {}", field.name))
                    .await
                    .map(|count| (field, Some(count)))
            }
            .boxed())
            .collect();
        let counts: Vec<(&FieldDefinition, Option<u64>)> = stream::iter(futures)
            .buffered(self.field_concurrency)
            .try_collect::<Vec<_>>()
            .await?;

        // Completeness is relative to the coverage metric; the entity size stays the view metric.
        let mut inventory = build_inventory(&DESCRIPTOR, &view.view, denominator, counts, options);
        inventory.total_records = total;

        let ranges: Vec<Value> = date_ranges
            .iter()
            .map(|r| json!({"start_date": r.start_date, "end_date": r.end_date}))
            .collect();
        inventory.metadata = inventory
            .metadata
            .with_scope("property_id", property_id)
            .with_scope("metric", view.total_metric.as_str())
            .with_scope("completeness_metric", view.coverage_metric.as_str())
            .with_scope("date_ranges", ranges);

        tracing::debug!(
            property_id,
            metric = %view.total_metric,
            total_records = total,
            fields = inventory.fields.len(),
            "Profiled Google Analytics view"
        );
        Ok(inventory)
    }
}

#[async_trait]
impl PlatformAdapter for GoogleAnalyticsAdapter {
    type Session = GoogleAnalyticsSession;
    type Schema = AnalyticsSchema;

    fn descriptor(&self) -> &'static PlatformDescriptor {
        &DESCRIPTOR
    }

    async fn authenticate(&self, credential: Credential, _options: &Options) -> Result<Self::Session> {
        let Credential::ServiceAccount(key) = credential else {
            return Err(InventoryError::authentication(
                "Google Analytics expects a service account credential",
            ));
        };

        let audience = auth::token_audience(&key);
        let assertion = auth::sign_assertion(&key, &audience, chrono::Utc::now().timestamp())?;
        drop(key);

        let token_url = match &self.token_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => Url::parse(&audience).map_err(|e| {
                InventoryError::authentication(format!("invalid token endpoint: {e}"))
            })?,
        };
        let access_token = auth::exchange_assertion(&self.client, token_url, &assertion).await?;

        Ok(GoogleAnalyticsSession { access_token })
    }

    async fn discover_schema(&self, session: &Self::Session, options: &Options) -> Result<Self::Schema> {
        let property_id = normalize_property_id(options.property_id.as_deref())?;

        let url = self.property_url(&property_id, "/metadata", Stage::DiscoverSchema)?;
        let request = self.client.get(url).bearer_auth(session.access_token.as_str());
        let metadata: MetadataResponse =
            http::send_json(request, Stage::DiscoverSchema, "read property metadata").await?;

        let dimensions = metadata.dimensions.into_iter().map(|item| (item, DIMENSION));
        let metrics = metadata.metrics.into_iter().map(|item| (item, METRIC));
        let fields: Vec<FieldDefinition> = dimensions
            .chain(metrics)
            .map(|(item, kind)| {
                FieldDefinition::new(item.api_name)
                    .with_type(kind)
                    .with_label(item.ui_name)
            })
            .collect();

        let views = plan_views(options)
            .into_iter()
            .map(|plan| AnalyticsView {
                view: EntityView {
                    name: plan.name,
                    display_name: plan.display_name,
                    entity: ENTITY.to_string(),
                    fields: fields.clone(),
                    requested_fields: plan.fields,
                },
                total_metric: plan.total_metric,
                coverage_metric: plan.coverage_metric,
            })
            .collect();

        Ok(AnalyticsSchema { property_id, views })
    }

    async fn compute_field_metrics(
        &self,
        session: &Self::Session,
        schema: &Self::Schema,
        options: &Options,
    ) -> Result<Vec<PlatformInventory>> {
        let date_ranges = options.effective_date_ranges();
        let mut inventories = Vec::with_capacity(schema.views.len());
        for view in &schema.views {
            inventories.push(
                self.profile_view(session, &schema.property_id, view, &date_ranges, options)
                    .await?,
            );
        }
        Ok(inventories)
    }
}
