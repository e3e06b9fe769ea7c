//! Per-request options shared by every connection.
//!
//! Each adapter reads only the options relevant to it; unknown keys are
//! ignored. Request-level checks (date ranges, page size, metric views) run
//! before any connection is attempted.

use crate::error::{InventoryError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Maximum number of date ranges the reporting API accepts in one report.
pub const MAX_DATE_RANGES: usize = 4;

/// Largest page the CRM object listing endpoint serves.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Options controlling what each adapter inventories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Salesforce login domain prefix ("login", "test", "acme.my")
    pub domain: Option<String>,
    /// Google Analytics property identifier
    #[serde(deserialize_with = "string_or_number")]
    pub property_id: Option<String>,
    /// Fields to profile; empty means platform defaults
    #[serde(deserialize_with = "nullable")]
    pub fields: Vec<String>,
    /// Google Analytics metrics; the first one sizes the entity
    #[serde(deserialize_with = "nullable")]
    pub metrics: Vec<String>,
    /// Google Analytics metric used as the completeness denominator
    pub completeness_metric: Option<String>,
    /// Google Analytics reporting windows
    #[serde(deserialize_with = "nullable")]
    pub date_ranges: Vec<DateRange>,
    /// Single Salesforce object to inventory
    pub object_name: Option<String>,
    /// Salesforce objects, one response entry each
    #[serde(deserialize_with = "nullable")]
    pub object_names: Vec<String>,
    /// Single HubSpot object type to inventory
    pub object_type: Option<String>,
    /// HubSpot object types, one response entry each
    #[serde(deserialize_with = "nullable")]
    pub object_types: Vec<String>,
    /// Google Analytics metric views, one response entry each
    #[serde(deserialize_with = "nullable")]
    pub metric_views: Vec<MetricView>,
    /// HubSpot page size for record scans
    pub page_size: Option<u32>,
    /// Caller-side names for platform fields, echoed as `mapped_name`
    #[serde(deserialize_with = "nullable")]
    pub field_mappings: BTreeMap<String, String>,
}

impl Options {
    /// Validates request-level constraints.
    ///
    /// # Errors
    /// Returns `InventoryError::Validation` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.date_ranges.len() > MAX_DATE_RANGES {
            return Err(InventoryError::validation(format!(
                "at most {MAX_DATE_RANGES} date ranges are supported, got {}",
                self.date_ranges.len()
            )));
        }
        for (index, range) in self.date_ranges.iter().enumerate() {
            range.validate().map_err(|reason| {
                InventoryError::validation(format!("options.date_ranges[{index}]: {reason}"))
            })?;
        }

        if let Some(page_size) = self.page_size
            && !(1..=MAX_PAGE_SIZE).contains(&page_size)
        {
            return Err(InventoryError::validation(format!(
                "options.page_size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }

        for (index, view) in self.metric_views.iter().enumerate() {
            if view.key().is_none() {
                return Err(InventoryError::validation(format!(
                    "options.metric_views[{index}] needs a 'name' or 'metric'"
                )));
            }
        }

        Ok(())
    }

    /// Page size for record scans, defaulting to the largest allowed page.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(MAX_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Date ranges to report on, defaulting to the last 30 days.
    pub fn effective_date_ranges(&self) -> Vec<DateRange> {
        if self.date_ranges.is_empty() {
            vec![DateRange::default()]
        } else {
            self.date_ranges.clone()
        }
    }

    /// Caller-side mapping for a platform field.
    pub fn mapped_name(&self, field: &str) -> Option<String> {
        self.field_mappings.get(field).cloned()
    }
}

/// Reporting window in reporting-API date syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive start: `YYYY-MM-DD`, `today`, `yesterday`, or `NdaysAgo`
    pub start_date: String,
    /// Inclusive end, same syntax as `start_date`
    pub end_date: String,
}

impl Default for DateRange {
    fn default() -> Self {
        Self {
            start_date: "30daysAgo".to_string(),
            end_date: "today".to_string(),
        }
    }
}

impl DateRange {
    /// Creates a date range.
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let start = parse_date_expression(&self.start_date)
            .ok_or_else(|| format!("invalid start_date '{}'", self.start_date))?;
        let end = parse_date_expression(&self.end_date)
            .ok_or_else(|| format!("invalid end_date '{}'", self.end_date))?;

        if let (DateExpression::Absolute(start), DateExpression::Absolute(end)) = (start, end)
            && start > end
        {
            return Err(format!("start_date {start} is after end_date {end}"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateExpression {
    Absolute(NaiveDate),
    Relative,
}

fn parse_date_expression(value: &str) -> Option<DateExpression> {
    let value = value.trim();
    if value == "today" || value == "yesterday" {
        return Some(DateExpression::Relative);
    }
    if let Some(days) = value.strip_suffix("daysAgo") {
        return (!days.is_empty() && days.bytes().all(|b| b.is_ascii_digit()))
            .then_some(DateExpression::Relative);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(DateExpression::Absolute)
}

/// A named Google Analytics metric view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricView {
    /// View name used in the response key
    #[serde(default)]
    pub name: Option<String>,
    /// Metric that sizes the view; defaults to `totalUsers`
    #[serde(default)]
    pub metric: Option<String>,
    /// Label echoed as `_display_name`
    #[serde(default, rename = "displayName", alias = "display_name")]
    pub display_name: Option<String>,
    /// Fields to profile in this view
    #[serde(default, deserialize_with = "nullable")]
    pub fields: Vec<String>,
}

impl MetricView {
    /// Response key suffix: `name`, falling back to `metric`.
    pub fn key(&self) -> Option<&str> {
        [self.name.as_deref(), self.metric.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
    }
}

/// Deserializes `null` as the type's default.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Accepts either a JSON string or a JSON number.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(text)) => Some(text),
        Some(Raw::Number(number)) => Some(number.to_string()),
        None => None,
    })
}
