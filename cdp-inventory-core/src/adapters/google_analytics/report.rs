//! Analytics Data API request and response shapes.

use crate::error::{InventoryError, Result};
use crate::options::DateRange;
use serde::{Deserialize, Serialize};

/// Dimension value the API reports when a hit carried no value.
const NOT_SET: &str = "(not set)";

/// Body of a `properties/{id}:runReport` call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportRequest<'a> {
    date_ranges: Vec<ReportDateRange<'a>>,
    metrics: Vec<NamedItem<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dimensions: Vec<NamedItem<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension_filter: Option<FilterExpression<'a>>,
    metric_aggregations: [&'static str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportDateRange<'a> {
    start_date: &'a str,
    end_date: &'a str,
}

#[derive(Debug, Serialize)]
struct NamedItem<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum FilterExpression<'a> {
    NotExpression(Box<FilterExpression<'a>>),
    Filter(StringFilterClause<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StringFilterClause<'a> {
    field_name: &'a str,
    string_filter: StringFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StringFilter {
    value: &'static str,
    match_type: &'static str,
}

impl<'a> ReportRequest<'a> {
    /// Total of `metric` over the date ranges.
    pub(crate) fn metric_total(metric: &'a str, date_ranges: &'a [DateRange]) -> Self {
        Self {
            date_ranges: convert_ranges(date_ranges),
            metrics: vec![NamedItem { name: metric }],
            dimensions: Vec::new(),
            dimension_filter: None,
            metric_aggregations: ["TOTAL"],
            limit: None,
        }
    }

    /// Total of `metric` over hits where `dimension` has a value.
    pub(crate) fn dimension_coverage(
        dimension: &'a str,
        metric: &'a str,
        date_ranges: &'a [DateRange],
    ) -> Self {
        Self {
            date_ranges: convert_ranges(date_ranges),
            metrics: vec![NamedItem { name: metric }],
            dimensions: vec![NamedItem { name: dimension }],
            dimension_filter: Some(FilterExpression::NotExpression(Box::new(
                FilterExpression::Filter(StringFilterClause {
                    field_name: dimension,
                    string_filter: StringFilter {
                        value: NOT_SET,
                        match_type: "EXACT",
                    },
                }),
            ))),
            metric_aggregations: ["TOTAL"],
            // Totals cover every row; one row is enough to read them.
            limit: Some(1),
        }
    }
}

fn convert_ranges(date_ranges: &[DateRange]) -> Vec<ReportDateRange<'_>> {
    date_ranges
        .iter()
        .map(|range| ReportDateRange {
            start_date: &range.start_date,
            end_date: &range.end_date,
        })
        .collect()
}

/// The parts of a `runReport` response used for counting.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportResponse {
    #[serde(default)]
    totals: Vec<ReportRow>,
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRow {
    #[serde(default)]
    metric_values: Vec<MetricValue>,
}

#[derive(Debug, Default, Deserialize)]
struct MetricValue {
    #[serde(default)]
    value: Option<String>,
}

impl ReportResponse {
    /// First metric's total, summed across date ranges.
    ///
    /// Falls back to the first row when the API omitted totals, and to zero
    /// when the report is empty.
    pub(crate) fn first_metric_total(&self) -> Result<u64> {
        let rows = if self.totals.is_empty() {
            self.rows.get(..1).unwrap_or_default()
        } else {
            self.totals.as_slice()
        };

        rows.iter()
            .filter_map(|row| row.metric_values.first())
            .filter_map(|metric| metric.value.as_deref())
            .try_fold(0u64, |sum, value| -> Result<u64> {
                Ok(sum.saturating_add(parse_count(value)?))
            })
    }
}

/// Parses a metric value, rounding fractional metrics to a whole count.
fn parse_count(value: &str) -> Result<u64> {
    let parsed: f64 = value.trim().parse().map_err(|_| {
        InventoryError::metrics_fetch(format!("report returned a non-numeric metric value '{value}'"))
    })?;
    if !parsed.is_finite() {
        return Err(InventoryError::metrics_fetch(format!(
            "report returned a non-finite metric value '{value}'"
        )));
    }
    // `as` saturates; negative totals clamp to zero.
    Ok(parsed.round().max(0.0) as u64)
}
