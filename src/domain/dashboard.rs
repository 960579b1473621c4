//! Dashboard projection types.
//!
//! A layout maps named counters onto panels. Pure data: the projection holds
//! no aggregation logic, and validation only checks that every referenced
//! counter is actually registered.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AegisError, AegisResult};

/// Time range a panel covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    /// Last 24 hours.
    Last24h,
    /// Last 7 days.
    Last7d,
    /// Last 30 days.
    Last30d,
    /// Last 90 days.
    Last90d,
}

impl TimeRange {
    /// Get the number of hours for this time range.
    pub fn hours(&self) -> i64 {
        match self {
            TimeRange::Last24h => 24,
            TimeRange::Last7d => 24 * 7,
            TimeRange::Last30d => 24 * 30,
            TimeRange::Last90d => 24 * 90,
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "24h" | "last24h" => Ok(TimeRange::Last24h),
            "7d" | "last7d" => Ok(TimeRange::Last7d),
            "30d" | "last30d" => Ok(TimeRange::Last30d),
            "90d" | "last90d" => Ok(TimeRange::Last90d),
            _ => Err(format!("Invalid time range: {}. Use 24h, 7d, 30d, or 90d", s)),
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        TimeRange::Last7d
    }
}

/// How a panel renders its counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// Share of each counter in the total (ratio/pie).
    Ratio,
    /// Counts over time (time-series/bar).
    TimeSeries,
}

/// One dashboard panel.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Panel {
    /// Panel title.
    pub title: String,
    /// Chart rendering hint.
    pub chart: ChartKind,
    /// Counters this panel displays.
    pub counters: Vec<String>,
    /// Time window the panel covers.
    #[serde(default)]
    pub window: TimeRange,
}

/// A validated dashboard layout.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardLayout {
    /// Layout name.
    pub name: String,
    /// Panels in display order.
    pub panels: Vec<Panel>,
}

impl DashboardLayout {
    /// Build a layout, rejecting panels that reference counters absent from
    /// the registered set.
    pub fn new(
        name: impl Into<String>,
        panels: Vec<Panel>,
        registered_counters: &[String],
    ) -> AegisResult<Self> {
        for panel in &panels {
            if panel.counters.is_empty() {
                return Err(AegisError::Policy(format!(
                    "dashboard panel '{}' references no counters",
                    panel.title
                )));
            }
            for counter in &panel.counters {
                if !registered_counters.iter().any(|c| c == counter) {
                    return Err(AegisError::Policy(format!(
                        "dashboard panel '{}' references unregistered counter '{}'",
                        panel.title, counter
                    )));
                }
            }
        }

        Ok(Self {
            name: name.into(),
            panels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered() -> Vec<String> {
        vec![
            "invocations".to_string(),
            "input_blocked".to_string(),
            "output_blocked".to_string(),
        ]
    }

    #[test]
    fn test_valid_layout() {
        let layout = DashboardLayout::new(
            "safety-overview",
            vec![Panel {
                title: "Blocked vs total".to_string(),
                chart: ChartKind::Ratio,
                counters: vec!["invocations".to_string(), "input_blocked".to_string()],
                window: TimeRange::Last7d,
            }],
            &registered(),
        );
        assert!(layout.is_ok());
    }

    #[test]
    fn test_unregistered_counter_rejected() {
        let err = DashboardLayout::new(
            "bad",
            vec![Panel {
                title: "Typo panel".to_string(),
                chart: ChartKind::TimeSeries,
                counters: vec!["input_blockd".to_string()],
                window: TimeRange::Last24h,
            }],
            &registered(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("input_blockd"));
    }

    #[test]
    fn test_empty_panel_rejected() {
        assert!(DashboardLayout::new(
            "empty",
            vec![Panel {
                title: "Nothing".to_string(),
                chart: ChartKind::Ratio,
                counters: Vec::new(),
                window: TimeRange::default(),
            }],
            &registered(),
        )
        .is_err());
    }

    #[test]
    fn test_time_range_parsing() {
        assert_eq!("24h".parse::<TimeRange>().unwrap(), TimeRange::Last24h);
        assert!("14d".parse::<TimeRange>().is_err());
    }
}
