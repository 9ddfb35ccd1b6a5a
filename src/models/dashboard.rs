//! Dashboard statistics

use super::audit::{AuditAction, AuditRecord};
use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub users: i64,
    pub active_users: i64,
    pub content: i64,
    pub active_content: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditActivity {
    pub last_24h: i64,
    pub failures_last_24h: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub totals: Totals,
    pub users_by_role: BTreeMap<String, i64>,
    pub users_by_status: BTreeMap<String, i64>,
    pub content_by_kind: BTreeMap<String, i64>,
    pub audit_activity: AuditActivity,
    pub recent_activity: Vec<AuditRecord>,
}

/// Window for `GET /dashboard/analytics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyticsPeriod {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
}

impl AnalyticsPeriod {
    /// Start of the window ending at `now`
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            AnalyticsPeriod::Week => now - Duration::days(7),
            AnalyticsPeriod::Month => now - Duration::days(30),
            AnalyticsPeriod::Quarter => now - Duration::days(90),
            AnalyticsPeriod::Year => now
                .checked_sub_months(Months::new(12))
                .unwrap_or(now - Duration::days(365)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub period: Option<AnalyticsPeriod>,
}

/// Events on one UTC calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCount {
    pub action: AuditAction,
    pub count: i64,
}

/// Mean handling time of audited requests against one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
    pub resource: String,
    pub avg_duration_ms: i64,
    pub request_count: i64,
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsMetrics {
    pub user_registrations: Vec<DailyCount>,
    pub user_logins: Vec<DailyCount>,
    pub content_creation: Vec<DailyCount>,
    pub top_actions: Vec<ActionCount>,
    /// Failed audited actions as a percentage, two decimals
    pub error_rate: f64,
    pub performance: Vec<ResourceTiming>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAnalytics {
    pub period: AnalyticsPeriod,
    pub date_range: DateRange,
    pub metrics: AnalyticsMetrics,
}

/// Percentage of `failures` in `total`, rounded to two decimals
pub fn error_rate(failures: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (failures as f64 * 10_000.0 / total as f64).round() / 100.0
}

/// Bucket timestamps into per-day counts, oldest day first
pub fn daily_counts<I>(timestamps: I) -> Vec<DailyCount>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let mut days: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for at in timestamps {
        *days.entry(at.date_naive()).or_default() += 1;
    }
    days.into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}
