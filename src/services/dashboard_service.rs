//! 仪表盘统计

use crate::{
    auth::privileged::Outcome,
    error::AppError,
    models::{
        audit::{AuditAction, AuditFilter},
        content::ContentKind,
        dashboard::{
            error_rate, AnalyticsMetrics, AnalyticsPeriod, AuditActivity, DashboardAnalytics, DashboardStats,
            DateRange, Totals,
        },
        principal::{PrincipalStatus, Role},
    },
    repository::{ContentStore, PrincipalStore},
    services::AuditService,
};
use chrono::{Duration, Utc};
use std::{collections::BTreeMap, sync::Arc};

const RECENT_ACTIVITY: i64 = 10;
const TOP_ENTRIES: i64 = 10;

pub struct DashboardService {
    principals: Arc<dyn PrincipalStore>,
    content: Arc<dyn ContentStore>,
    audit: Arc<AuditService>,
}

impl DashboardService {
    pub fn new(principals: Arc<dyn PrincipalStore>, content: Arc<dyn ContentStore>, audit: Arc<AuditService>) -> Self {
        Self {
            principals,
            content,
            audit,
        }
    }

    pub async fn stats(&self) -> Result<Outcome<DashboardStats>, AppError> {
        let since = Utc::now() - Duration::hours(24);
        let last_day = AuditFilter {
            start_date: Some(since),
            ..Default::default()
        };
        let last_day_failures = AuditFilter {
            start_date: Some(since),
            success: Some(false),
            ..Default::default()
        };
        let everything = AuditFilter::default();

        // 各项统计互不依赖，并发查询
        let (by_role, by_status, by_kind, last_24h, failures_last_24h, recent_activity) = futures::try_join!(
            self.principals.count_by_role(),
            self.principals.count_by_status(),
            self.content.count_by_kind(),
            self.audit.count(&last_day),
            self.audit.count(&last_day_failures),
            self.audit.query(&everything, RECENT_ACTIVITY, 0),
        )?;

        // 所有枚举值都出现在结果里，缺失的计为 0
        let mut users_by_role: BTreeMap<String, i64> =
            Role::ALL.iter().map(|r| (r.to_string(), 0)).collect();
        for (role, n) in by_role {
            users_by_role.insert(role.to_string(), n);
        }

        let mut users_by_status: BTreeMap<String, i64> =
            PrincipalStatus::ALL.iter().map(|s| (s.to_string(), 0)).collect();
        for (status, n) in by_status {
            users_by_status.insert(status.to_string(), n);
        }

        let mut content_by_kind: BTreeMap<String, i64> = ContentKind::ALL
            .iter()
            .map(|k| (k.collection().to_string(), 0))
            .collect();
        let (mut content_total, mut content_active) = (0, 0);
        for (kind, total, active) in by_kind {
            content_by_kind.insert(kind.collection().to_string(), total);
            content_total += total;
            content_active += active;
        }

        let stats = DashboardStats {
            totals: Totals {
                users: users_by_status.values().sum(),
                active_users: users_by_status
                    .get(PrincipalStatus::Active.as_str())
                    .copied()
                    .unwrap_or(0),
                content: content_total,
                active_content: content_active,
            },
            users_by_role,
            users_by_status,
            content_by_kind,
            audit_activity: AuditActivity {
                last_24h,
                failures_last_24h,
            },
            recent_activity,
        };

        Ok(Outcome::new(stats))
    }

    /// 指定时间窗口内的趋势统计
    pub async fn analytics(&self, period: AnalyticsPeriod) -> Result<Outcome<DashboardAnalytics>, AppError> {
        let end = Utc::now();
        let start = period.start(end);
        let window = AuditFilter {
            start_date: Some(start),
            ..Default::default()
        };
        let logins = AuditFilter {
            action: Some(AuditAction::Login),
            success: Some(true),
            ..window.clone()
        };
        let failures = AuditFilter {
            success: Some(false),
            ..window.clone()
        };

        let (user_registrations, user_logins, content_creation, top_actions, performance, total, failed) = futures::try_join!(
            self.principals.created_per_day(start),
            self.audit.daily_counts(&logins),
            self.content.created_per_day(start),
            self.audit.top_actions(&window, TOP_ENTRIES),
            self.audit.slowest_resources(&window, TOP_ENTRIES),
            self.audit.count(&window),
            self.audit.count(&failures),
        )?;

        let analytics = DashboardAnalytics {
            period,
            date_range: DateRange { start, end },
            metrics: AnalyticsMetrics {
                user_registrations,
                user_logins,
                content_creation,
                top_actions,
                error_rate: error_rate(failed, total),
                performance,
            },
        };

        Ok(Outcome::new(analytics).with_detail("period", serde_json::json!(period)))
    }
}
