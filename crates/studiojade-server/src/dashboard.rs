//! Performance dashboard served at `/metrics` (JSON) and `/cm` (HTML).

use std::collections::BTreeMap;

use serde::Serialize;
use studiojade_core::telemetry::{ResponseTimeReport, VitalReport, WebVitalsReport};
use studiojade_core::{CacheStats, Markup, MetricsReport};

#[derive(Debug, Clone, Serialize)]
pub struct CacheEfficiency {
    /// Percentage of roster reads served without an upstream fetch.
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub stale_served: u64,
    pub members: usize,
    pub age_secs: Option<u64>,
    pub refreshing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiStats {
    pub fetches: u64,
    pub fetch_failures: u64,
    pub consecutive_errors: u64,
    pub last_error: Option<String>,
    pub last_fetch_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceUsage {
    pub uptime_secs: u64,
    pub samples_received: u64,
    pub responses_timed: u64,
    pub retained_samples: usize,
    pub max_samples: usize,
    pub truncations: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub cache_efficiency: CacheEfficiency,
    pub response_times: ResponseTimeReport,
    pub web_vitals: WebVitalsReport,
    pub page_load: VitalReport,
    pub api_stats: ApiStats,
    pub device_distribution: BTreeMap<String, u64>,
    pub connection_types: BTreeMap<String, u64>,
    pub resource_usage: ResourceUsage,
}

impl DashboardReport {
    pub fn new(cache: CacheStats, report: MetricsReport, uptime_secs: u64) -> Self {
        Self {
            cache_efficiency: CacheEfficiency {
                hit_rate: (cache.hit_rate() * 100.0).round() / 100.0,
                hits: cache.hits,
                misses: cache.misses,
                stale_served: cache.stale_served,
                members: cache.members,
                age_secs: cache.age_secs,
                refreshing: cache.refreshing,
            },
            response_times: report.response_times,
            web_vitals: report.web_vitals,
            page_load: report.page_load,
            api_stats: ApiStats {
                fetches: cache.fetches,
                fetch_failures: cache.fetch_failures,
                consecutive_errors: cache.error_count,
                last_error: cache.last_error,
                last_fetch_ms: cache.last_fetch_ms,
            },
            device_distribution: report.device_distribution,
            connection_types: report.connection_types,
            resource_usage: ResourceUsage {
                uptime_secs,
                samples_received: report.retention.samples_received,
                responses_timed: report.retention.responses_timed,
                retained_samples: report.retention.retained_samples,
                max_samples: report.retention.max_samples,
                truncations: report.retention.truncations,
            },
        }
    }

    pub fn render_html(&self, title: &str) -> String {
        let mut page = Markup::with_capacity(4096);
        page.raw("<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n<meta charset=\"UTF-8\">\n")
            .raw("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n")
            .raw("<title>")
            .text(title)
            .raw(" · 性能监控</title>\n")
            .raw("<link rel=\"stylesheet\" href=\"https://cdn.jsdelivr.net/npm/bulma@1.0/css/bulma.min.css\">\n")
            .raw("</head>\n<body>\n<section class=\"section\">\n<div class=\"container\">\n")
            .raw("<h1 class=\"title\">性能监控</h1>\n");

        let cache = &self.cache_efficiency;
        section(&mut page, "缓存效率");
        row(&mut page, "命中率 (%)", &cache.hit_rate.to_string());
        row(&mut page, "命中", &cache.hits.to_string());
        row(&mut page, "未命中", &cache.misses.to_string());
        row(&mut page, "过期数据回退", &cache.stale_served.to_string());
        row(&mut page, "成员数", &cache.members.to_string());
        row(&mut page, "缓存时长 (s)", &optional(cache.age_secs));
        row(&mut page, "刷新中", &cache.refreshing.to_string());
        end_section(&mut page);

        let rt = &self.response_times;
        section(&mut page, "响应时间 (ms)");
        row(&mut page, "请求数", &rt.count.to_string());
        row(&mut page, "平均", &rt.avg.to_string());
        row(&mut page, "P50", &rt.p50.to_string());
        row(&mut page, "P95", &rt.p95.to_string());
        row(&mut page, "P99", &rt.p99.to_string());
        end_section(&mut page);

        section(&mut page, "Web Vitals (平均 / P75)");
        let vitals = &self.web_vitals;
        for (name, vital) in [
            ("TTFB", &vitals.ttfb),
            ("FCP", &vitals.fcp),
            ("LCP", &vitals.lcp),
            ("FID", &vitals.fid),
            ("CLS", &vitals.cls),
            ("Page load", &self.page_load),
        ] {
            row(&mut page, name, &format!("{} / {}", vital.avg, vital.p75));
        }
        end_section(&mut page);

        let api = &self.api_stats;
        section(&mut page, "上游 API");
        row(&mut page, "请求次数", &api.fetches.to_string());
        row(&mut page, "失败次数", &api.fetch_failures.to_string());
        row(&mut page, "连续失败", &api.consecutive_errors.to_string());
        row(&mut page, "最近错误", api.last_error.as_deref().unwrap_or("-"));
        row(&mut page, "最近耗时 (ms)", &api.last_fetch_ms.to_string());
        end_section(&mut page);

        section(&mut page, "设备分布");
        for (device, count) in &self.device_distribution {
            row(&mut page, device, &count.to_string());
        }
        end_section(&mut page);

        section(&mut page, "网络类型");
        for (connection, count) in &self.connection_types {
            row(&mut page, connection, &count.to_string());
        }
        end_section(&mut page);

        let usage = &self.resource_usage;
        section(&mut page, "资源使用");
        row(&mut page, "运行时间 (s)", &usage.uptime_secs.to_string());
        row(&mut page, "已接收样本", &usage.samples_received.to_string());
        row(&mut page, "保留样本", &usage.retained_samples.to_string());
        row(&mut page, "每类上限", &usage.max_samples.to_string());
        row(&mut page, "截断次数", &usage.truncations.to_string());
        end_section(&mut page);

        page.raw("</div>\n</section>\n</body>\n</html>\n");
        page.into_string()
    }
}

fn optional(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn section(page: &mut Markup, heading: &str) {
    page.raw("<h2 class=\"subtitle\">")
        .text(heading)
        .raw("</h2>\n<table class=\"table is-narrow\">\n<tbody>\n");
}

fn row(page: &mut Markup, label: &str, value: &str) {
    page.raw("<tr><th>")
        .text(label)
        .raw("</th><td>")
        .text(value)
        .raw("</td></tr>\n");
}

fn end_section(page: &mut Markup) {
    page.raw("</tbody>\n</table>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use studiojade_core::{ClientSample, MetricsAggregator};

    fn cache_stats() -> CacheStats {
        CacheStats {
            hits: 3,
            misses: 1,
            stale_served: 0,
            fetches: 1,
            fetch_failures: 0,
            error_count: 0,
            last_error: None,
            refreshing: false,
            members: 2,
            age_secs: Some(12),
            last_fetch_ms: 40,
        }
    }

    fn report() -> DashboardReport {
        let agg = MetricsAggregator::default();
        agg.record(&ClientSample {
            ttfb: Some(120.0),
            device: Some("mobile".into()),
            ..Default::default()
        });
        DashboardReport::new(cache_stats(), agg.snapshot(), 5)
    }

    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(report()).unwrap();
        for key in [
            "cache_efficiency",
            "response_times",
            "web_vitals",
            "api_stats",
            "device_distribution",
            "connection_types",
            "resource_usage",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["cache_efficiency"]["hit_rate"], 75.0);
        assert_eq!(value["web_vitals"]["TTFB"]["avg"], 120.0);
        assert_eq!(value["web_vitals"]["TTFB"]["p75"], "N/A");
        assert_eq!(value["device_distribution"]["mobile"], 1);
        assert_eq!(value["resource_usage"]["uptime_secs"], 5);
    }

    #[test]
    fn test_html_escapes_last_error() {
        let mut stats = cache_stats();
        stats.last_error = Some("<b>upstream</b>".into());
        let agg = MetricsAggregator::default();
        let html = DashboardReport::new(stats, agg.snapshot(), 0).render_html("StudioJade");
        assert!(html.contains("&lt;b&gt;upstream&lt;/b&gt;"));
        assert!(html.contains("N/A"));
    }
}
