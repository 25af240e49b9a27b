use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use subs_health_check::{
    ExclusionTracker, HealthCheckConfig, HealthCheckError, HealthProbe, ProxyChecker, ProxyKey,
    ProxyRecord, QualifiedOrder, QuarantineEntry,
};

/// 可编排结果的探测客户端，记录调用情况
#[derive(Default)]
struct MockProbe {
    /// 节点名 -> 延迟，未配置的节点返回 -1
    delays: HashMap<String, i64>,
    /// 返回 Err 的节点
    errors: HashSet<String>,
    /// 永不返回的节点
    hangs: HashSet<String>,
    /// 第几次（从 0 开始）配置推送失败
    failing_updates: HashSet<usize>,
    /// 每次探测的耗时
    latency: Duration,

    update_calls: AtomicUsize,
    payloads: Mutex<Vec<String>>,
    probed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProbe {
    fn with_delays(delays: &[(&str, i64)]) -> Self {
        Self {
            delays: delays
                .iter()
                .map(|(name, delay)| (name.to_string(), *delay))
                .collect(),
            ..Default::default()
        }
    }

    fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthProbe for MockProbe {
    async fn update_config(&self, payload: &str) -> Result<()> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_updates.contains(&call) {
            return Err(anyhow!("connection refused"));
        }
        self.payloads.lock().unwrap().push(payload.to_string());
        Ok(())
    }

    async fn check(&self, proxy_name: &str, _test_url: &str, _timeout_ms: u64) -> Result<i64> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.probed.lock().unwrap().push(proxy_name.to_string());

        if self.hangs.contains(proxy_name) {
            tokio::time::sleep(Duration::from_secs(3)).await;
        } else if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.errors.contains(proxy_name) {
            return Err(anyhow!("controller socket closed"));
        }
        Ok(*self.delays.get(proxy_name).unwrap_or(&-1))
    }
}

fn proxy(name: &str, proxy_type: &str, server: &str, port: u16) -> ProxyRecord {
    ProxyRecord::new(
        name.to_string(),
        proxy_type.to_string(),
        server.to_string(),
        port,
    )
}

fn numbered(count: usize) -> Vec<ProxyRecord> {
    (0..count)
        .map(|i| proxy(&format!("node-{}", i), "ss", &format!("10.0.0.{}", i), 443))
        .collect()
}

fn config(segment_size: usize, concurrency: usize) -> HealthCheckConfig {
    HealthCheckConfig::new(
        segment_size,
        concurrency,
        "https://www.gstatic.com/generate_204".to_string(),
        1500,
    )
}

fn checker(mock: &Arc<MockProbe>, max_excluded_times: u32, prior: Vec<QuarantineEntry>) -> ProxyChecker {
    let probe: Arc<dyn HealthProbe> = mock.clone();
    ProxyChecker::new(probe, ExclusionTracker::new(max_excluded_times, prior).unwrap())
}

fn names(proxies: &[ProxyRecord]) -> Vec<&str> {
    proxies.iter().map(|p| p.name.as_str()).collect()
}

#[tokio::test]
async fn test_one_passing_one_failing() {
    let mock = Arc::new(MockProbe::with_delays(&[("ss-node", 50), ("trojan-node", -1)]));
    let proxies = vec![
        proxy("ss-node", "ss", "1.2.3.4", 443),
        proxy("trojan-node", "trojan", "5.6.7.8", 443),
    ];

    let result = checker(&mock, 3, vec![])
        .check_proxies(&proxies, &config(100, 4))
        .await
        .unwrap();

    assert_eq!(result.qualified_proxies, vec![proxies[0].clone()]);
    assert_eq!(
        result.excluded_proxies,
        vec![QuarantineEntry::new(ProxyKey::new("trojan", "5.6.7.8", 443), 1)]
    );
    assert_eq!(result.stats.probes_issued, 2);
    assert_eq!(result.stats.qualified, 1);
    assert_eq!(result.stats.failed, 1);
    assert_eq!(result.stats.fastest_delay, Some(50));
}

#[tokio::test]
async fn test_empty_input_returns_prior_state() {
    let mock = Arc::new(MockProbe::default());
    let prior = vec![
        QuarantineEntry::new(ProxyKey::new("vmess", "b.com", 443), 5),
        QuarantineEntry::new(ProxyKey::new("ss", "a.com", 443), 1),
    ];

    let result = checker(&mock, 3, prior.clone())
        .check_proxies(&[], &config(10, 2))
        .await
        .unwrap();

    assert!(result.qualified_proxies.is_empty());
    assert_eq!(result.excluded_proxies, vec![prior[1].clone(), prior[0].clone()]);
    assert_eq!(mock.update_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.stats.segments_total, 0);
}

#[tokio::test]
async fn test_segments_cover_input_exactly_once() {
    let proxies = numbered(7);
    let delays: Vec<(String, i64)> = proxies.iter().map(|p| (p.name.clone(), 10)).collect();
    let delays: Vec<(&str, i64)> = delays.iter().map(|(n, d)| (n.as_str(), *d)).collect();
    let mock = Arc::new(MockProbe::with_delays(&delays));

    let result = checker(&mock, 3, vec![])
        .check_proxies(&proxies, &config(3, 2))
        .await
        .unwrap();

    // ceil(7 / 3) = 3
    assert_eq!(mock.update_calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.stats.segments_total, 3);

    let payloads = mock.payloads.lock().unwrap().clone();
    assert!(payloads[0].contains("node-0") && payloads[0].contains("node-2"));
    assert!(!payloads[0].contains("node-3"));
    assert!(payloads[2].contains("node-6"));
    assert!(!payloads[2].contains("node-5"));

    let mut probed = mock.probed();
    probed.sort();
    let mut expected: Vec<String> = proxies.iter().map(|p| p.name.clone()).collect();
    expected.sort();
    assert_eq!(probed, expected);
    assert_eq!(result.qualified_proxies.len(), 7);
}

#[tokio::test]
async fn test_concurrency_bound_respected() {
    let proxies = numbered(20);
    let mock = Arc::new(MockProbe {
        latency: Duration::from_millis(20),
        ..Default::default()
    });

    let result = checker(&mock, 3, vec![])
        .check_proxies(&proxies, &config(20, 4))
        .await
        .unwrap();

    let peak = mock.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak in-flight probes {} exceeded bound", peak);
    assert!(peak >= 2);
    assert!(result.stats.max_in_flight <= 4);
    assert_eq!(mock.probed().len(), 20);
}

#[tokio::test]
async fn test_quarantined_proxy_is_skipped_and_unchanged() {
    let mock = Arc::new(MockProbe::with_delays(&[("ss-node", 80)]));
    let proxies = vec![
        proxy("ss-node", "ss", "1.2.3.4", 443),
        proxy("trojan-node", "trojan", "5.6.7.8", 443),
    ];
    let prior = vec![QuarantineEntry::new(ProxyKey::new("trojan", "5.6.7.8", 443), 3)];

    let result = checker(&mock, 3, prior.clone())
        .check_proxies(&proxies, &config(100, 4))
        .await
        .unwrap();

    assert_eq!(mock.probed(), vec!["ss-node".to_string()]);
    assert_eq!(result.excluded_proxies, prior);
    assert_eq!(result.stats.skipped, 1);
    assert_eq!(names(&result.qualified_proxies), vec!["ss-node"]);
}

#[tokio::test]
async fn test_threshold_reached_across_runs() {
    let proxies = vec![proxy("trojan-node", "trojan", "5.6.7.8", 443)];
    let key = ProxyKey::new("trojan", "5.6.7.8", 443);
    let mut state: Vec<QuarantineEntry> = vec![];

    // 连续三轮失败
    for run in 1..=3u32 {
        let mock = Arc::new(MockProbe::default());
        let result = checker(&mock, 3, state)
            .check_proxies(&proxies, &config(10, 1))
            .await
            .unwrap();

        assert_eq!(mock.probed().len(), 1, "run {} should probe", run);
        assert_eq!(result.excluded_proxies[0].consecutive_failures, run);
        state = result.excluded_proxies;
    }

    // 第四轮直接跳过
    let mock = Arc::new(MockProbe::with_delays(&[("trojan-node", 30)]));
    let result = checker(&mock, 3, state)
        .check_proxies(&proxies, &config(10, 1))
        .await
        .unwrap();

    assert!(mock.probed().is_empty());
    assert!(result.qualified_proxies.is_empty());
    assert_eq!(result.excluded_proxies[0].key(), key);
    assert_eq!(result.excluded_proxies[0].consecutive_failures, 3);
}

#[tokio::test]
async fn test_success_forgives_failures() {
    let proxies = vec![proxy("trojan-node", "trojan", "5.6.7.8", 443)];
    let prior = vec![QuarantineEntry::new(ProxyKey::new("trojan", "5.6.7.8", 443), 2)];
    let mock = Arc::new(MockProbe::with_delays(&[("trojan-node", 120)]));

    let mut checker = checker(&mock, 3, prior);
    let result = checker
        .check_proxies(&proxies, &config(10, 1))
        .await
        .unwrap();

    assert_eq!(names(&result.qualified_proxies), vec!["trojan-node"]);
    assert!(result.excluded_proxies.is_empty());
    assert!(checker.tracker().is_empty());
}

#[tokio::test]
async fn test_segment_push_failure_is_isolated() {
    let proxies = numbered(9);
    let mut mock = MockProbe::with_delays(&[("node-0", 10), ("node-4", 10), ("node-8", 10)]);
    mock.failing_updates.insert(1);
    let mock = Arc::new(mock);

    // node-3 在第二个分段，带有上一轮的失败记录
    let seeded = QuarantineEntry::new(proxies[3].key(), 1);

    let result = checker(&mock, 3, vec![seeded.clone()])
        .check_proxies(&proxies, &config(3, 2))
        .await
        .unwrap();

    assert_eq!(mock.update_calls.load(Ordering::SeqCst), 3);
    assert_eq!(names(&result.qualified_proxies), vec!["node-0", "node-8"]);

    let probed = mock.probed();
    for name in ["node-3", "node-4", "node-5"] {
        assert!(!probed.contains(&name.to_string()));
    }

    let excluded_keys: Vec<ProxyKey> = result.excluded_proxies.iter().map(|e| e.key()).collect();
    assert!(!excluded_keys.contains(&proxies[4].key()));
    assert!(!excluded_keys.contains(&proxies[5].key()));
    assert!(result.excluded_proxies.contains(&seeded));
    // 第一、三分段各有两个失败节点
    assert_eq!(result.excluded_proxies.len(), 5);
    assert_eq!(result.stats.segments_failed, 1);
}

#[tokio::test]
async fn test_all_segments_failing_is_terminal() {
    let mut mock = MockProbe::default();
    mock.failing_updates.extend([0, 1]);
    let mock = Arc::new(mock);

    let result = checker(&mock, 3, vec![])
        .check_proxies(&numbered(4), &config(2, 2))
        .await;

    assert!(matches!(
        result,
        Err(HealthCheckError::AllSegmentsFailed { segments: 2 })
    ));
    assert!(mock.probed().is_empty());
}

#[tokio::test]
async fn test_invalid_config_rejected_before_probing() {
    let mock = Arc::new(MockProbe::default());

    let result = checker(&mock, 3, vec![])
        .check_proxies(&numbered(3), &config(0, 2))
        .await;
    assert!(matches!(result, Err(HealthCheckError::InvalidConfig(_))));

    let result = checker(&mock, 3, vec![])
        .check_proxies(&numbered(3), &config(2, 0))
        .await;
    assert!(matches!(result, Err(HealthCheckError::InvalidConfig(_))));

    assert_eq!(mock.update_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_probe_errors_and_hangs_count_as_failures() {
    let proxies = numbered(3);
    let mut mock = MockProbe::with_delays(&[("node-0", 10), ("node-1", 10), ("node-2", 10)]);
    mock.errors.insert("node-1".to_string());
    mock.hangs.insert("node-2".to_string());
    let mock = Arc::new(mock);

    let config = HealthCheckConfig::new(10, 3, "https://example.com".to_string(), 10);
    let result = checker(&mock, 3, vec![])
        .check_proxies(&proxies, &config)
        .await
        .unwrap();

    assert_eq!(names(&result.qualified_proxies), vec!["node-0"]);
    assert_eq!(result.excluded_proxies.len(), 2);
    assert!(
        result
            .excluded_proxies
            .iter()
            .all(|e| e.consecutive_failures == 1)
    );
}

#[tokio::test]
async fn test_qualified_order_policy() {
    let proxies = numbered(3);
    let mock = Arc::new(MockProbe::with_delays(&[("node-0", 300), ("node-1", 50), ("node-2", 120)]));

    let by_delay = checker(&mock, 3, vec![])
        .check_proxies(&proxies, &config(2, 3))
        .await
        .unwrap();
    assert_eq!(names(&by_delay.qualified_proxies), vec!["node-1", "node-2", "node-0"]);

    let in_order = checker(&mock, 3, vec![])
        .check_proxies(
            &proxies,
            &config(2, 3).with_qualified_order(QualifiedOrder::Input),
        )
        .await
        .unwrap();
    assert_eq!(names(&in_order.qualified_proxies), vec!["node-0", "node-1", "node-2"]);
}

#[tokio::test]
async fn test_embedded_counter_skips_probe_and_is_reported() {
    let proxies = vec![proxy("old", "vmess", "9.9.9.9", 80).with_excluded_times(4)];
    let mock = Arc::new(MockProbe::with_delays(&[("old", 10)]));

    let result = checker(&mock, 3, vec![])
        .check_proxies(&proxies, &config(10, 1))
        .await
        .unwrap();

    assert!(mock.probed().is_empty());
    assert_eq!(
        result.excluded_proxies,
        vec![QuarantineEntry::new(ProxyKey::new("vmess", "9.9.9.9", 80), 4)]
    );
}

#[tokio::test]
async fn test_shared_identity_lands_in_one_list() {
    let proxies = vec![
        proxy("a", "ss", "1.2.3.4", 443),
        proxy("b", "ss", "1.2.3.4", 443),
    ];
    let mock = Arc::new(MockProbe::with_delays(&[("a", 50), ("b", -1)]));

    let result = checker(&mock, 3, vec![])
        .check_proxies(&proxies, &config(10, 2))
        .await
        .unwrap();

    assert_eq!(mock.probed(), vec!["a".to_string()]);
    assert_eq!(names(&result.qualified_proxies), vec!["a"]);
    assert!(result.excluded_proxies.is_empty());
    assert_eq!(result.stats.total_proxies, 1);

    let qualified: HashSet<ProxyKey> = result.qualified_proxies.iter().map(|p| p.key()).collect();
    assert!(
        result
            .excluded_proxies
            .iter()
            .all(|e| !qualified.contains(&e.key()))
    );
}

#[tokio::test]
async fn test_shared_identity_across_segments() {
    let proxies = vec![
        proxy("a", "ss", "1.2.3.4", 443),
        proxy("other", "trojan", "5.6.7.8", 443),
        proxy("b", "ss", "1.2.3.4", 443),
    ];
    let mock = Arc::new(MockProbe::with_delays(&[("a", -1), ("other", 20), ("b", 40)]));

    let result = checker(&mock, 3, vec![])
        .check_proxies(&proxies, &config(1, 1))
        .await
        .unwrap();

    assert_eq!(mock.update_calls.load(Ordering::SeqCst), 2);
    assert_eq!(names(&result.qualified_proxies), vec!["other"]);
    assert_eq!(
        result.excluded_proxies,
        vec![QuarantineEntry::new(ProxyKey::new("ss", "1.2.3.4", 443), 1)]
    );
}

#[tokio::test]
async fn test_huge_timeout_does_not_fail_probes() {
    let mock = Arc::new(MockProbe::with_delays(&[("node-0", 40)]));
    let config = HealthCheckConfig::new(10, 1, "https://example.com".to_string(), u64::MAX);

    let result = checker(&mock, 3, vec![])
        .check_proxies(&numbered(1), &config)
        .await
        .unwrap();

    assert_eq!(names(&result.qualified_proxies), vec!["node-0"]);
}
