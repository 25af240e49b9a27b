//! Clash Meta 配置模板
//! 把检测合格的节点组装成可直接使用的完整配置

use anyhow::{Result, anyhow};
use serde_yaml::{Mapping, Value};

use crate::proxy::ProxyRecord;

const GROUP_SELECT: &str = "🚀 节点选择";
const GROUP_AUTO: &str = "♻️ 自动选择";
const GROUP_FALLBACK: &str = "🚑 故障转移";
const GROUP_BALANCE: &str = "⚖️ 负载均衡";
const GROUP_DIRECT: &str = "🎯 全球直连";
const GROUP_FINAL: &str = "🐟 漏网之鱼";

const GROUP_TEST_URL: &str = "https://google.com/generate_204";

const BASE_CONFIG: &str = r#"
mixed-port: 7890
ipv6: true
allow-lan: true
unified-delay: false
tcp-concurrent: true
external-controller: 127.0.0.1:9090
geox-url:
  geoip: https://fastly.jsdelivr.net/gh/MetaCubeX/meta-rules-dat@release/geoip.dat
  geosite: https://fastly.jsdelivr.net/gh/MetaCubeX/meta-rules-dat@release/geosite.dat
  mmdb: https://fastly.jsdelivr.net/gh/MetaCubeX/meta-rules-dat@release/geoip.metadb
  asn: https://fastly.jsdelivr.net/gh/MetaCubeX/meta-rules-dat@release/GeoLite2-ASN.mmdb
dns:
  enable: true
  listen: 0.0.0.0:1053
  ipv6: true
  use-system-hosts: false
  enhanced-mode: fake-ip
  fake-ip-range: 198.18.0.1/16
  fake-ip-filter: ["+.lan", "+.local", "+.msftconnecttest.com", "+.msftncsi.com"]
  default-nameserver: [223.5.5.5, 119.29.29.29, 1.1.1.1, 8.8.8.8]
  nameserver:
    - https://dns.alidns.com/dns-query
    - https://doh.pub/dns-query
    - https://doh.360.cn/dns-query
    - https://1.1.1.1/dns-query
    - https://1.0.0.1/dns-query
    - https://208.67.222.222/dns-query
    - https://208.67.220.220/dns-query
  proxy-server-nameserver:
    - https://dns.alidns.com/dns-query
    - https://doh.pub/dns-query
    - https://doh.360.cn/dns-query
  nameserver-policy:
    "geosite:private,cn,geolocation-cn":
      - https://dns.alidns.com/dns-query
      - https://doh.pub/dns-query
      - https://doh.360.cn/dns-query
    "geosite:google,youtube,telegram,gfw,geolocation-!cn":
      - https://1.1.1.1/dns-query
      - https://1.0.0.1/dns-query
      - https://208.67.222.222/dns-query
      - https://208.67.220.220/dns-query
sniffer:
  enable: true
  sniff:
    HTTP:
      ports: [80, 8080-8880]
      override-destination: true
    TLS:
      ports: [443, 8443]
    QUIC:
      ports: [443, 8443]
  skip-domain: ["Mijia Cloud", "+.push.apple.com"]
"#;

const RULES: &[&str] = &[
    "GEOIP,lan,🎯 全球直连,no-resolve",
    "GEOSITE,github,🚀 节点选择",
    "GEOSITE,twitter,🚀 节点选择",
    "GEOSITE,youtube,🚀 节点选择",
    "GEOSITE,google,🚀 节点选择",
    "GEOSITE,telegram,🚀 节点选择",
    "GEOSITE,netflix,🚀 节点选择",
    "GEOSITE,bilibili,🎯 全球直连",
    "GEOSITE,spotify,🚀 节点选择",
    "GEOSITE,CN,🎯 全球直连",
    "GEOSITE,geolocation-!cn,🐟 漏网之鱼",
    "GEOIP,google,🚀 节点选择",
    "GEOIP,telegram,🚀 节点选择",
    "GEOIP,twitter,🚀 节点选择",
    "GEOIP,CN,🎯 全球直连",
    "MATCH,🐟 漏网之鱼",
];

fn s(value: &str) -> Value {
    Value::String(value.to_string())
}

fn names(list: &[&str]) -> Vec<Value> {
    list.iter().map(|name| s(name)).collect()
}

/// 带测速参数的自动分组（url-test / fallback / load-balance）
fn tested_group(name: &str, group_type: &str, proxy_names: &[Value]) -> Value {
    let mut group = Mapping::new();
    group.insert(s("name"), s(name));
    group.insert(s("type"), s(group_type));
    if group_type == "load-balance" {
        group.insert(s("strategy"), s("round-robin"));
    }
    group.insert(s("url"), s(GROUP_TEST_URL));
    group.insert(s("lazy"), Value::Bool(true));
    group.insert(s("interval"), Value::from(120));
    group.insert(s("timeout"), Value::from(2000));
    if group_type == "url-test" {
        group.insert(s("tolerance"), Value::from(100));
    }
    group.insert(s("max-failed-times"), Value::from(3));
    group.insert(s("proxies"), Value::Sequence(proxy_names.to_vec()));
    Value::Mapping(group)
}

fn select_group(name: &str, proxies: Vec<Value>) -> Value {
    let mut group = Mapping::new();
    group.insert(s("name"), s(name));
    group.insert(s("type"), s("select"));
    group.insert(s("proxies"), Value::Sequence(proxies));
    Value::Mapping(group)
}

/// 生成 Clash Meta 配置。节点名称需已去重
pub fn build_clash_meta_config(proxies: &[ProxyRecord]) -> Result<Value> {
    let mut config: Mapping = serde_yaml::from_str(BASE_CONFIG)
        .map_err(|e| anyhow!("配置模板解析失败: {}", e))?;

    let proxy_names: Vec<Value> = proxies.iter().map(|p| s(&p.name)).collect();

    let mut select = names(&[GROUP_AUTO, GROUP_FALLBACK, GROUP_BALANCE, "DIRECT"]);
    select.extend(proxy_names.iter().cloned());

    let mut fin = names(&[GROUP_SELECT, GROUP_AUTO, GROUP_FALLBACK, GROUP_BALANCE, "DIRECT"]);
    fin.extend(proxy_names.iter().cloned());

    let proxy_groups = vec![
        select_group(GROUP_SELECT, select),
        tested_group(GROUP_AUTO, "url-test", &proxy_names),
        tested_group(GROUP_FALLBACK, "fallback", &proxy_names),
        tested_group(GROUP_BALANCE, "load-balance", &proxy_names),
        select_group(
            GROUP_DIRECT,
            names(&["DIRECT", GROUP_SELECT, GROUP_AUTO, GROUP_FALLBACK, GROUP_BALANCE]),
        ),
        select_group(GROUP_FINAL, fin),
    ];

    config.insert(s("proxy-groups"), Value::Sequence(proxy_groups));
    config.insert(s("proxies"), serde_yaml::to_value(proxies)?);
    config.insert(s("rules"), Value::Sequence(names(RULES)));

    Ok(Value::Mapping(config))
}
