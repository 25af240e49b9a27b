//! 结果输出
//! 合格节点写成 Clash Meta 配置，隔离记录写成下一轮可直接加载的列表

use anyhow::Result;
use chrono::Local;
use log::{info, warn};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::check::CheckStats;
use crate::clash_proxy::build_clash_meta_config;
use crate::proxy::{self, ProxyRecord};
use crate::quarantine::QuarantineEntry;

#[derive(Serialize)]
struct ExcludedDocument<'a> {
    proxies: &'a [QuarantineEntry],
}

/// 写文件，必要时创建父目录
fn output_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content)?;
    Ok(())
}

/// 写出合格节点，列表为空时不生成文件。返回是否写入
pub fn write_qualified_proxies<P: AsRef<Path>>(proxies: &[ProxyRecord], path: P) -> Result<bool> {
    if proxies.is_empty() {
        warn!("⚠️ 没有合格的节点");
        return Ok(false);
    }

    let renamed = proxy::suffix_duplicate_names(proxies);
    let config = build_clash_meta_config(&renamed)?;
    output_file(path.as_ref(), &serde_yaml::to_string(&config)?)?;

    info!("✅ 输出 {} 个合格节点", proxies.len());
    Ok(true)
}

/// 写出隔离记录。列表为空时也写入空文档，覆盖上一轮留下的文件
pub fn write_excluded_proxies<P: AsRef<Path>>(entries: &[QuarantineEntry], path: P) -> Result<()> {
    let yaml = serde_yaml::to_string(&ExcludedDocument { proxies: entries })?;
    output_file(path.as_ref(), &yaml)?;

    if entries.is_empty() {
        info!("✅ 没有被隔离的节点，已清空隔离列表");
    } else {
        info!("✅ 输出 {} 个隔离节点", entries.len());
    }
    Ok(())
}

pub fn render_statistics(stats: &CheckStats) -> String {
    let mut md = String::new();
    let delay = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    let _ = writeln!(md, "# 健康检查统计");
    let _ = writeln!(md);
    let _ = writeln!(md, "生成时间: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(md);
    let _ = writeln!(md, "| 项目 | 数值 |");
    let _ = writeln!(md, "| --- | --- |");
    let _ = writeln!(md, "| 节点总数 | {} |", stats.total_proxies);
    let _ = writeln!(
        md,
        "| 分段 (失败/总数) | {}/{} |",
        stats.segments_failed, stats.segments_total
    );
    let _ = writeln!(md, "| 已探测 | {} |", stats.probes_issued);
    let _ = writeln!(md, "| 隔离跳过 | {} |", stats.skipped);
    let _ = writeln!(md, "| 合格 | {} |", stats.qualified);
    let _ = writeln!(md, "| 本轮失败 | {} |", stats.failed);
    let _ = writeln!(md, "| 隔离记录 | {} |", stats.excluded);
    let _ = writeln!(md, "| 成功率 | {:.1}% |", stats.success_rate());
    let _ = writeln!(
        md,
        "| 最低延迟 | {} |",
        delay(stats.fastest_delay.map(|d| format!("{}ms", d)))
    );
    let _ = writeln!(
        md,
        "| 平均延迟 | {} |",
        delay(stats.average_delay.map(|d| format!("{:.0}ms", d)))
    );

    md
}

pub fn write_statistics<P: AsRef<Path>>(stats: &CheckStats, path: P) -> Result<()> {
    output_file(path.as_ref(), &render_statistics(stats))?;
    info!("✅ 统计信息已写入 {}", path.as_ref().display());
    Ok(())
}

/// 输出文件路径，相对路径相对于 `base`
pub fn resolve_output_path(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
