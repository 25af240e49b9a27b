use anyhow::Result;
use clap::Parser;
use std::path::Path;
use subs_health_check::app::Application;
use subs_health_check::check::CheckStats;
use subs_health_check::config::Config;

/// 订阅节点健康检查工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short = 'f', long, default_value = "config/config.yaml")]
    config: String,

    /// 订阅链接（可多次指定）
    #[arg(long = "proxies-url")]
    proxies_urls: Vec<String>,

    /// 本地节点文件（可多次指定）
    #[arg(long = "proxies-file")]
    proxies_files: Vec<String>,

    /// 上一轮隔离数据的订阅链接
    #[arg(long = "excluded-url")]
    excluded_urls: Vec<String>,

    /// 上一轮隔离数据的本地文件
    #[arg(long = "excluded-file")]
    excluded_files: Vec<String>,

    /// 每个分段的节点数
    #[arg(long)]
    segment_size: Option<usize>,

    /// 并发数
    #[arg(long)]
    concurrency: Option<usize>,

    /// 测试地址
    #[arg(long)]
    test_url: Option<String>,

    /// 超时时间（毫秒）
    #[arg(long)]
    timeout: Option<u64>,

    /// 连续失败多少次后隔离
    #[arg(long)]
    max_excluded_times: Option<u32>,

    /// 合格节点输出路径
    #[arg(long)]
    qualified: Option<String>,

    /// 隔离节点输出路径
    #[arg(long)]
    excluded: Option<String>,

    /// 统计信息输出路径
    #[arg(long)]
    statistics: Option<String>,

    /// 代理核心控制接口地址
    #[arg(long)]
    controller: Option<String>,

    /// Sub-Store 地址
    #[arg(long)]
    sub_store: Option<String>,

    /// 合格节点保持输入顺序，不按延迟排序
    #[arg(long)]
    no_sort: bool,

    /// 是否显示进度条
    #[arg(long)]
    progress: Option<bool>,

    /// 日志级别
    #[arg(long)]
    log_level: Option<String>,

    /// 详细输出
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Config::load_from_file(path)
    } else {
        Ok(Config::default())
    }
}

fn apply_args(config: &mut Config, args: Args) {
    config.proxies_config_urls.extend(args.proxies_urls);
    config.proxies_files.extend(args.proxies_files);
    config.excluded_proxies_config_urls.extend(args.excluded_urls);
    config.excluded_files.extend(args.excluded_files);

    if let Some(segment_size) = args.segment_size {
        config.segment_size = segment_size;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(test_url) = args.test_url {
        config.test_url = test_url;
    }
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }
    if let Some(max_excluded_times) = args.max_excluded_times {
        config.max_excluded_times = max_excluded_times;
    }
    if let Some(qualified) = args.qualified {
        config.qualified = qualified;
    }
    if let Some(excluded) = args.excluded {
        config.excluded = excluded;
    }
    if let Some(statistics) = args.statistics {
        config.statistics = statistics;
    }
    if let Some(controller) = args.controller {
        config.controller_url = controller;
    }
    if let Some(sub_store) = args.sub_store {
        config.sub_store_url = sub_store;
    }
    if args.no_sort {
        config.sort_by_delay = false;
    }
    if let Some(progress) = args.progress {
        config.print_progress = progress;
    }
    if args.verbose {
        config.log_level = "debug".to_string();
    } else if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }
}

fn print_summary(stats: &CheckStats) {
    println!("\n检测摘要:");
    println!("{:=<60}", "");
    println!("节点总数: {}", stats.total_proxies);
    println!(
        "分段: {} (失败 {})",
        stats.segments_total, stats.segments_failed
    );
    println!("已探测: {}", stats.probes_issued);
    println!("隔离跳过: {}", stats.skipped);
    println!("合格节点: {} ({:.1}%)", stats.qualified, stats.success_rate());
    println!("隔离记录: {}", stats.excluded);
    if let Some(fastest) = stats.fastest_delay {
        println!("最低延迟: {}ms", fastest);
    }
    if let Some(average) = stats.average_delay {
        println!("平均延迟: {:.0}ms", average);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 配置文件 < 环境变量 < 命令行
    let config_path = args.config.clone();
    let mut config = load_config(&config_path)?;
    config.apply_env_overrides()?;
    apply_args(&mut config, args);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    println!("🚀 订阅节点健康检查 v{}", env!("CARGO_PKG_VERSION"));
    println!("{:=<60}", "");
    log::info!("⚙️ 配置文件: {}", config_path);
    log::debug!("{:#?}", config);

    let application = Application::new(config)?;
    let result = application.run().await?;

    print_summary(&result.stats);
    println!("\n🎉 检测完成!");

    Ok(())
}
