use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;

/// 检测进度显示，未启用时所有方法均为空操作
#[derive(Clone, Default)]
pub struct ProgressTracker {
    multi_progress: Option<Arc<MultiProgress>>,
    segment_progress: Option<ProgressBar>,
    proxy_progress: Option<ProgressBar>,
}

fn style(template: &str, chars: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(chars)
}

impl ProgressTracker {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let multi_progress = Arc::new(MultiProgress::new());

        // 分段进度条
        let segment_progress = multi_progress.add(ProgressBar::new(0));
        segment_progress.set_style(style(
            "{spinner:.green} [{elapsed_precise}] 分段: [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            "#>-",
        ));

        // 节点检测进度
        let proxy_progress = multi_progress.add(ProgressBar::new(0));
        proxy_progress.set_style(style(
            "  {spinner:.yellow} 节点检测: [{bar:30.yellow}] {pos}/{len} ({eta}) {msg}",
            "█▉▊▋▌▍▎▏  ",
        ));

        Self {
            multi_progress: Some(multi_progress),
            segment_progress: Some(segment_progress),
            proxy_progress: Some(proxy_progress),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn set_totals(&self, proxies: u64, segments: u64) {
        if let Some(pb) = &self.segment_progress {
            pb.set_length(segments);
            pb.set_position(0);
        }

        if let Some(pb) = &self.proxy_progress {
            pb.set_length(proxies);
            pb.set_position(0);
        }
    }

    /// 一个节点完成对账；`None` 表示已隔离跳过
    pub fn increment_proxy(&self, success: Option<bool>) {
        if let Some(pb) = &self.proxy_progress {
            pb.inc(1);
            match success {
                Some(true) => pb.set_message("✅"),
                Some(false) => pb.set_message("❌"),
                None => pb.set_message("⏭"),
            }
        }
    }

    pub fn finish_segment(&self, failed: bool, skipped_proxies: u64) {
        if let Some(pb) = &self.proxy_progress {
            if skipped_proxies > 0 {
                pb.inc(skipped_proxies);
            }
        }

        if let Some(pb) = &self.segment_progress {
            pb.inc(1);
            if failed {
                pb.set_message("❌ 分段失败");
            } else {
                pb.set_message("✅");
            }
        }
    }

    pub fn finalize(&self) {
        if let Some(pb) = &self.proxy_progress {
            pb.finish_with_message("完成");
        }

        if let Some(pb) = &self.segment_progress {
            pb.finish_with_message("检测完成");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.multi_progress.is_some()
    }
}
