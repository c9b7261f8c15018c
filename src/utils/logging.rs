/// 日志工具模块
///
/// 提供日志初始化、运行日志文件和格式化输出的辅助函数
use std::fs::{self, OpenOptions};
use std::io::Write;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::orchestrator::{BatchHalt, BatchSummary};

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；未设置时按 `verbose` 选择 debug 或 info
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化运行日志文件（覆盖旧内容）
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n论文生成发布日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 在运行日志末尾追加一行
pub fn append_log_line(log_file_path: &str, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(model: &str, batch_size: usize, schedule_hour: u32) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 自动论文生成与发布");
    info!("🤖 模型: {}", model);
    info!("📊 定时批量: 每天 {:02}:00 生成 {} 篇", schedule_hour, batch_size);
    info!("{}", "=".repeat(60));
}

pub fn log_batch_start(total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始批量任务: 共 {} 篇论文", total);
    info!("💡 逐篇处理，每篇都会记录一条结果");
    info!("{}", "=".repeat(60));
}

pub fn log_paper_start(index: usize, total: usize) {
    info!("📄 [论文 {}/{}] 开始处理", index, total);
}

pub fn log_paper_complete(index: usize, total: usize, status: &str) {
    info!("\n{}", "─".repeat(60));
    info!("✓ [论文 {}/{}] 完成: {}", index, total, status);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(summary: &BatchSummary, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 批量任务统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 已发布: {}/{}", summary.published, summary.requested);
    info!("📦 未发布: {}", summary.unpublished);
    info!("❌ 编译失败: {}", summary.compile_failed);
    match &summary.halt {
        Some(BatchHalt::Cancelled { paper_index }) => {
            info!("🛑 在第 {} 篇时被取消", paper_index)
        }
        Some(BatchHalt::Aborted { message, .. }) => info!("{}", message),
        None => {}
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
