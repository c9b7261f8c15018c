//! 自动论文生成与发布
//!
//! ## 命令
//!
//! - `run`: 立即生成一批论文
//! - `schedule`: 开启 / 关闭 / 查看每日定时任务
//! - `daemon`: 常驻运行，按定时开关每天触发批量任务
//! - `republish`: 重新发布一条未发布的记录
//! - `recompile`: 按人工指令修复并重新编译一条记录
//! - `list`: 列出全部记录

use std::path::PathBuf;

use anyhow::Result;
use auto_paper_publish::utils::logging;
use auto_paper_publish::{App, Config};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "auto-paper")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "自动生成、评审、编译并发布学术论文", long_about = None)]
struct Cli {
    /// TOML 配置文件路径
    #[arg(short, long, global = true, env = "AUTO_PAPER_CONFIG")]
    config: Option<PathBuf>,

    /// 显示详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 立即生成一批论文
    Run {
        /// 本批论文数量
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },

    /// 每日定时任务开关
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// 常驻运行，按定时开关触发批量任务，Ctrl-C 退出
    Daemon,

    /// 重新发布一条未发布的记录
    Republish {
        id: Uuid,
    },

    /// 按人工指令修复并重新编译
    Recompile {
        id: Uuid,

        /// 修复时附带的指令
        #[arg(short, long)]
        instructions: String,
    },

    /// 列出全部记录
    List,
}

#[derive(Subcommand)]
enum ScheduleAction {
    On,
    Off,
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load(cli.config.as_deref())?;

    // 初始化日志
    logging::init(cli.verbose || config.verbose_logging);

    // 初始化应用
    let app = App::initialize(config).await?;

    match cli.command {
        Commands::Run { count } => {
            logging::init_log_file(&app.context().config.output_log_file)?;
            let cancel = app.orchestrator().cancellation();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("🛑 收到 Ctrl-C，当前阶段结束后停止");
                    cancel.cancel();
                }
            });
            let summary = app.orchestrator().run_batch(count).await;
            if summary.halt.is_some() {
                std::process::exit(1);
            }
        }
        Commands::Schedule { action } => match action {
            ScheduleAction::On => {
                let delay = app.scheduler().activate().await?;
                let next = chrono::Local::now() + chrono::Duration::from_std(delay)?;
                println!("定时任务已开启，下次触发: {}", next.format("%Y-%m-%d %H:%M"));
                println!("需要 `daemon` 进程常驻才会实际触发");
                app.scheduler().shutdown();
            }
            ScheduleAction::Off => {
                app.scheduler().deactivate().await?;
                println!("定时任务已关闭");
            }
            ScheduleAction::Status => {
                let active = app.scheduler().persisted_active().await?;
                println!(
                    "定时任务: {} (每天 {:02}:00, 每批 {} 篇)",
                    if active { "开启" } else { "关闭" },
                    app.context().config.schedule_hour,
                    app.context().config.scheduled_batch_size
                );
            }
        },
        Commands::Daemon => {
            logging::init_log_file(&app.context().config.output_log_file)?;
            app.start_daemon().await;
            tokio::signal::ctrl_c().await?;
            info!("👋 收到 Ctrl-C，退出");
            app.shutdown();
        }
        Commands::Republish { id } => {
            let outcome = app.orchestrator().republish(id).await?;
            println!("{}", outcome.summary_line());
        }
        Commands::Recompile { id, instructions } => {
            let outcome = app.orchestrator().recompile(id, &instructions).await?;
            println!("{}", outcome.summary_line());
        }
        Commands::List => {
            let outcomes = app.orchestrator().list_outcomes().await?;
            if outcomes.is_empty() {
                println!("暂无记录");
            }
            for outcome in outcomes {
                println!(
                    "{}  {}  {}",
                    outcome.id,
                    outcome.status_label(),
                    logging::truncate_text(&outcome.title, 60)
                );
            }
        }
    }

    Ok(())
}
