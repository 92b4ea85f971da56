use anyhow::Result;
use auto_correction::config::Config;
use auto_correction::models::PipelineStep;
use auto_correction::utils::logging;
use auto_correction::App;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "auto_correction", version, about = "手写答案自动添削流水线")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 全量处理（不指定文件时处理全部已上传答案）
    Process {
        files: Vec<String>,
    },
    /// 只执行指定步骤，例如 `reprocess a.pdf identify,review --force`
    Reprocess {
        file: String,
        steps: String,
        #[arg(long)]
        force: bool,
    },
    /// 查看处理状态
    Status {
        file: String,
    },
    /// 人工签收
    Complete {
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    let cli = Cli::parse();

    // 加载配置
    let config = Config::load()?;

    // 初始化应用
    let app = App::initialize(config).await?;

    match cli.command.unwrap_or(Command::Process { files: Vec::new() }) {
        Command::Process { files } if files.is_empty() => {
            app.run().await?;
        }
        Command::Process { files } => {
            app.process(files).await?;
        }
        Command::Reprocess { file, steps, force } => {
            let steps = PipelineStep::parse_list(&steps)?;
            let report = app.orchestrator().run_steps(&file, &steps, force).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Status { file } => {
            let status = app.orchestrator().status(&file).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Complete { file } => {
            app.registry().sync().await?;
            let document = app.registry().mark_completed(&file).await?;
            info!("✅ {} → {}", document.name, document.status);
        }
    }

    Ok(())
}
