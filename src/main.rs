mod sync;

use crate::sync::cli::{Cli, Command};
use crate::sync::config::{self, TransferConfig};
use crate::sync::transfer::CloudTransfer;
use crate::sync::updater::Updater;
use anyhow::Result;
use clap::{CommandFactory, Parser};

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = Cli::parse();

    // --upgrade 独立于传输流程，成功后直接退出
    if cli.upgrade {
        if let Err(e) = run_upgrade().await {
            eprintln!("❌ 错误: {}", e);
            std::process::exit(1);
        }
        std::process::exit(0);
    }

    if let Err(e) = run(cli).await {
        eprintln!("❌ 错误: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Init => config::write_template(&cli.config),
        Command::Upload => {
            let cfg = TransferConfig::load(&cli.config)?;
            CloudTransfer::new(cfg)?.upload().await?;
            Ok(())
        }
        Command::Download => {
            let cfg = TransferConfig::load(&cli.config)?;
            CloudTransfer::new(cfg)?.download().await?;
            Ok(())
        }
    }
}

async fn run_upgrade() -> Result<()> {
    let updater = Updater::new().await?;
    if updater.is_latest(env!("CARGO_PKG_VERSION")) {
        println!("✅ 当前已是最新版本");
        return Ok(());
    }
    updater.upgrade().await?;
    println!("🎉 版本升级完成，请重新启动程序");
    Ok(())
}
