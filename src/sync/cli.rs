use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "osd-sync")]
#[command(about = "对象存储上传、下载工具，支持腾讯云COS、阿里云OSS")]
#[command(version)]
#[command(after_help = r#"
EXAMPLES / 示例:
  Initialize a template config / 初始化模版配置文件:
    osd-sync init

  Upload configured directories / 按配置上传本地目录:
    osd-sync upload

  Download with a custom config / 指定配置文件下载:
    osd-sync --config /etc/osd-sync.yaml download

  Check and upgrade this tool / 检查并升级工具版本:
    osd-sync --upgrade
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// 配置文件路径 / Config file path
    #[arg(long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// 检查和升级当前工具版本 / Check and upgrade this tool
    #[arg(long)]
    pub upgrade: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 把配置的本地目录上传到云端对象存储中 / Upload local directories to object storage
    #[command(alias = "u")]
    Upload,

    /// 按配置从云端对象存储中下载文件到本地 / Download files from object storage
    #[command(alias = "d")]
    Download,

    /// 按模版初始化配置文件 / Write a template config file
    #[command(alias = "i")]
    Init,
}
