use crate::sync::helper::compare_version;
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::cmp::Ordering;
use std::env::consts::{ARCH, OS};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// 发布仓库
pub const REPO: &str = "haywolf/osd-sync";
/// 包内二进制文件名模版
const BIN_NAME: &str = "osd-sync_{os}_{arch}";
/// 发布包文件名模版
const PKG_NAME: &str = "osd-sync_{os}_{arch}.zip";

/// Release API 响应结构
#[derive(Debug, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

/// 版本更新器
pub struct Updater {
    latest: Release,
    pkg_name: String,
    bin_name: String,
}

impl Updater {
    /// 拉取最新版本信息并按当前系统填充包名
    pub async fn new() -> Result<Self> {
        let latest = get_latest(REPO).await?;
        Ok(Self {
            latest,
            pkg_name: fill_platform(PKG_NAME),
            bin_name: fill_platform(BIN_NAME),
        })
    }

    /// 判断当前版本是否已是最新版
    pub fn is_latest(&self, current: &str) -> bool {
        compare_version(&self.latest.tag_name, current) != Ordering::Greater
    }

    /// 与当前系统匹配的下载链接
    fn latest_url(&self) -> Option<&str> {
        self.latest
            .assets
            .iter()
            .find(|asset| asset.name == self.pkg_name)
            .map(|asset| asset.browser_download_url.as_str())
    }

    /// 执行版本升级，失败时自动回滚
    pub async fn upgrade(&self) -> Result<()> {
        let Some(url) = self.latest_url() else {
            bail!("最新版本不支持当前系统: {}-{}", OS, ARCH);
        };

        // 独立的临时目录，无论成败退出时都会清理
        let tmp = TempDirGuard::create()?;
        let pkg_path = tmp.path().join(&self.pkg_name);
        let bin_path = tmp.path().join(&self.bin_name);

        download(url, &pkg_path).await?;
        unpack(&pkg_path, tmp.path())?;

        if !bin_path.exists() {
            bail!("发布包中缺少二进制文件: {}", self.bin_name);
        }

        let exe = std::env::current_exe().context("获取当前程序路径失败")?;
        swap_binary(&exe, &bin_path)
    }
}

fn fill_platform(pattern: &str) -> String {
    pattern.replace("{os}", OS).replace("{arch}", ARCH)
}

/// 获取最新版本信息
async fn get_latest(repo: &str) -> Result<Release> {
    let url = format!("https://api.github.com/repos/{}/releases/latest", repo);
    let client = reqwest::Client::builder()
        .user_agent(concat!("osd-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("初始化 HTTP 客户端失败")?;

    let response = client
        .get(&url)
        .send()
        .await
        .context("获取最新版本信息失败")?;
    let status = response.status();
    if !status.is_success() {
        bail!("获取最新版本信息失败，状态码 {}", status);
    }
    let body = response.bytes().await.context("读取版本信息失败")?;
    serde_json::from_slice::<Release>(&body).context("解析版本信息失败")
}

/// 下载发布包到本地，带进度条
async fn download(url: &str, dest: &Path) -> Result<()> {
    println!("📥 下载: {}", url);
    let client = reqwest::Client::builder()
        .user_agent(concat!("osd-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("初始化 HTTP 客户端失败")?;
    let mut response = client.get(url).send().await.context("下载请求失败")?;
    let status = response.status();
    if !status.is_success() {
        bail!("下载失败，状态码 {}", status);
    }

    let pb = ProgressBar::new(response.content_length().unwrap_or(0));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.green/white}] {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("=>-"),
    );

    let mut file = fs::File::create(dest)
        .with_context(|| format!("创建临时文件失败: {}", dest.display()))?;
    while let Some(chunk) = response.chunk().await.context("读取下载内容失败")? {
        file.write_all(&chunk).context("写入临时文件失败")?;
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message("下载完成");
    Ok(())
}

/// 解压发布包：目录项建目录，文件项按相对路径展开
fn unpack(pkg: &Path, target: &Path) -> Result<()> {
    println!("📦 解压: {}", pkg.display());
    let file = fs::File::open(pkg).context("打开发布包失败")?;
    let mut archive = zip::ZipArchive::new(file).context("读取发布包失败")?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let path = target.join(relative);

        if entry.name().ends_with('/') {
            fs::create_dir_all(&path)?;
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&path)?;
            std::io::copy(&mut entry, &mut out)?;
        }
    }
    Ok(())
}

/// 原子替换当前二进制：
/// 先把旧文件 rename 成 .bak（同文件系统内原子，作为提交点），
/// 再拷入新文件并赋可执行权限；任一步失败则 rename 回去还原旧版本
fn swap_binary(exe: &Path, new_bin: &Path) -> Result<()> {
    let backup = PathBuf::from(format!("{}.bak", exe.display()));
    fs::rename(exe, &backup)
        .with_context(|| format!("备份当前程序失败: {}", exe.display()))?;

    if let Err(err) = install(new_bin, exe) {
        rollback(&backup, exe);
        return Err(err);
    }
    let _ = fs::remove_file(&backup);
    Ok(())
}

fn install(new_bin: &Path, exe: &Path) -> Result<()> {
    fs::copy(new_bin, exe).context("写入新版本失败")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(exe, fs::Permissions::from_mode(0o755))
            .context("设置可执行权限失败")?;
    }
    Ok(())
}

fn rollback(backup: &Path, exe: &Path) {
    eprintln!("⚠️  升级失败，正在回滚");
    if let Err(err) = fs::rename(backup, exe) {
        eprintln!("⚠️  回滚失败: {}", err);
    }
}

/// 系统临时目录下的独立工作目录，Drop 时整体删除
struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn create() -> Result<Self> {
        let path = std::env::temp_dir().join(format!(
            ".osd-sync-upgrade-{}",
            chrono::Utc::now().timestamp_millis()
        ));
        fs::create_dir_all(&path)
            .with_context(|| format!("创建临时目录失败: {}", path.display()))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
