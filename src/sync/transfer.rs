use crate::sync::config::{SyncPair, TransferConfig};
use crate::sync::helper::hide_secret;
use crate::sync::provider::{new_provider, Provider};
use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// 固定的并发工作协程数
const WORKERS: usize = 8;
/// 传输队列深度
const QUEUE_DEPTH: usize = 8;

/// 一个待传输的文件：云端键 + 本地路径
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferItem {
    pub remote_key: String,
    pub local_path: PathBuf,
}

/// 单次运行的汇总结果。单个文件失败不会中断运行，只计入这里
#[derive(Debug, Default)]
pub struct TransferSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub failed_keys: Vec<String>,
}

impl TransferSummary {
    fn merge(&mut self, other: TransferSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.failed_keys.extend(other.failed_keys);
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Upload,
    Download,
}

/// 本地文件路径映射为云端键：source 前缀替换为 dest，并去掉前导"/"
pub fn map_upload_key(local_path: &str, source: &str, dest: &str) -> String {
    local_path
        .replacen(source, dest, 1)
        .trim_start_matches('/')
        .to_string()
}

/// 云端键映射为本地路径：prefix 替换为 dest
pub fn map_download_path(key: &str, prefix: &str, dest: &str) -> String {
    key.replacen(prefix, dest, 1)
}

/// 对象存储文件传输器
pub struct CloudTransfer {
    provider: Arc<dyn Provider>,
    config: TransferConfig,
}

impl CloudTransfer {
    pub fn new(config: TransferConfig) -> Result<Self> {
        let provider = new_provider(&config)?;
        Ok(Self { provider, config })
    }

    /// 上传本地配置的文件目录到云端对象存储
    pub async fn upload(&self) -> Result<TransferSummary> {
        self.print_upload_config();
        let (tx, handles) = spawn_workers(self.provider.clone(), Direction::Upload);

        for pair in &self.config.upload.list {
            println!("📤 开始上传: {} -> {}", pair.source, pair.dest);
            enumerate_local(pair, &self.config.upload.ignore, &tx).await;
        }

        // 枚举完毕后关闭队列，等待全部工作协程退出
        drop(tx);
        Ok(join_workers(handles).await)
    }

    /// 下载配置的云端对象存储文件到本地
    pub async fn download(&self) -> Result<TransferSummary> {
        self.print_download_config();
        let (tx, handles) = spawn_workers(self.provider.clone(), Direction::Download);

        for pair in &self.config.download.list {
            println!("📥 开始下载: {} -> {}", pair.source, pair.dest);
            enumerate_remote(pair, self.provider.as_ref(), &tx).await;
        }

        drop(tx);
        Ok(join_workers(handles).await)
    }

    /// 打印上传相关配置
    fn print_upload_config(&self) {
        self.print_common_config();
        println!("upload config:");
        println!("  ignore: {:?}", self.config.upload.ignore);
        println!("  list:");
        for pair in &self.config.upload.list {
            println!("    {} -> {}", pair.source, pair.dest);
        }
        println!("--------------------------------------");
    }

    /// 打印下载相关配置
    fn print_download_config(&self) {
        self.print_common_config();
        println!("download config:");
        println!("  list:");
        for pair in &self.config.download.list {
            println!("    {} -> {}", pair.source, pair.dest);
        }
        println!("--------------------------------------");
    }

    fn print_common_config(&self) {
        println!("--------------- CONFIG ---------------");
        println!("storage: {}", self.config.storage);
        println!("osd config:");
        println!("  bucket: {}", self.config.osd.bucket);
        println!("  region: {}", self.config.osd.region);
        println!("  secret_id: {}", hide_secret(&self.config.osd.secret_id, 8));
        println!("  secret_key: {}", hide_secret(&self.config.osd.secret_key, 8));
    }
}

/// 递归枚举一条上传配置下的本地文件，边走边入队。
/// 命中忽略名单的目录整棵跳过，文件单个跳过；源目录不存在只影响这一条配置
async fn enumerate_local(pair: &SyncPair, ignore: &[String], tx: &mpsc::Sender<TransferItem>) {
    let walker = WalkDir::new(&pair.source).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        if ignore.iter().any(|ig| ig.as_str() == name) {
            println!("⏭️  跳过: {}", entry.path().display());
            return false;
        }
        true
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                eprintln!("⚠️  遍历本地目录出错: {}", err);
                continue;
            }
        };
        if entry.file_type().is_dir() {
            println!("📂 进入目录: {}", entry.path().display());
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let local = entry.path().to_string_lossy();
        let key = map_upload_key(&local, &pair.source, &pair.dest);
        if key.is_empty() {
            continue;
        }
        let item = TransferItem {
            remote_key: key,
            local_path: entry.path().to_path_buf(),
        };
        if tx.send(item).await.is_err() {
            return;
        }
    }
}

/// 枚举一条下载配置下的云端对象并入队。
/// 目录占位键只负责建目录不入队；建目录失败只跳过该对象
async fn enumerate_remote(pair: &SyncPair, provider: &dyn Provider, tx: &mpsc::Sender<TransferItem>) {
    let prefix = pair.source.trim_start_matches('/');
    let keys = provider.list(prefix, "").await;

    for key in keys {
        if key.is_empty() {
            continue;
        }
        let dest = map_download_path(&key, prefix, &pair.dest);
        let dest_path = PathBuf::from(&dest);

        if key.ends_with('/') {
            if let Err(err) = fs::create_dir_all(&dest_path) {
                eprintln!("⚠️  创建目录失败: {} - {}", dest_path.display(), err);
            }
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            if !parent.exists() {
                if let Err(err) = fs::create_dir_all(parent) {
                    eprintln!("⚠️  创建目录失败: {} - {}", parent.display(), err);
                    continue;
                }
            }
        }

        let item = TransferItem {
            remote_key: key,
            local_path: dest_path,
        };
        if tx.send(item).await.is_err() {
            return;
        }
    }
}

/// 先起固定数量的工作协程，再开始入队，枚举与传输并行推进
fn spawn_workers(
    provider: Arc<dyn Provider>,
    direction: Direction,
) -> (mpsc::Sender<TransferItem>, Vec<JoinHandle<TransferSummary>>) {
    let (tx, rx) = mpsc::channel::<TransferItem>(QUEUE_DEPTH);
    let rx = Arc::new(Mutex::new(rx));

    let handles = (0..WORKERS)
        .map(|id| {
            let provider = provider.clone();
            let rx = rx.clone();
            tokio::spawn(run_worker(id, provider, rx, direction))
        })
        .collect();
    (tx, handles)
}

/// 工作协程：从共享队列取任务直到队列关闭。
/// 单个文件失败记录后继续，绝不中断其他任务
async fn run_worker(
    id: usize,
    provider: Arc<dyn Provider>,
    rx: Arc<Mutex<mpsc::Receiver<TransferItem>>>,
    direction: Direction,
) -> TransferSummary {
    let mut summary = TransferSummary::default();
    loop {
        let item = { rx.lock().await.recv().await };
        let Some(item) = item else {
            break;
        };

        let result = match direction {
            Direction::Upload => provider.put_file(&item.remote_key, &item.local_path).await,
            Direction::Download => provider.get_file(&item.remote_key, &item.local_path).await,
        };
        match result {
            Ok(()) => {
                summary.succeeded += 1;
                match direction {
                    Direction::Upload => {
                        println!("✅ [{}] 上传成功: {}", id, item.remote_key)
                    }
                    Direction::Download => {
                        println!("✅ [{}] 下载成功: {}", id, item.local_path.display())
                    }
                }
            }
            Err(err) => {
                summary.failed += 1;
                eprintln!("⚠️  [{}] 传输失败: {} - {}", id, item.remote_key, err);
                summary.failed_keys.push(item.remote_key);
            }
        }
    }
    summary
}

/// 等待所有工作协程退出并合并汇总
async fn join_workers(handles: Vec<JoinHandle<TransferSummary>>) -> TransferSummary {
    let mut total = TransferSummary::default();
    for handle in handles {
        if let Ok(summary) = handle.await {
            total.merge(summary);
        }
    }
    println!(
        "🎉 传输完成: 成功 {} 个，失败 {} 个",
        total.succeeded, total.failed
    );
    for key in &total.failed_keys {
        println!("   ❌ {}", key);
    }
    total
}
