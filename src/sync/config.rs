use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 同步配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    pub storage: String,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub osd: OsdConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub list: Vec<SyncPair>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default)]
    pub list: Vec<SyncPair>,
}

/// 一条 本地目录 <-> 云端前缀 的同步配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPair {
    pub source: String,
    pub dest: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsdConfig {
    #[serde(default)]
    pub secret_id: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    60
}

impl TransferConfig {
    /// 加载配置文件，并把路径中的"~"替换为用户目录
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let mut cfg: TransferConfig =
            serde_yaml::from_str(&raw).context("解析配置文件失败，请检查 YAML 格式")?;

        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy().to_string();
            for pair in &mut cfg.upload.list {
                if pair.source.starts_with('~') {
                    pair.source = pair.source.replacen('~', &home, 1);
                }
            }
            for pair in &mut cfg.download.list {
                if pair.dest.starts_with('~') {
                    pair.dest = pair.dest.replacen('~', &home, 1);
                }
            }
        }
        Ok(cfg)
    }

    /// 生成模版配置内容
    pub fn template() -> String {
        let demo = TransferConfig {
            storage: String::new(),
            upload: UploadConfig {
                list: vec![SyncPair::default()],
                ignore: vec![".git".to_string(), ".idea".to_string()],
            },
            download: DownloadConfig {
                list: vec![SyncPair::default()],
            },
            osd: OsdConfig::default(),
        };
        // 默认配置序列化不会失败
        serde_yaml::to_string(&demo).unwrap_or_default()
    }
}

/// 按模版初始化配置文件，已存在时先备份为 .bak
pub fn write_template(path: &Path) -> Result<()> {
    if path.exists() {
        let backup = format!("{}.bak", path.display());
        fs::rename(path, &backup)
            .with_context(|| format!("备份原有配置失败: {}", backup))?;
    }
    fs::write(path, TransferConfig::template())
        .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
    println!("✅ 配置文件初始化完成，请查看 {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_template_parses_back() {
        let cfg: TransferConfig = serde_yaml::from_str(&TransferConfig::template()).unwrap();
        assert_eq!(cfg.upload.ignore, vec![".git", ".idea"]);
        assert_eq!(cfg.upload.list.len(), 1);
        assert_eq!(cfg.download.list.len(), 1);
    }

    #[test]
    fn test_load_expands_tilde() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"storage: cos
upload:
  list:
    - source: ~/docs
      dest: /backup/docs
  ignore: []
download:
  list:
    - source: /backup/docs
      dest: ~/restore
osd:
  secret_id: id
  secret_key: key
  bucket: demo-125000000
  region: ap-guangzhou
  timeout: 30
"#
        )
        .unwrap();

        let cfg = TransferConfig::load(&path).unwrap();
        let home = dirs::home_dir().unwrap().to_string_lossy().to_string();
        // 只有 upload.source 和 download.dest 会展开
        assert_eq!(cfg.upload.list[0].source, format!("{}/docs", home));
        assert_eq!(cfg.upload.list[0].dest, "/backup/docs");
        assert_eq!(cfg.download.list[0].source, "/backup/docs");
        assert_eq!(cfg.download.list[0].dest, format!("{}/restore", home));
        assert_eq!(cfg.osd.timeout, 30);
    }

    #[test]
    fn test_write_template_backs_up_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "storage: oss\n").unwrap();

        write_template(&path).unwrap();

        let backup = dir.path().join("config.yaml.bak");
        assert_eq!(fs::read_to_string(backup).unwrap(), "storage: oss\n");
        let cfg: TransferConfig =
            serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(cfg.storage.is_empty());
    }
}
