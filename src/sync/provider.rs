use crate::sync::config::TransferConfig;
use crate::sync::provider_cos::QcloudCos;
use crate::sync::provider_oss::AliyunOss;
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const COS: &str = "cos";
pub const OSS: &str = "oss";

/// 单页拉取的最大对象数
pub const PAGE_SIZE: u32 = 10;
/// 连续失败重试上限
const LIST_MAX_RETRY: u32 = 3;
/// 重试间隔
const LIST_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// 对象存储的统一抽象，屏蔽各家认证、分页游标和编码差异
#[async_trait]
pub trait Provider: Send + Sync {
    /// 上传本地文件到 key
    async fn put_file(&self, key: &str, filepath: &Path) -> Result<()>;
    /// 下载 key 到本地文件
    async fn get_file(&self, key: &str, filepath: &Path) -> Result<()>;
    /// 枚举前缀下的全部对象键，结果一次性给全
    async fn list(&self, prefix: &str, marker: &str) -> Vec<String>;
}

/// 按配置的存储类型实例化 Provider
pub fn new_provider(cfg: &TransferConfig) -> Result<Arc<dyn Provider>> {
    match cfg.storage.to_lowercase().as_str() {
        COS => Ok(Arc::new(QcloudCos::new(cfg)?)),
        OSS => Ok(Arc::new(AliyunOss::new(cfg)?)),
        other => anyhow::bail!("不支持的存储类型: '{}'", other),
    }
}

/// 一页对象列表
pub struct ListPage {
    pub keys: Vec<String>,
    pub next_marker: String,
    pub is_truncated: bool,
}

/// 逐页拉取对象列表，marker 推进由各后端的单页请求提供。
/// 单页失败时等待1秒重试，连续失败超过3次则放弃，
/// 返回已累积的部分结果（调用方不能把短列表当作对象不存在）。
pub async fn list_all_pages<F, Fut>(marker: &str, mut fetch: F) -> Vec<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<ListPage>>,
{
    let mut list: Vec<String> = Vec::new();
    let mut marker = marker.to_string();
    let mut retry = 0u32;
    loop {
        match fetch(marker.clone()).await {
            Ok(page) => {
                list.extend(page.keys);
                // 拉取成功，重置重试计数
                retry = 0;
                marker = page.next_marker;
                if !page.is_truncated {
                    return list;
                }
            }
            Err(err) => {
                if retry < LIST_MAX_RETRY {
                    retry += 1;
                    tokio::time::sleep(LIST_RETRY_INTERVAL).await;
                    continue;
                }
                eprintln!("⚠️  拉取对象列表失败: {}，返回已获取的部分", err);
                return list;
            }
        }
    }
}

/// 提取 XML 响应中第一个指定标签的文本
pub(crate) fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"<{}[^>]*>([^<]*)</{}>", tag, tag);
    let re = Regex::new(&pattern).ok()?;
    let text = re.captures(xml)?.get(1)?.as_str().trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// 提取列表响应中的全部对象键
pub(crate) fn extract_keys(xml: &str) -> Vec<String> {
    let re = match Regex::new(r"<Key>([^<]*)</Key>") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    re.captures_iter(xml)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 截断错误响应正文，避免整段 XML 刷屏
pub(crate) fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((i, _)) => &body[..i],
        None => body,
    }
}

/// 对象键按路径段做百分号编码，保留"/"
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_list_retry_cap() {
        // 每页都失败：首次请求 + 3次重试后放弃，返回空列表
        let calls = AtomicU32::new(0);
        let list = list_all_pages("", |_marker| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { anyhow::bail!("timeout") }
        })
        .await;
        assert!(list.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_partial_result_on_midway_failure() {
        // 第一页成功后持续失败，应返回第一页内容且重试计数从头算
        let calls = AtomicU32::new(0);
        let list = list_all_pages("", |marker| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    assert_eq!(marker, "");
                    Ok(ListPage {
                        keys: vec!["a/1.txt".to_string(), "a/2.txt".to_string()],
                        next_marker: "a/2.txt".to_string(),
                        is_truncated: true,
                    })
                } else {
                    assert_eq!(marker, "a/2.txt");
                    anyhow::bail!("timeout")
                }
            }
        })
        .await;
        assert_eq!(list, vec!["a/1.txt", "a/2.txt"]);
        // 1次成功 + 1次失败 + 3次重试
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_list_walks_all_pages() {
        let list = list_all_pages("", |marker| async move {
            if marker.is_empty() {
                Ok(ListPage {
                    keys: vec!["x".to_string()],
                    next_marker: "x".to_string(),
                    is_truncated: true,
                })
            } else {
                Ok(ListPage {
                    keys: vec!["y".to_string()],
                    next_marker: String::new(),
                    is_truncated: false,
                })
            }
        })
        .await;
        assert_eq!(list, vec!["x", "y"]);
    }

    #[test]
    fn test_extract_tag_and_keys() {
        let xml = r#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <NextMarker>docs/b.txt</NextMarker>
            <Contents><Key>docs/a.txt</Key><Size>10</Size></Contents>
            <Contents><Key>docs/b.txt</Key><Size>20</Size></Contents>
        </ListBucketResult>"#;
        assert_eq!(extract_tag(xml, "IsTruncated").as_deref(), Some("true"));
        assert_eq!(extract_tag(xml, "NextMarker").as_deref(), Some("docs/b.txt"));
        assert_eq!(extract_tag(xml, "Missing"), None);
        assert_eq!(extract_keys(xml), vec!["docs/a.txt", "docs/b.txt"]);
    }

    #[test]
    fn test_encode_key_keeps_slashes() {
        assert_eq!(encode_key("docs/a b/c#1.txt"), "docs/a%20b/c%231.txt");
    }

    #[test]
    fn test_truncate_caps_long_bodies() {
        let short = "<Error>NoSuchKey</Error>";
        assert_eq!(truncate(short), short);

        let long = "x".repeat(500);
        assert_eq!(truncate(&long).len(), 200);

        // 多字节字符不会被截在字符中间
        let cn = "错".repeat(300);
        let cut = truncate(&cn);
        assert_eq!(cut.chars().count(), 200);
    }
}
