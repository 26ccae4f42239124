use crate::sync::config::TransferConfig;
use crate::sync::provider::{
    self, extract_keys, extract_tag, truncate, ListPage, Provider, PAGE_SIZE,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use sha1::Sha1;
use std::fs;
use std::path::Path;
use std::time::Duration;

type HmacSha1 = Hmac<Sha1>;

/// 阿里云 OSS 后端
pub struct AliyunOss {
    client: Client,
    host: String,
    bucket: String,
    secret_id: String,
    secret_key: String,
}

impl AliyunOss {
    pub fn new(cfg: &TransferConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.osd.timeout))
            .build()
            .context("初始化 OSS 客户端失败")?;
        Ok(Self {
            client,
            host: format!("{}.oss-{}.aliyuncs.com", cfg.osd.bucket, cfg.osd.region),
            bucket: cfg.osd.bucket.clone(),
            secret_id: cfg.osd.secret_id.clone(),
            secret_key: cfg.osd.secret_key.clone(),
        })
    }

    /// Date 头签名："OSS AccessKeyId:base64(hmac-sha1(验签串))"
    fn sign(&self, method: &Method, key: &str, date: &str) -> String {
        let resource = format!("/{}/{}", self.bucket, key);
        let string_to_sign = format!("{}\n\n\n{}\n{}", method.as_str(), date, resource);

        let mut mac =
            HmacSha1::new_from_slice(self.secret_key.as_bytes()).expect("HMAC 密钥长度不受限");
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        format!("OSS {}:{}", self.secret_id, signature)
    }

    /// 发起一次签名请求，传输层错误立即原地重试一次（OSS 自带的请求级重试节奏）
    async fn request(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, String)],
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let mut url = format!("https://{}/{}", self.host, provider::encode_key(key));
        if !query.is_empty() {
            let qs = query
                .iter()
                .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url = format!("{}?{}", url, qs);
        }

        let mut retried = false;
        loop {
            let date = chrono::Utc::now()
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string();
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("Date", &date)
                .header("Authorization", self.sign(&method, key, &date));
            if let Some(body) = &body {
                request = request.body(body.clone());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(_) if !retried => {
                    retried = true;
                    continue;
                }
                Err(err) => return Err(err).context("OSS 请求失败"),
            };

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                bail!("OSS 返回错误状态 {}: {}", status, truncate(&detail));
            }
            return Ok(response);
        }
    }

    /// 拉取一页对象列表
    async fn list_page(&self, prefix: &str, marker: &str) -> Result<ListPage> {
        let query: [(&str, String); 3] = [
            ("prefix", prefix.to_string()),
            ("marker", marker.to_string()),
            ("max-keys", PAGE_SIZE.to_string()),
        ];
        let response = self.request(Method::GET, "", &query, None).await?;
        let xml = response.text().await.context("读取 OSS 列表响应失败")?;

        Ok(ListPage {
            keys: extract_keys(&xml),
            next_marker: extract_tag(&xml, "NextMarker").unwrap_or_default(),
            is_truncated: extract_tag(&xml, "IsTruncated").as_deref() == Some("true"),
        })
    }
}

#[async_trait]
impl Provider for AliyunOss {
    async fn put_file(&self, key: &str, filepath: &Path) -> Result<()> {
        let body = fs::read(filepath)
            .with_context(|| format!("读取本地文件失败: {}", filepath.display()))?;
        self.request(Method::PUT, key, &[], Some(body)).await?;
        Ok(())
    }

    async fn get_file(&self, key: &str, filepath: &Path) -> Result<()> {
        let response = self.request(Method::GET, key, &[], None).await?;
        let bytes = response.bytes().await.context("读取 OSS 对象内容失败")?;
        fs::write(filepath, &bytes)
            .with_context(|| format!("写入本地文件失败: {}", filepath.display()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str, marker: &str) -> Vec<String> {
        let prefix = prefix.trim_start_matches('/');
        provider::list_all_pages(marker, |m| async move { self.list_page(prefix, &m).await })
            .await
    }
}
