use crate::sync::config::TransferConfig;
use crate::sync::provider::{
    self, extract_keys, extract_tag, truncate, ListPage, Provider, PAGE_SIZE,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::Path;
use std::time::Duration;

type HmacSha1 = Hmac<Sha1>;

/// 腾讯云 COS 后端
pub struct QcloudCos {
    client: Client,
    host: String,
    secret_id: String,
    secret_key: String,
}

impl QcloudCos {
    pub fn new(cfg: &TransferConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.osd.timeout))
            .build()
            .context("初始化 COS 客户端失败")?;
        Ok(Self {
            client,
            host: format!("{}.cos.{}.myqcloud.com", cfg.osd.bucket, cfg.osd.region),
            secret_id: cfg.osd.secret_id.clone(),
            secret_key: cfg.osd.secret_key.clone(),
        })
    }

    /// 生成 q-sign-algorithm=sha1 形式的签名串
    /// 先用密钥对有效期签出 SignKey，再对规范化请求串二次签名
    fn sign(&self, method: &Method, path: &str, params: &[(&str, String)]) -> String {
        let now = chrono::Utc::now().timestamp();
        let key_time = format!("{};{}", now, now + 3600);
        let sign_key = hmac_sha1_hex(self.secret_key.as_bytes(), key_time.as_bytes());

        let mut sorted: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_lowercase(), urlencoding::encode(v).into_owned()))
            .collect();
        sorted.sort();
        let param_list = sorted
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let param_string = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let header_list = "host";
        let header_string = format!("host={}", self.host);

        let http_string = format!(
            "{}\n{}\n{}\n{}\n",
            method.as_str().to_lowercase(),
            path,
            param_string,
            header_string
        );
        let string_to_sign = format!("sha1\n{}\n{}\n", key_time, sha1_hex(http_string.as_bytes()));
        let signature = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes());

        format!(
            "q-sign-algorithm=sha1&q-ak={}&q-sign-time={}&q-key-time={}\
             &q-header-list={}&q-url-param-list={}&q-signature={}",
            self.secret_id, key_time, key_time, header_list, param_list, signature
        )
    }

    /// 发起一次签名请求
    async fn request(
        &self,
        method: Method,
        key: &str,
        params: &[(&str, String)],
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let path = format!("/{}", key);
        let authorization = self.sign(&method, &path, params);

        let mut url = format!("https://{}/{}", self.host, provider::encode_key(key));
        if !params.is_empty() {
            let query = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url = format!("{}?{}", url, query);
        }

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", authorization);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.context("COS 请求失败")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("COS 返回错误状态 {}: {}", status, truncate(&detail));
        }
        Ok(response)
    }

    /// 拉取一页对象列表，COS 返回 url 编码的键，解码后再给引擎
    async fn list_page(&self, prefix: &str, marker: &str) -> Result<ListPage> {
        let max_keys = PAGE_SIZE.to_string();
        let params: [(&str, String); 4] = [
            ("prefix", prefix.to_string()),
            ("marker", marker.to_string()),
            ("max-keys", max_keys),
            ("encoding-type", "url".to_string()),
        ];
        let response = self.request(Method::GET, "", &params, None).await?;
        let xml = response.text().await.context("读取 COS 列表响应失败")?;

        let keys = extract_keys(&xml)
            .into_iter()
            .filter_map(|k| urlencoding::decode(&k).map(|s| s.into_owned()).ok())
            .collect();
        let next_marker = extract_tag(&xml, "NextMarker")
            .and_then(|m| urlencoding::decode(&m).map(|s| s.into_owned()).ok())
            .unwrap_or_default();
        let is_truncated = extract_tag(&xml, "IsTruncated").as_deref() == Some("true");
        Ok(ListPage {
            keys,
            next_marker,
            is_truncated,
        })
    }
}

#[async_trait]
impl Provider for QcloudCos {
    async fn put_file(&self, key: &str, filepath: &Path) -> Result<()> {
        let body = fs::read(filepath)
            .with_context(|| format!("读取本地文件失败: {}", filepath.display()))?;
        self.request(Method::PUT, key, &[], Some(body)).await?;
        Ok(())
    }

    async fn get_file(&self, key: &str, filepath: &Path) -> Result<()> {
        let response = self.request(Method::GET, key, &[], None).await?;
        let bytes = response.bytes().await.context("读取 COS 对象内容失败")?;
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

fn hmac_sha1_hex(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC 密钥长度不受限");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}
