// 内核外部控制器 HTTP 客户端
//
// PATCH /configs 更新 tun 段，POST /restart 重启内核

use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

use super::CoreError;
use crate::atoms::TunConfigPatch;

pub struct ControllerClient {
    http: Client,
    base_url: Url,
    secret: Option<String>,
}

impl ControllerClient {
    // external-controller 可以不带协议头（127.0.0.1:9090）
    pub fn new(controller: &str, secret: Option<String>) -> Result<Self, CoreError> {
        let base_url = normalize_controller_url(controller)?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .no_proxy()
            .build()
            .map_err(|e| CoreError::Unavailable(format!("HTTP 客户端初始化失败：{}", e)))?;

        log::debug!("内核控制器地址：{}", base_url);

        Ok(Self {
            http,
            base_url,
            secret: secret.filter(|s| !s.is_empty()),
        })
    }

    pub async fn patch_configs(&self, patch: &TunConfigPatch) -> Result<(), CoreError> {
        let endpoint = self.endpoint("configs")?;
        log::debug!("PATCH {}", endpoint);

        let request = self.authorize(self.http.patch(endpoint).json(patch));
        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Unavailable(format!("发送配置补丁失败：{}", e)))?;

        check_response(response).await
    }

    pub async fn restart(&self) -> Result<(), CoreError> {
        let endpoint = self.endpoint("restart")?;
        log::debug!("POST {}", endpoint);

        let request = self.authorize(self.http.post(endpoint).json(&serde_json::json!({})));
        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Unavailable(format!("发送重启请求失败：{}", e)))?;

        check_response(response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, CoreError> {
        self.base_url
            .join(path)
            .map_err(|e| CoreError::Unavailable(format!("无效的控制器路径 {}：{}", path, e)))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.secret {
            Some(secret) => builder.bearer_auth(secret),
            None => builder,
        }
    }
}

fn normalize_controller_url(controller: &str) -> Result<Url, CoreError> {
    let trimmed = controller.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Unavailable("未配置外部控制器地址".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| CoreError::Unavailable(format!("无效的外部控制器地址 {}：{}", trimmed, e)))?;

    // join 以最后一个 '/' 为基准
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

async fn check_response(response: reqwest::Response) -> Result<(), CoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(status, &body);

    if status.is_client_error() && status != StatusCode::UNAUTHORIZED {
        Err(CoreError::Rejected(message))
    } else {
        Err(CoreError::Unavailable(message))
    }
}

// 内核错误响应格式：{"message": "..."}
fn extract_error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));

    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() => format!("HTTP {}: {}", status.as_u16(), body.trim()),
        None => format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ),
    }
}
