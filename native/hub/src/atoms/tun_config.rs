// TUN 配置数据模型
//
// 字段名与内核 tun 段保持一致（kebab-case），缺省字段按字段回落到默认值

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TUN_DEVICE: &str = "Mihomo";
pub const DEFAULT_TUN_MTU: u32 = 1500;
pub const DEFAULT_DNS_HIJACK: &str = "any:53";

// TUN 网络栈
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TunStack {
    // 用户态栈，内核中称为 gvisor
    #[serde(rename = "gvisor", alias = "gVisor", alias = "userspace")]
    Userspace,
    #[default]
    #[serde(rename = "mixed", alias = "Mixed")]
    Mixed,
    #[serde(rename = "system", alias = "System")]
    System,
}

impl TunStack {
    pub fn as_wire(self) -> &'static str {
        match self {
            TunStack::Userspace => "gvisor",
            TunStack::Mixed => "mixed",
            TunStack::System => "system",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim() {
            "gvisor" | "gVisor" | "userspace" => Some(TunStack::Userspace),
            "mixed" | "Mixed" => Some(TunStack::Mixed),
            "system" | "System" => Some(TunStack::System),
            _ => None,
        }
    }
}

// 本地校验错误（在任何网络调用之前拒绝）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("网卡名称不能为空")]
    EmptyDevice,
    #[error("MTU 必须是正整数：{0:?}")]
    InvalidMtu(String),
    #[error("未知的网络栈：{0:?}")]
    UnknownStack(String),
}

// 已提交的 TUN 配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TunConfig {
    pub device: String,
    pub stack: TunStack,
    pub auto_route: bool,
    pub auto_redirect: bool,
    pub auto_detect_interface: bool,
    pub strict_route: bool,
    pub mtu: u32,
    pub dns_hijack: Vec<String>,
}

impl Default for TunConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_TUN_DEVICE.to_string(),
            stack: TunStack::Mixed,
            auto_route: true,
            auto_redirect: false,
            auto_detect_interface: true,
            strict_route: false,
            mtu: DEFAULT_TUN_MTU,
            dns_hijack: vec![DEFAULT_DNS_HIJACK.to_string()],
        }
    }
}

impl TunConfig {
    // 提交前的最终校验
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.device.trim().is_empty() {
            return Err(ValidationError::EmptyDevice);
        }
        if self.mtu == 0 {
            return Err(ValidationError::InvalidMtu(self.mtu.to_string()));
        }
        Ok(())
    }
}

// tun 段的部分更新，未设置的字段不会出现在请求体中
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TunFieldsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<TunStack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_route: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_redirect: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_detect_interface: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_route: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_hijack: Option<Vec<String>>,
}

// PATCH /configs 的请求体：{ "tun": { ... } }
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunConfigPatch {
    pub tun: TunFieldsPatch,
}

impl TunConfigPatch {
    // 整段替换：八个字段全部带上
    pub fn full(config: &TunConfig) -> Self {
        Self {
            tun: TunFieldsPatch {
                device: Some(config.device.clone()),
                stack: Some(config.stack),
                auto_route: Some(config.auto_route),
                auto_redirect: Some(config.auto_redirect),
                auto_detect_interface: Some(config.auto_detect_interface),
                strict_route: Some(config.strict_route),
                mtu: Some(config.mtu),
                dns_hijack: Some(config.dns_hijack.clone()),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tun == TunFieldsPatch::default()
    }

    // 把补丁应用到配置上，返回新配置
    #[cfg(test)]
    pub fn apply_to(&self, base: &TunConfig) -> TunConfig {
        let fields = &self.tun;
        TunConfig {
            device: fields.device.clone().unwrap_or_else(|| base.device.clone()),
            stack: fields.stack.unwrap_or(base.stack),
            auto_route: fields.auto_route.unwrap_or(base.auto_route),
            auto_redirect: fields.auto_redirect.unwrap_or(base.auto_redirect),
            auto_detect_interface: fields
                .auto_detect_interface
                .unwrap_or(base.auto_detect_interface),
            strict_route: fields.strict_route.unwrap_or(base.strict_route),
            mtu: fields.mtu.unwrap_or(base.mtu),
            dns_hijack: fields
                .dns_hijack
                .clone()
                .unwrap_or_else(|| base.dns_hijack.clone()),
        }
    }
}

// 解析 MTU 输入框文本，不做截断或默认值回落
pub fn parse_mtu(input: &str) -> Result<u32, ValidationError> {
    let trimmed = input.trim();
    match trimmed.parse::<u32>() {
        Ok(mtu) if mtu > 0 => Ok(mtu),
        _ => Err(ValidationError::InvalidMtu(input.to_string())),
    }
}

// 解析 DNS 劫持输入框文本
//
// 空串得到空列表；按逗号切分后去掉首尾空白，丢弃空项（末尾逗号）与重复项
pub fn parse_dns_hijack(input: &str) -> Vec<String> {
    let mut entries: Vec<String> = Vec::new();
    for part in input.split(',') {
        let entry = part.trim();
        if entry.is_empty() || entries.iter().any(|e| e == entry) {
            continue;
        }
        entries.push(entry.to_string());
    }
    entries
}

// 输入框回显格式
pub fn format_dns_hijack(entries: &[String]) -> String {
    entries.join(",")
}
