// TUN 设置页与 Dart 层之间的消息

use rinf::{DartSignal, RustSignal};
use serde::{Deserialize, Serialize};

use super::commit::{CommitError, CommitOutcome};
use super::pending_edit::{PartialTunConfig, PendingEdit};
use crate::atoms::{ControlId, TunStack, ValidationError};

// Dart → Rust：建立会话（路径为空时使用应用默认位置）
#[derive(Clone, Deserialize, DartSignal)]
pub struct ConfigureTunSession {
    pub external_controller: String,
    pub secret: Option<String>,
    pub core_path: Option<String>,
    pub config_path: Option<String>,
    // Dart 侧 Platform.operatingSystem，为空时按编译目标判断
    pub platform: Option<String>,
    // full 或 minimal
    pub patch_mode: Option<String>,
    pub patch_timeout_secs: Option<u64>,
    pub restart_timeout_secs: Option<u64>,
    pub elevation_timeout_secs: Option<u64>,
}

// Dart → Rust：进入设置页
#[derive(Deserialize, DartSignal)]
pub struct OpenTunSettings;

// Dart → Rust：单次编辑，未设置的字段保持原值
#[derive(Debug, Clone, Default, Deserialize, DartSignal)]
pub struct EditTunSettings {
    pub device: Option<String>,
    // gvisor / mixed / system
    pub stack: Option<String>,
    pub auto_route: Option<bool>,
    pub auto_redirect: Option<bool>,
    pub auto_detect_interface: Option<bool>,
    pub strict_route: Option<bool>,
    // 输入框原文
    pub mtu: Option<String>,
    // 逗号分隔
    pub dns_hijack: Option<String>,
}

impl EditTunSettings {
    pub fn into_partial(self) -> Result<PartialTunConfig, ValidationError> {
        let stack = match self.stack {
            Some(value) => Some(
                TunStack::from_wire(&value).ok_or(ValidationError::UnknownStack(value))?,
            ),
            None => None,
        };

        Ok(PartialTunConfig {
            device: self.device,
            stack,
            auto_route: self.auto_route,
            auto_redirect: self.auto_redirect,
            auto_detect_interface: self.auto_detect_interface,
            strict_route: self.strict_route,
            mtu: self.mtu,
            dns_hijack: self.dns_hijack,
        })
    }
}

// Dart → Rust：保存
#[derive(Deserialize, DartSignal)]
pub struct SaveTunSettings;

// Dart → Rust：离开设置页，丢弃未保存的编辑
#[derive(Deserialize, DartSignal)]
pub struct CloseTunSettings;

// Rust → Dart：设置页当前状态
#[derive(Debug, Clone, Serialize, RustSignal)]
pub struct TunSettingsSnapshot {
    pub platform: String,
    pub device: String,
    pub stack: String,
    pub auto_route: bool,
    pub auto_redirect: bool,
    pub auto_detect_interface: bool,
    pub strict_route: bool,
    pub mtu_text: String,
    pub is_mtu_valid: bool,
    pub dns_hijack: Vec<String>,
    pub dns_hijack_text: String,
    // 当前平台可显示的可选控件
    pub controls: Vec<String>,
    pub permission_state: String,
    pub is_busy: bool,
    pub has_changes: bool,
}

impl TunSettingsSnapshot {
    pub fn new<'a>(
        platform: &str,
        pending: &PendingEdit,
        has_changes: bool,
        controls: impl IntoIterator<Item = &'a ControlId>,
        permission_state: &str,
        is_busy: bool,
    ) -> Self {
        let values = pending.values();
        Self {
            platform: platform.to_string(),
            device: values.device.clone(),
            stack: values.stack.as_wire().to_string(),
            auto_route: values.auto_route,
            auto_redirect: values.auto_redirect,
            auto_detect_interface: values.auto_detect_interface,
            strict_route: values.strict_route,
            mtu_text: pending.mtu_text(),
            is_mtu_valid: pending.invalid_mtu().is_none(),
            dns_hijack: values.dns_hijack.clone(),
            dns_hijack_text: pending.dns_hijack_text(),
            controls: controls
                .into_iter()
                .map(|control| control.as_str().to_string())
                .collect(),
            permission_state: permission_state.to_string(),
            is_busy,
            has_changes,
        }
    }
}

// Rust → Dart：保存结果
#[derive(Debug, Clone, Serialize, RustSignal)]
pub struct TunSettingsSaveResult {
    pub is_successful: bool,
    pub is_unchanged: bool,
    pub error_message: Option<String>,
}

impl From<&Result<CommitOutcome, CommitError>> for TunSettingsSaveResult {
    fn from(result: &Result<CommitOutcome, CommitError>) -> Self {
        match result {
            Ok(outcome) => Self {
                is_successful: true,
                is_unchanged: *outcome == CommitOutcome::Unchanged,
                error_message: None,
            },
            Err(e) => Self {
                is_successful: false,
                is_unchanged: false,
                error_message: Some(e.to_string()),
            },
        }
    }
}
