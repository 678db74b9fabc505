// 内核授权与防火墙重设的消息

use rinf::{DartSignal, RustSignal};
use serde::{Deserialize, Serialize};

use super::orchestrator::{ElevationState, Notice, Notifier, PrivilegeError};

// Dart → Rust：点击「手动授权内核」
#[derive(Deserialize, DartSignal)]
pub struct GrantCorePermission;

// Dart → Rust：密码框确认
#[derive(Deserialize, DartSignal)]
pub struct ConfirmCorePassword {
    pub password: String,
}

// Dart → Rust：关闭密码框
#[derive(Deserialize, DartSignal)]
pub struct CancelCorePassword;

// Dart → Rust：点击「重设防火墙」（仅 Windows）
#[derive(Deserialize, DartSignal)]
pub struct ResetFirewall;

// Rust → Dart：提权流程状态，awaiting-password 时显示密码框
#[derive(Debug, Clone, Serialize, RustSignal)]
pub struct CorePermissionState {
    pub state: String,
    pub is_busy: bool,
}

impl CorePermissionState {
    pub fn new(state: ElevationState) -> Self {
        Self {
            state: state.as_str().to_string(),
            is_busy: matches!(
                state,
                ElevationState::Granting | ElevationState::ResettingFirewall
            ),
        }
    }
}

// Rust → Dart：提权流程结果
#[derive(Debug, Clone, Serialize, RustSignal)]
pub struct CorePermissionResult {
    pub is_successful: bool,
    pub error_message: Option<String>,
}

impl From<Result<(), PrivilegeError>> for CorePermissionResult {
    fn from(result: Result<(), PrivilegeError>) -> Self {
        match result {
            Ok(()) => Self {
                is_successful: true,
                error_message: None,
            },
            Err(e) => Self {
                is_successful: false,
                error_message: Some(e.to_string()),
            },
        }
    }
}

// Rust → Dart：成功提示
#[derive(Debug, Clone, Serialize, RustSignal)]
pub struct TunNotice {
    pub message: String,
}

// 把提权通知转发给 Dart 层
pub struct SignalNotifier;

impl Notifier for SignalNotifier {
    fn notify(&self, notice: Notice) {
        TunNotice {
            message: notice.message().to_string(),
        }
        .send_signal_to_dart();
    }
}
