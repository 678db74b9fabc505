// 平台策略：当前系统可用的可选控件与提权方式

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    // 编译目标对应的平台
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }

    // 兼容 Dart 层与 Node 风格的平台名
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "win32" | "windows" => Platform::Windows,
            "darwin" | "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            _ => Platform::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
            Platform::Other => "other",
        }
    }
}

// 设置页中按平台显示的控件
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlId {
    AutoRedirect,
    FirewallReset,
    ManualGrant,
}

impl ControlId {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlId::AutoRedirect => "auto-redirect",
            ControlId::FirewallReset => "firewall-reset",
            ControlId::ManualGrant => "manual-grant",
        }
    }
}

// 提权方式，在会话开始时选定一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationStrategy {
    // Windows：重设防火墙
    FirewallReset,
    // macOS：由系统弹窗完成授权
    DirectGrant,
    // 其他平台：需要用户输入密码
    PasswordGrant,
}

pub fn available_controls(platform: Platform) -> BTreeSet<ControlId> {
    let mut controls = BTreeSet::new();
    match platform {
        Platform::Windows => {
            controls.insert(ControlId::FirewallReset);
        }
        Platform::Linux => {
            controls.insert(ControlId::AutoRedirect);
            controls.insert(ControlId::ManualGrant);
        }
        Platform::MacOs | Platform::Other => {
            controls.insert(ControlId::ManualGrant);
        }
    }
    controls
}

pub fn elevation_strategy(platform: Platform) -> ElevationStrategy {
    match platform {
        Platform::Windows => ElevationStrategy::FirewallReset,
        Platform::MacOs => ElevationStrategy::DirectGrant,
        Platform::Linux | Platform::Other => ElevationStrategy::PasswordGrant,
    }
}
