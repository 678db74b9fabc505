// 内核控制分子模块
//
// 对外部内核进程的四个调用：配置补丁、重启、授权、重设防火墙

pub mod controller_client;
pub mod elevation;
pub mod local_core;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use thiserror::Error;

use crate::atoms::{ElevationStrategy, TunConfigPatch};

pub use controller_client::ControllerClient;
pub use local_core::LocalCore;

// 外部协作方调用失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // 内核拒绝了请求（参数校验失败等）
    #[error("内核拒绝请求：{0}")]
    Rejected(String),
    // 无法连接内核或内核内部错误
    #[error("内核不可用：{0}")]
    Unavailable(String),
    // 系统命令执行失败
    #[error("命令执行失败：{0}")]
    CommandFailed(String),
    // 当前平台不支持该操作
    #[error("当前平台不支持：{0}")]
    Unsupported(String),
}

#[async_trait]
pub trait CoreControl: Send + Sync {
    // 发送 tun 段的部分更新
    async fn patch_config(&self, patch: &TunConfigPatch) -> Result<(), CoreError>;

    // 以当前已提交配置重启内核
    async fn restart_core(&self) -> Result<(), CoreError>;

    // 按会话的提权方式为内核授予网络管理权限，仅密码授权传入 secret
    async fn grant_permission(
        &self,
        strategy: ElevationStrategy,
        secret: Option<&str>,
    ) -> Result<(), CoreError>;

    // 仅 Windows
    async fn setup_firewall(&self) -> Result<(), CoreError>;
}
