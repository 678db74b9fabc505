// 提交协调器：发送配置补丁并重启内核，两步视为一次逻辑操作
//
// 补丁失败时不会重启；重启失败时补丁已生效且不回滚。
// 同一时间只允许一个提交或重启在进行中。

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use super::config_store::ConfigStore;
use super::pending_edit::PendingEdit;
use crate::atoms::{TunConfig, TunConfigPatch, ValidationError};
use crate::molecules::core_control::{CoreControl, CoreError};

pub const DEFAULT_PATCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RESTART_TIMEOUT: Duration = Duration::from_secs(30);

// 补丁内容：整段替换或只发送变化字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchMode {
    #[default]
    Full,
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("内核拒绝了配置：{0}")]
    PatchRejected(String),
    #[error("无法连接内核：{0}")]
    EngineUnavailable(String),
    #[error("内核重启失败：{0}")]
    RestartFailed(String),
    #[error("上一次提交仍在进行中")]
    Busy,
    #[error("内核已接受配置，但保存失败：{0}")]
    Persist(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied(TunConfig),
    // 最小补丁为空，未调用内核
    Unchanged,
}

pub struct CommitCoordinator {
    core: Arc<dyn CoreControl>,
    patch_mode: PatchMode,
    patch_timeout: Duration,
    restart_timeout: Duration,
    // 单许可信号量：提交与重启互斥
    in_flight: Semaphore,
}

impl CommitCoordinator {
    pub fn new(core: Arc<dyn CoreControl>, patch_mode: PatchMode) -> Self {
        Self {
            core,
            patch_mode,
            patch_timeout: DEFAULT_PATCH_TIMEOUT,
            restart_timeout: DEFAULT_RESTART_TIMEOUT,
            in_flight: Semaphore::new(1),
        }
    }

    pub fn with_timeouts(mut self, patch_timeout: Duration, restart_timeout: Duration) -> Self {
        self.patch_timeout = patch_timeout;
        self.restart_timeout = restart_timeout;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    // 校验 → 补丁 → 记录快照 → 重启
    pub async fn commit(
        &self,
        store: &Mutex<ConfigStore>,
        pending: &PendingEdit,
    ) -> Result<CommitOutcome, CommitError> {
        let next = pending.validate()?;

        let _permit = self.in_flight.try_acquire().map_err(|_| {
            log::warn!("已有提交在进行中，拒绝新的提交");
            CommitError::Busy
        })?;

        let committed = lock_store(store).load();
        let patch = match self.patch_mode {
            PatchMode::Full => TunConfigPatch::full(&next),
            PatchMode::Minimal => ConfigStore::diff(&next, &committed),
        };

        if patch.is_empty() {
            log::info!("TUN 配置无变化，跳过提交");
            return Ok(CommitOutcome::Unchanged);
        }

        log::info!(
            "提交 TUN 配置：device={}, stack={}, mtu={}",
            next.device,
            next.stack.as_wire(),
            next.mtu
        );

        match timeout(self.patch_timeout, self.core.patch_config(&patch)).await {
            Ok(Ok(())) => log::debug!("配置补丁已被内核接受"),
            Ok(Err(CoreError::Rejected(message))) => {
                log::error!("内核拒绝配置补丁：{}", message);
                return Err(CommitError::PatchRejected(message));
            }
            Ok(Err(e)) => {
                log::error!("发送配置补丁失败：{}", e);
                return Err(CommitError::EngineUnavailable(e.to_string()));
            }
            Err(_) => {
                log::error!("发送配置补丁超时（{} 秒）", self.patch_timeout.as_secs());
                return Err(CommitError::EngineUnavailable(format!(
                    "请求超时（{} 秒）",
                    self.patch_timeout.as_secs()
                )));
            }
        }

        // 补丁已生效就必须重启；落盘失败时快照保持旧值，重启后另行报告
        let persisted = lock_store(store).record_commit(next.clone());
        self.restart_locked().await?;

        match persisted {
            Ok(()) => Ok(CommitOutcome::Applied(next)),
            Err(e) => {
                log::error!("保存 TUN 配置失败：{:#}", e);
                Err(CommitError::Persist(format!("{:#}", e)))
            }
        }
    }

    // 仅重启，用于提权成功之后
    pub async fn restart(&self) -> Result<(), CommitError> {
        let _permit = self.in_flight.try_acquire().map_err(|_| {
            log::warn!("已有提交在进行中，拒绝重启");
            CommitError::Busy
        })?;
        self.restart_locked().await
    }

    async fn restart_locked(&self) -> Result<(), CommitError> {
        log::info!("重启内核");
        match timeout(self.restart_timeout, self.core.restart_core()).await {
            Ok(Ok(())) => {
                log::info!("内核重启完成");
                Ok(())
            }
            Ok(Err(e)) => {
                log::error!("内核重启失败：{}", e);
                Err(CommitError::RestartFailed(e.to_string()))
            }
            Err(_) => {
                log::error!("内核重启超时（{} 秒）", self.restart_timeout.as_secs());
                Err(CommitError::RestartFailed(format!(
                    "重启超时（{} 秒）",
                    self.restart_timeout.as_secs()
                )))
            }
        }
    }
}

fn lock_store(store: &Mutex<ConfigStore>) -> std::sync::MutexGuard<'_, ConfigStore> {
    store.lock().unwrap_or_else(|e| {
        log::warn!("ConfigStore 锁中毒，正在恢复");
        e.into_inner()
    })
}
