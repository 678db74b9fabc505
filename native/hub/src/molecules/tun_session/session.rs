// TUN 设置会话：持有已提交快照、未保存编辑、提交协调器与提权编排
//
// 一个会话对应一次 ConfigureTunSession；锁只在同步代码中持有，不跨 await

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::atoms::{ControlId, Platform, TunConfig, available_controls, elevation_strategy};
use crate::molecules::core_control::{ControllerClient, CoreControl, LocalCore};
use crate::molecules::core_permission::orchestrator::DEFAULT_ELEVATION_TIMEOUT;
use crate::molecules::core_permission::{Notifier, PrivilegeOrchestrator};
use crate::molecules::tun_settings::commit::{DEFAULT_PATCH_TIMEOUT, DEFAULT_RESTART_TIMEOUT};
use crate::molecules::tun_settings::{
    CommitCoordinator, CommitError, CommitOutcome, ConfigStore, ConfigureTunSession,
    PartialTunConfig, PatchMode, PendingEdit, TunSettingsSnapshot,
};
use crate::services::path_service;

const DEFAULT_EXTERNAL_CONTROLLER: &str = "127.0.0.1:9090";

// 会话配置，缺省字段取默认值
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TunSessionOptions {
    pub external_controller: String,
    pub secret: Option<String>,
    // 为空时使用随应用打包的内核
    pub core_path: Option<PathBuf>,
    // 为空时使用应用数据目录下的运行时配置
    pub config_path: Option<PathBuf>,
    pub platform: Option<String>,
    pub patch_mode: PatchMode,
    pub patch_timeout_secs: u64,
    pub restart_timeout_secs: u64,
    pub elevation_timeout_secs: u64,
}

impl Default for TunSessionOptions {
    fn default() -> Self {
        Self {
            external_controller: DEFAULT_EXTERNAL_CONTROLLER.to_string(),
            secret: None,
            core_path: None,
            config_path: None,
            platform: None,
            patch_mode: PatchMode::default(),
            patch_timeout_secs: DEFAULT_PATCH_TIMEOUT.as_secs(),
            restart_timeout_secs: DEFAULT_RESTART_TIMEOUT.as_secs(),
            elevation_timeout_secs: DEFAULT_ELEVATION_TIMEOUT.as_secs(),
        }
    }
}

impl From<ConfigureTunSession> for TunSessionOptions {
    fn from(signal: ConfigureTunSession) -> Self {
        let defaults = Self::default();

        let patch_mode = match signal.patch_mode.as_deref().map(str::trim) {
            None | Some("") => defaults.patch_mode,
            Some(name) => serde_json::from_value(serde_json::Value::String(name.to_lowercase()))
                .unwrap_or_else(|_| {
                    log::warn!("未知的补丁模式：{}，使用默认值", name);
                    defaults.patch_mode
                }),
        };

        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Self {
            external_controller: non_empty(Some(signal.external_controller))
                .unwrap_or(defaults.external_controller),
            secret: non_empty(signal.secret),
            core_path: non_empty(signal.core_path).map(PathBuf::from),
            config_path: non_empty(signal.config_path).map(PathBuf::from),
            platform: non_empty(signal.platform),
            patch_mode,
            patch_timeout_secs: signal
                .patch_timeout_secs
                .unwrap_or(defaults.patch_timeout_secs),
            restart_timeout_secs: signal
                .restart_timeout_secs
                .unwrap_or(defaults.restart_timeout_secs),
            elevation_timeout_secs: signal
                .elevation_timeout_secs
                .unwrap_or(defaults.elevation_timeout_secs),
        }
    }
}

impl TunSessionOptions {
    pub fn platform(&self) -> Platform {
        self.platform
            .as_deref()
            .map(Platform::from_name)
            .unwrap_or_else(Platform::current)
    }
}

pub struct TunSession {
    platform: Platform,
    controls: BTreeSet<ControlId>,
    store: Mutex<ConfigStore>,
    // None 表示设置页未打开
    pending: Mutex<Option<PendingEdit>>,
    commit: Arc<CommitCoordinator>,
    privilege: PrivilegeOrchestrator,
}

impl TunSession {
    // 生产环境：控制器 HTTP + 本地内核二进制 + 受控配置文件
    pub fn from_options(options: TunSessionOptions, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let controller =
            ControllerClient::new(&options.external_controller, options.secret.clone())
                .context("创建控制器客户端失败")?;
        let core_path = options
            .core_path
            .clone()
            .unwrap_or_else(path_service::core_binary);
        let config_path = options
            .config_path
            .clone()
            .unwrap_or_else(path_service::runtime_config);

        log::info!(
            "建立 TUN 会话：controller={}, core={}, config={}",
            options.external_controller,
            core_path.display(),
            config_path.display()
        );

        let store = ConfigStore::open(config_path)?;
        let core = Arc::new(LocalCore::new(controller, core_path));
        Ok(Self::new(&options, store, core, notifier))
    }

    pub fn new(
        options: &TunSessionOptions,
        store: ConfigStore,
        core: Arc<dyn CoreControl>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let platform = options.platform();
        let strategy = elevation_strategy(platform);

        let commit = Arc::new(
            CommitCoordinator::new(core.clone(), options.patch_mode).with_timeouts(
                Duration::from_secs(options.patch_timeout_secs),
                Duration::from_secs(options.restart_timeout_secs),
            ),
        );
        let privilege = PrivilegeOrchestrator::new(strategy, core, commit.clone(), notifier)
            .with_timeout(Duration::from_secs(options.elevation_timeout_secs));

        log::info!(
            "TUN 会话平台：{}，提权方式：{:?}，补丁模式：{:?}",
            platform.as_str(),
            strategy,
            options.patch_mode
        );

        Self {
            platform,
            controls: available_controls(platform),
            store: Mutex::new(store),
            pending: Mutex::new(None),
            commit,
            privilege,
        }
    }

    pub fn controls(&self) -> &BTreeSet<ControlId> {
        &self.controls
    }

    pub fn privilege(&self) -> &PrivilegeOrchestrator {
        &self.privilege
    }

    pub fn committed(&self) -> TunConfig {
        self.lock_store().load()
    }

    // 进入设置页：丢弃旧编辑，从已提交快照重新开始
    pub fn open(&self) -> PendingEdit {
        let fresh = self.lock_store().begin_edit();
        *self.lock_pending() = Some(fresh.clone());
        fresh
    }

    // 未打开设置页时按已提交快照开始
    pub fn edit(&self, partial: PartialTunConfig) -> PendingEdit {
        let base = self.pending_edit();
        let next = ConfigStore::stage(&base, partial);
        *self.lock_pending() = Some(next.clone());
        next
    }

    // 成功后编辑重置为新的已提交快照，失败时保持不变
    // 保存期间又有新编辑时保留新编辑
    pub async fn save(&self) -> Result<CommitOutcome, CommitError> {
        let pending = self.pending_edit();
        let result = self.commit.commit(&self.store, &pending).await;

        if result.is_ok() {
            let fresh = self.lock_store().begin_edit();
            let mut slot = self.lock_pending();
            if slot.as_ref() == Some(&pending) {
                *slot = Some(fresh);
            }
        }
        result
    }

    pub fn close(&self) {
        if self.lock_pending().take().is_some() {
            log::debug!("已丢弃未保存的 TUN 编辑");
        }
    }

    pub fn pending_edit(&self) -> PendingEdit {
        if let Some(pending) = self.lock_pending().as_ref() {
            return pending.clone();
        }
        self.lock_store().begin_edit()
    }

    pub fn is_busy(&self) -> bool {
        self.commit.is_busy() || self.privilege.is_busy()
    }

    pub fn snapshot(&self) -> TunSettingsSnapshot {
        let pending = self.pending_edit();
        let has_changes =
            pending.invalid_mtu().is_some() || *pending.values() != self.committed();

        TunSettingsSnapshot::new(
            self.platform.as_str(),
            &pending,
            has_changes,
            &self.controls,
            self.privilege.state().as_str(),
            self.is_busy(),
        )
    }

    fn lock_store(&self) -> MutexGuard<'_, ConfigStore> {
        self.store.lock().unwrap_or_else(|e| {
            log::warn!("ConfigStore 锁中毒，正在恢复");
            e.into_inner()
        })
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingEdit>> {
        self.pending.lock().unwrap_or_else(|e| {
            log::warn!("PendingEdit 锁中毒，正在恢复");
            e.into_inner()
        })
    }
}
