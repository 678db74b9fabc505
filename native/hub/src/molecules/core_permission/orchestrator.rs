// 内核提权编排
//
// 按平台策略执行授权或防火墙重设，成功后通知用户并经提交协调器重启内核。
// 状态机保证同一时间只有一个提权流程：
//   Idle → AwaitingPassword → Granting → Idle   （密码授权）
//   Idle → Granting → Idle                      （系统弹窗授权）
//   Idle → ResettingFirewall → Idle             （Windows 防火墙）

use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::atoms::ElevationStrategy;
use crate::molecules::core_control::{CoreControl, CoreError};
use crate::molecules::tun_settings::{CommitCoordinator, CommitError};

pub const DEFAULT_ELEVATION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationState {
    Idle,
    AwaitingPassword,
    Granting,
    ResettingFirewall,
}

impl ElevationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ElevationState::Idle => "idle",
            ElevationState::AwaitingPassword => "awaiting-password",
            ElevationState::Granting => "granting",
            ElevationState::ResettingFirewall => "resetting-firewall",
        }
    }
}

// 提权成功后、重启之前发给用户的通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    CoreAuthorized,
    FirewallReset,
}

impl Notice {
    pub fn message(self) -> &'static str {
        match self {
            Notice::CoreAuthorized => "内核授权成功",
            Notice::FirewallReset => "防火墙重设成功",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrivilegeError {
    #[error("内核授权失败：{0}")]
    GrantFailed(String),
    #[error("防火墙重设失败：{0}")]
    FirewallSetupFailed(String),
    #[error("已有提权操作在进行中")]
    Busy,
    #[error("当前平台不支持该操作")]
    Unsupported,
    #[error("当前没有等待输入的密码")]
    NotAwaitingPassword,
    #[error("操作已成功，但{0}")]
    Restart(CommitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    // 需要打开密码框，随后调用 confirm_password
    PasswordRequired,
    Granted,
}

pub struct PrivilegeOrchestrator {
    strategy: ElevationStrategy,
    core: Arc<dyn CoreControl>,
    commit: Arc<CommitCoordinator>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ElevationState>,
    call_timeout: Duration,
}

// 流程结束（包括 future 被丢弃）时回到 Idle
struct IdleOnDrop<'a> {
    state: &'a Mutex<ElevationState>,
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = ElevationState::Idle;
    }
}

impl PrivilegeOrchestrator {
    pub fn new(
        strategy: ElevationStrategy,
        core: Arc<dyn CoreControl>,
        commit: Arc<CommitCoordinator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            strategy,
            core,
            commit,
            notifier,
            state: Mutex::new(ElevationState::Idle),
            call_timeout: DEFAULT_ELEVATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn strategy(&self) -> ElevationStrategy {
        self.strategy
    }

    pub fn state(&self) -> ElevationState {
        *self.lock_state()
    }

    // 对应按钮的 loading 状态
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state(),
            ElevationState::Granting | ElevationState::ResettingFirewall
        )
    }

    // 点击「手动授权内核」
    pub async fn request_grant(&self) -> Result<GrantOutcome, PrivilegeError> {
        match self.strategy {
            ElevationStrategy::FirewallReset => Err(PrivilegeError::Unsupported),
            ElevationStrategy::PasswordGrant => {
                self.transition(ElevationState::Idle, ElevationState::AwaitingPassword)?;
                log::info!("等待用户输入管理员密码");
                Ok(GrantOutcome::PasswordRequired)
            }
            ElevationStrategy::DirectGrant => {
                self.transition(ElevationState::Idle, ElevationState::Granting)?;
                let _idle = IdleOnDrop { state: &self.state };
                self.run_grant(None).await?;
                Ok(GrantOutcome::Granted)
            }
        }
    }

    // 密码框确认；失败后密码框关闭，需要用户重新触发
    pub async fn confirm_password(&self, secret: String) -> Result<(), PrivilegeError> {
        if self.strategy != ElevationStrategy::PasswordGrant {
            return Err(PrivilegeError::Unsupported);
        }

        {
            let mut state = self.lock_state();
            match *state {
                ElevationState::AwaitingPassword => *state = ElevationState::Granting,
                ElevationState::Idle => return Err(PrivilegeError::NotAwaitingPassword),
                ElevationState::Granting | ElevationState::ResettingFirewall => {
                    return Err(PrivilegeError::Busy);
                }
            }
        }

        let _idle = IdleOnDrop { state: &self.state };
        self.run_grant(Some(secret.as_str())).await
    }

    // 关闭密码框，没有副作用
    pub fn cancel_password(&self) -> bool {
        let mut state = self.lock_state();
        if *state == ElevationState::AwaitingPassword {
            *state = ElevationState::Idle;
            log::info!("用户取消了内核授权");
            true
        } else {
            false
        }
    }

    // 点击「重设防火墙」
    pub async fn reset_firewall(&self) -> Result<(), PrivilegeError> {
        if self.strategy != ElevationStrategy::FirewallReset {
            return Err(PrivilegeError::Unsupported);
        }

        self.transition(ElevationState::Idle, ElevationState::ResettingFirewall)?;
        let _idle = IdleOnDrop { state: &self.state };

        log::info!("开始重设防火墙");
        match timeout(self.call_timeout, self.core.setup_firewall()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("防火墙重设失败：{}", e);
                return Err(PrivilegeError::FirewallSetupFailed(e.to_string()));
            }
            Err(_) => {
                log::error!("防火墙重设超时");
                return Err(PrivilegeError::FirewallSetupFailed(self.timeout_message()));
            }
        }

        self.notify_and_restart(Notice::FirewallReset).await
    }

    async fn run_grant(&self, secret: Option<&str>) -> Result<(), PrivilegeError> {
        log::info!("开始授权内核");
        let grant = self.core.grant_permission(self.strategy, secret);
        match timeout(self.call_timeout, grant).await {
            Ok(Ok(())) => {}
            Ok(Err(CoreError::Unsupported(_))) => return Err(PrivilegeError::Unsupported),
            Ok(Err(e)) => {
                log::error!("内核授权失败：{}", e);
                return Err(PrivilegeError::GrantFailed(e.to_string()));
            }
            Err(_) => {
                log::error!("内核授权超时");
                return Err(PrivilegeError::GrantFailed(self.timeout_message()));
            }
        }

        self.notify_and_restart(Notice::CoreAuthorized).await
    }

    async fn notify_and_restart(&self, notice: Notice) -> Result<(), PrivilegeError> {
        log::info!("{}", notice.message());
        self.notifier.notify(notice);
        self.commit.restart().await.map_err(PrivilegeError::Restart)
    }

    fn transition(&self, from: ElevationState, to: ElevationState) -> Result<(), PrivilegeError> {
        let mut state = self.lock_state();
        if *state != from {
            log::warn!("提权流程进行中（{}），拒绝新的请求", state.as_str());
            return Err(PrivilegeError::Busy);
        }
        *state = to;
        Ok(())
    }

    fn timeout_message(&self) -> String {
        format!("操作超时（{} 秒）", self.call_timeout.as_secs())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ElevationState> {
        self.state.lock().unwrap_or_else(|e| {
            log::warn!("ElevationState 锁中毒，正在恢复");
            e.into_inner()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::molecules::core_control::fake::{CoreCall, FakeCore};
    use crate::molecules::tun_settings::PatchMode;

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<Notice>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }
    }

    struct Harness {
        core: Arc<FakeCore>,
        notifier: Arc<RecordingNotifier>,
        orchestrator: Arc<PrivilegeOrchestrator>,
    }

    fn harness(strategy: ElevationStrategy) -> Harness {
        let core = FakeCore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let commit = Arc::new(CommitCoordinator::new(core.clone(), PatchMode::Full));
        let orchestrator = Arc::new(PrivilegeOrchestrator::new(
            strategy,
            core.clone(),
            commit,
            notifier.clone(),
        ));
        Harness {
            core,
            notifier,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_password_flow_grants_then_restarts() {
        let h = harness(ElevationStrategy::PasswordGrant);

        let outcome = h.orchestrator.request_grant().await.unwrap();
        assert_eq!(outcome, GrantOutcome::PasswordRequired);
        assert_eq!(h.orchestrator.state(), ElevationState::AwaitingPassword);
        assert!(h.core.calls().is_empty());

        h.orchestrator
            .confirm_password("hunter2".to_string())
            .await
            .unwrap();

        assert_eq!(
            h.core.calls(),
            vec![
                CoreCall::Grant(ElevationStrategy::PasswordGrant, Some("hunter2".to_string())),
                CoreCall::Restart
            ]
        );
        assert_eq!(*h.notifier.notices.lock().unwrap(), vec![Notice::CoreAuthorized]);
        assert_eq!(h.orchestrator.state(), ElevationState::Idle);
    }

    #[tokio::test]
    async fn test_password_failure_returns_to_idle_without_retry() {
        let h = harness(ElevationStrategy::PasswordGrant);
        h.core
            .fail_grant(CoreError::CommandFailed("incorrect password".to_string()));

        h.orchestrator.request_grant().await.unwrap();
        let result = h.orchestrator.confirm_password("wrong".to_string()).await;

        assert!(matches!(result, Err(PrivilegeError::GrantFailed(_))));
        assert_eq!(h.orchestrator.state(), ElevationState::Idle);
        assert_eq!(h.core.calls().len(), 1);
        assert!(h.notifier.notices.lock().unwrap().is_empty());

        // 密码框已关闭，再次确认会被拒绝
        assert_eq!(
            h.orchestrator.confirm_password("again".to_string()).await,
            Err(PrivilegeError::NotAwaitingPassword)
        );
    }

    #[tokio::test]
    async fn test_cancel_password_has_no_side_effects() {
        let h = harness(ElevationStrategy::PasswordGrant);

        h.orchestrator.request_grant().await.unwrap();
        assert!(h.orchestrator.cancel_password());
        assert_eq!(h.orchestrator.state(), ElevationState::Idle);
        assert!(h.core.calls().is_empty());
        assert!(!h.orchestrator.cancel_password());
    }

    #[tokio::test]
    async fn test_second_grant_while_granting_is_rejected() {
        let h = harness(ElevationStrategy::PasswordGrant);
        let gate = h.core.gate_grant();

        h.orchestrator.request_grant().await.unwrap();
        let running = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.confirm_password("pw".to_string()).await })
        };

        while h.orchestrator.state() != ElevationState::Granting
            || h.core.calls().is_empty()
        {
            tokio::task::yield_now().await;
        }
        assert!(h.orchestrator.is_busy());
        assert_eq!(
            h.orchestrator.request_grant().await,
            Err(PrivilegeError::Busy)
        );
        assert_eq!(
            h.orchestrator.confirm_password("pw".to_string()).await,
            Err(PrivilegeError::Busy)
        );
        assert!(!h.orchestrator.cancel_password());

        gate.notify_one();
        running.await.unwrap().unwrap();
        assert_eq!(
            h.core
                .calls()
                .iter()
                .filter(|c| matches!(c, CoreCall::Grant(..)))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_direct_grant_has_no_secret() {
        let h = harness(ElevationStrategy::DirectGrant);

        let outcome = h.orchestrator.request_grant().await.unwrap();
        assert_eq!(outcome, GrantOutcome::Granted);
        assert_eq!(
            h.core.calls(),
            vec![
                CoreCall::Grant(ElevationStrategy::DirectGrant, None),
                CoreCall::Restart
            ]
        );
        assert_eq!(
            h.orchestrator.confirm_password("pw".to_string()).await,
            Err(PrivilegeError::Unsupported)
        );
    }

    #[tokio::test]
    async fn test_direct_grant_failure_skips_restart() {
        let h = harness(ElevationStrategy::DirectGrant);
        h.core
            .fail_grant(CoreError::CommandFailed("User canceled.".to_string()));

        let result = h.orchestrator.request_grant().await;
        assert!(matches!(result, Err(PrivilegeError::GrantFailed(_))));
        assert_eq!(
            h.core.calls(),
            vec![CoreCall::Grant(ElevationStrategy::DirectGrant, None)]
        );
        assert_eq!(h.orchestrator.state(), ElevationState::Idle);
    }

    #[tokio::test]
    async fn test_firewall_reset_notifies_then_restarts() {
        let h = harness(ElevationStrategy::FirewallReset);

        h.orchestrator.reset_firewall().await.unwrap();
        assert_eq!(h.core.calls(), vec![CoreCall::Firewall, CoreCall::Restart]);
        assert_eq!(*h.notifier.notices.lock().unwrap(), vec![Notice::FirewallReset]);
        assert!(!h.orchestrator.is_busy());

        assert_eq!(
            h.orchestrator.request_grant().await,
            Err(PrivilegeError::Unsupported)
        );
    }

    #[tokio::test]
    async fn test_firewall_failure_skips_restart() {
        let h = harness(ElevationStrategy::FirewallReset);
        h.core
            .fail_firewall(CoreError::CommandFailed("access denied".to_string()));

        let result = h.orchestrator.reset_firewall().await;
        assert!(matches!(result, Err(PrivilegeError::FirewallSetupFailed(_))));
        assert_eq!(h.core.calls(), vec![CoreCall::Firewall]);
        assert_eq!(h.orchestrator.state(), ElevationState::Idle);
    }

    #[tokio::test]
    async fn test_firewall_only_on_windows_strategy() {
        let h = harness(ElevationStrategy::PasswordGrant);
        assert_eq!(
            h.orchestrator.reset_firewall().await,
            Err(PrivilegeError::Unsupported)
        );
        assert!(h.core.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restart_failure_after_grant_is_distinct() {
        let h = harness(ElevationStrategy::DirectGrant);
        h.core
            .fail_restart(CoreError::Unavailable("core exited".to_string()));

        let result = h.orchestrator.request_grant().await;
        assert!(matches!(
            result,
            Err(PrivilegeError::Restart(CommitError::RestartFailed(_)))
        ));
        // 通知在重启之前已经发出
        assert_eq!(*h.notifier.notices.lock().unwrap(), vec![Notice::CoreAuthorized]);
    }
}
