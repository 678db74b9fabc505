// 测试用内核：记录调用顺序，可注入失败、延迟与阻塞

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use super::{CoreControl, CoreError};
use crate::atoms::{ElevationStrategy, TunConfigPatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCall {
    Patch(TunConfigPatch),
    Restart,
    Grant(ElevationStrategy, Option<String>),
    Firewall,
}

#[derive(Default)]
pub struct FakeCore {
    calls: Mutex<Vec<CoreCall>>,
    pub patch_error: Mutex<Option<CoreError>>,
    pub restart_error: Mutex<Option<CoreError>>,
    pub grant_error: Mutex<Option<CoreError>>,
    pub firewall_error: Mutex<Option<CoreError>>,
    pub restart_delay: Mutex<Option<Duration>>,
    pub patch_delay: Mutex<Option<Duration>>,
    // 设置后授权调用会一直等到 notify
    pub grant_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeCore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<CoreCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn fail_patch(&self, error: CoreError) {
        *self.patch_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    pub fn fail_restart(&self, error: CoreError) {
        *self.restart_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    pub fn fail_grant(&self, error: CoreError) {
        *self.grant_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    pub fn fail_firewall(&self, error: CoreError) {
        *self.firewall_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    pub fn delay_restart(&self, delay: Duration) {
        *self.restart_delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn delay_patch(&self, delay: Duration) {
        *self.patch_delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn gate_grant(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.grant_gate.lock().unwrap_or_else(|e| e.into_inner()) = Some(gate.clone());
        gate
    }

    fn record(&self, call: CoreCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    fn configured(slot: &Mutex<Option<CoreError>>) -> Option<CoreError> {
        slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn delay(slot: &Mutex<Option<Duration>>) -> Option<Duration> {
        *slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CoreControl for FakeCore {
    async fn patch_config(&self, patch: &TunConfigPatch) -> Result<(), CoreError> {
        self.record(CoreCall::Patch(patch.clone()));
        if let Some(delay) = Self::delay(&self.patch_delay) {
            tokio::time::sleep(delay).await;
        }
        match Self::configured(&self.patch_error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn restart_core(&self) -> Result<(), CoreError> {
        self.record(CoreCall::Restart);
        if let Some(delay) = Self::delay(&self.restart_delay) {
            tokio::time::sleep(delay).await;
        }
        match Self::configured(&self.restart_error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn grant_permission(
        &self,
        strategy: ElevationStrategy,
        secret: Option<&str>,
    ) -> Result<(), CoreError> {
        self.record(CoreCall::Grant(strategy, secret.map(str::to_string)));
        let gate = self
            .grant_gate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match Self::configured(&self.grant_error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn setup_firewall(&self) -> Result<(), CoreError> {
        self.record(CoreCall::Firewall);
        match Self::configured(&self.firewall_error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
