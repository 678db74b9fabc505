// 内核提权分子模块

pub mod listeners;
pub mod orchestrator;
pub mod signals;

pub use orchestrator::{
    ElevationState, GrantOutcome, Notice, Notifier, PrivilegeError, PrivilegeOrchestrator,
};
pub use signals::{
    CancelCorePassword, ConfirmCorePassword, CorePermissionResult, CorePermissionState,
    GrantCorePermission, ResetFirewall, SignalNotifier, TunNotice,
};

use std::sync::Arc;

use crate::molecules::tun_session::SessionSlot;

pub fn init_listeners(slot: Arc<SessionSlot>) {
    listeners::init(slot);
}
