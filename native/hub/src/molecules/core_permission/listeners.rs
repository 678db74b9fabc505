// 内核提权信号监听

use rinf::{DartSignal, RustSignal};
use std::sync::Arc;
use tokio::spawn;

use super::orchestrator::{ElevationState, GrantOutcome};
use super::signals::{
    CancelCorePassword, ConfirmCorePassword, CorePermissionResult, CorePermissionState,
    GrantCorePermission, ResetFirewall,
};
use crate::atoms::ElevationStrategy;
use crate::molecules::tun_session::{SESSION_MISSING, SessionSlot};

pub fn init(slot: Arc<SessionSlot>) {
    listen_grant(slot.clone());
    listen_confirm_password(slot.clone());
    listen_cancel_password(slot.clone());
    listen_reset_firewall(slot);
}

fn listen_grant(slot: Arc<SessionSlot>) {
    spawn(async move {
        let receiver = GrantCorePermission::get_dart_signal_receiver();
        while receiver.recv().await.is_some() {
            let Some(session) = slot.session() else {
                send_missing_session();
                continue;
            };

            spawn(async move {
                let privilege = session.privilege();
                // 系统弹窗授权期间按钮显示 loading
                if privilege.strategy() == ElevationStrategy::DirectGrant
                    && privilege.state() == ElevationState::Idle
                {
                    CorePermissionState::new(ElevationState::Granting).send_signal_to_dart();
                }

                match privilege.request_grant().await {
                    Ok(GrantOutcome::PasswordRequired) => {}
                    Ok(GrantOutcome::Granted) => {
                        CorePermissionResult::from(Ok(())).send_signal_to_dart();
                    }
                    Err(e) => CorePermissionResult::from(Err(e)).send_signal_to_dart(),
                }
                CorePermissionState::new(privilege.state()).send_signal_to_dart();
            });
        }
    });
}

fn listen_confirm_password(slot: Arc<SessionSlot>) {
    spawn(async move {
        let receiver = ConfirmCorePassword::get_dart_signal_receiver();
        while let Some(dart_signal) = receiver.recv().await {
            let Some(session) = slot.session() else {
                send_missing_session();
                continue;
            };
            let password = dart_signal.message.password;

            spawn(async move {
                let privilege = session.privilege();
                if privilege.state() == ElevationState::AwaitingPassword {
                    CorePermissionState::new(ElevationState::Granting).send_signal_to_dart();
                }
                let result = privilege.confirm_password(password).await;
                CorePermissionResult::from(result).send_signal_to_dart();
                CorePermissionState::new(privilege.state()).send_signal_to_dart();
            });
        }
    });
}

fn listen_cancel_password(slot: Arc<SessionSlot>) {
    spawn(async move {
        let receiver = CancelCorePassword::get_dart_signal_receiver();
        while receiver.recv().await.is_some() {
            if let Some(session) = slot.session() {
                session.privilege().cancel_password();
                CorePermissionState::new(session.privilege().state()).send_signal_to_dart();
            }
        }
    });
}

fn listen_reset_firewall(slot: Arc<SessionSlot>) {
    spawn(async move {
        let receiver = ResetFirewall::get_dart_signal_receiver();
        while receiver.recv().await.is_some() {
            let Some(session) = slot.session() else {
                send_missing_session();
                continue;
            };

            spawn(async move {
                let privilege = session.privilege();
                if privilege.state() == ElevationState::Idle {
                    CorePermissionState::new(ElevationState::ResettingFirewall)
                        .send_signal_to_dart();
                }
                let result = privilege.reset_firewall().await;
                CorePermissionResult::from(result).send_signal_to_dart();
                CorePermissionState::new(privilege.state()).send_signal_to_dart();
            });
        }
    });
}

fn send_missing_session() {
    CorePermissionResult {
        is_successful: false,
        error_message: Some(SESSION_MISSING.to_string()),
    }
    .send_signal_to_dart();
}
