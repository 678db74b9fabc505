// TUN 设置页信号监听

use rinf::{DartSignal, RustSignal};
use std::sync::Arc;
use tokio::spawn;

use super::signals::{
    CloseTunSettings, EditTunSettings, OpenTunSettings, SaveTunSettings, TunSettingsSaveResult,
};
use crate::molecules::tun_session::{SESSION_MISSING, SessionSlot};

pub fn init(slot: Arc<SessionSlot>) {
    listen_open(slot.clone());
    listen_edit(slot.clone());
    listen_save(slot.clone());
    listen_close(slot);
}

fn listen_open(slot: Arc<SessionSlot>) {
    spawn(async move {
        let receiver = OpenTunSettings::get_dart_signal_receiver();
        while receiver.recv().await.is_some() {
            if let Some(session) = slot.session() {
                session.open();
                session.snapshot().send_signal_to_dart();
            }
        }
    });
}

fn listen_edit(slot: Arc<SessionSlot>) {
    spawn(async move {
        let receiver = EditTunSettings::get_dart_signal_receiver();
        while let Some(dart_signal) = receiver.recv().await {
            let Some(session) = slot.session() else {
                continue;
            };
            match dart_signal.message.into_partial() {
                Ok(partial) => {
                    session.edit(partial);
                }
                Err(e) => log::warn!("忽略无效的 TUN 编辑：{}", e),
            }
            session.snapshot().send_signal_to_dart();
        }
    });
}

fn listen_save(slot: Arc<SessionSlot>) {
    spawn(async move {
        let receiver = SaveTunSettings::get_dart_signal_receiver();
        while receiver.recv().await.is_some() {
            let Some(session) = slot.session() else {
                TunSettingsSaveResult {
                    is_successful: false,
                    is_unchanged: false,
                    error_message: Some(SESSION_MISSING.to_string()),
                }
                .send_signal_to_dart();
                continue;
            };

            // 保存期间仍需响应其他信号
            spawn(async move {
                let result = session.save().await;
                TunSettingsSaveResult::from(&result).send_signal_to_dart();
                session.snapshot().send_signal_to_dart();
            });
        }
    });
}

fn listen_close(slot: Arc<SessionSlot>) {
    spawn(async move {
        let receiver = CloseTunSettings::get_dart_signal_receiver();
        while receiver.recv().await.is_some() {
            if let Some(session) = slot.session() {
                session.close();
            }
        }
    });
}
