// 当前 TUN 会话槽位
//
// 会话由 ConfigureTunSession 建立，重新配置时替换；进行中的流程持有旧会话直到结束

use rinf::{DartSignal, RustSignal};
use std::sync::{Arc, RwLock};
use tokio::spawn;

use super::session::{TunSession, TunSessionOptions};
use crate::molecules::core_permission::SignalNotifier;
use crate::molecules::tun_settings::ConfigureTunSession;

pub const SESSION_MISSING: &str = "TUN 会话尚未初始化";

#[derive(Default)]
pub struct SessionSlot {
    session: RwLock<Option<Arc<TunSession>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<Arc<TunSession>> {
        let session = self
            .session
            .read()
            .unwrap_or_else(|e| {
                log::warn!("TunSession 锁中毒，正在恢复");
                e.into_inner()
            })
            .clone();
        if session.is_none() {
            log::warn!("{}", SESSION_MISSING);
        }
        session
    }

    pub fn install(&self, session: Arc<TunSession>) {
        let mut slot = self.session.write().unwrap_or_else(|e| {
            log::warn!("TunSession 锁中毒，正在恢复");
            e.into_inner()
        });
        if slot.replace(session).is_some() {
            log::info!("已替换旧的 TUN 会话");
        }
    }

    pub fn configure(&self, options: TunSessionOptions) -> anyhow::Result<Arc<TunSession>> {
        let session = Arc::new(TunSession::from_options(options, Arc::new(SignalNotifier))?);
        self.install(session.clone());
        Ok(session)
    }
}

pub fn init(slot: Arc<SessionSlot>) {
    spawn(async move {
        let receiver = ConfigureTunSession::get_dart_signal_receiver();
        while let Some(dart_signal) = receiver.recv().await {
            let options = TunSessionOptions::from(dart_signal.message);
            match slot.configure(options) {
                Ok(session) => session.snapshot().send_signal_to_dart(),
                Err(e) => log::error!("建立 TUN 会话失败：{:#}", e),
            }
        }
    });
}
