// TUN 设置分子模块

pub mod commit;
pub mod config_store;
pub mod listeners;
pub mod pending_edit;
pub mod signals;

pub use commit::{CommitCoordinator, CommitError, CommitOutcome, PatchMode};
pub use config_store::ConfigStore;
pub use pending_edit::{PartialTunConfig, PendingEdit};
pub use signals::{
    CloseTunSettings, ConfigureTunSession, EditTunSettings, OpenTunSettings, SaveTunSettings,
    TunSettingsSaveResult, TunSettingsSnapshot,
};

use std::sync::Arc;

use crate::molecules::tun_session::SessionSlot;

pub fn init_listeners(slot: Arc<SessionSlot>) {
    listeners::init(slot);
}
