// TUN 会话分子模块

pub mod session;
pub mod slot;

pub use session::{TunSession, TunSessionOptions};
pub use slot::{SESSION_MISSING, SessionSlot};

use std::sync::Arc;

pub fn init_listeners(slot: Arc<SessionSlot>) {
    slot::init(slot);
}
