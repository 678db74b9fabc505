// TUN 协调器：编排 TUN 设置页与内核提权相关操作

use std::sync::Arc;

use crate::molecules::tun_session::SessionSlot;
use crate::molecules::{core_permission, tun_session, tun_settings};

// 初始化 TUN 协调器
pub fn init() {
    // 各模块共享同一会话槽位
    let slot = Arc::new(SessionSlot::new());

    // 初始化会话配置
    tun_session::init_listeners(slot.clone());

    // 初始化设置页
    tun_settings::init_listeners(slot.clone());

    // 初始化内核提权
    core_permission::init_listeners(slot);
}
