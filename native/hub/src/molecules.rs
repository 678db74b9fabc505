// L1 分子层：TUN 会话、TUN 设置、内核提权与内核控制

pub mod core_control;
pub mod core_permission;
pub mod tun_session;
pub mod tun_settings;
