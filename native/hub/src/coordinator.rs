// L2 协调层模块入口

pub mod tun_coordinator;

pub fn init_all() {
    tun_coordinator::init();
    log::info!("协调层初始化完成");
}
