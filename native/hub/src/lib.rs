// Stelliberty TUN 设置 Rust 端入口
//
// 分层：atoms（纯数据）→ molecules（功能）→ coordinator（信号编排）

mod atoms;
mod coordinator;
mod molecules;
mod services;

use rinf::{dart_shutdown, write_interface};

write_interface!();

#[tokio::main(flavor = "current_thread")]
async fn main() {
    services::logger::init();
    services::path_service::init();

    log::info!("Rust 端已启动");
    coordinator::init_all();

    dart_shutdown().await;
    log::info!("Rust 端已退出");
}
