// 日志初始化：RUST_LOG 优先，默认 info

use std::io::Write;

pub fn init() {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    // 热重启时会重复初始化
    if result.is_err() {
        log::debug!("日志已初始化，跳过");
    }
}
