// 应用文件路径管理服务，单例模式
// 会话配置未给出路径时，从这里取内核二进制与受控配置文件的默认位置

use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[cfg(target_os = "windows")]
const CORE_EXE_NAME: &str = "clash-core.exe";
#[cfg(not(target_os = "windows"))]
const CORE_EXE_NAME: &str = "clash-core";

const RUNTIME_CONFIG_NAME: &str = "runtime_config.yaml";

// 路径服务单例
pub static PATH_SERVICE: Lazy<RwLock<PathService>> = Lazy::new(|| {
    let service = PathService::new().unwrap_or_else(|e| {
        eprintln!("[PathService] 初始化失败：{}，使用降级路径", e);
        PathService::fallback()
    });
    RwLock::new(service)
});

pub struct PathService {
    // 应用数据根目录（便携模式：<exe_dir>/data）
    app_data_dir: PathBuf,

    // 随应用打包的内核二进制
    core_binary: PathBuf,

    // 内核读取的受控配置文件
    runtime_config: PathBuf,
}

impl PathService {
    pub fn new() -> Result<Self, String> {
        let current_exe =
            std::env::current_exe().map_err(|e| format!("无法获取当前可执行文件路径：{}", e))?;

        let exe_dir = current_exe
            .parent()
            .ok_or_else(|| "无法获取可执行文件所在目录".to_string())?;

        Ok(Self::with_root(exe_dir))
    }

    fn with_root(root: &Path) -> Self {
        let app_data_dir = root.join("data");
        let core_binary = app_data_dir
            .join("flutter_assets")
            .join("assets")
            .join("clash-core")
            .join(CORE_EXE_NAME);
        let runtime_config = app_data_dir.join(RUNTIME_CONFIG_NAME);

        Self {
            app_data_dir,
            core_binary,
            runtime_config,
        }
    }

    // 降级路径（初始化失败时使用）
    fn fallback() -> Self {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_root(&current_dir)
    }

    pub fn core_binary(&self) -> &PathBuf {
        &self.core_binary
    }

    pub fn runtime_config(&self) -> &PathBuf {
        &self.runtime_config
    }

    // 确保数据目录存在
    pub fn ensure_dirs(&self) -> Result<(), String> {
        if !self.app_data_dir.exists() {
            std::fs::create_dir_all(&self.app_data_dir)
                .map_err(|e| format!("无法创建目录 {}：{}", self.app_data_dir.display(), e))?;
            log::debug!("已创建目录：{}", self.app_data_dir.display());
        }
        Ok(())
    }
}

// 便捷访问函数

// 获取内核二进制路径
pub fn core_binary() -> PathBuf {
    PATH_SERVICE
        .read()
        .map(|s| s.core_binary().clone())
        .unwrap_or_else(|_| PathBuf::from(CORE_EXE_NAME))
}

// 获取受控配置文件路径
pub fn runtime_config() -> PathBuf {
    PATH_SERVICE
        .read()
        .map(|s| s.runtime_config().clone())
        .unwrap_or_else(|_| PathBuf::from(RUNTIME_CONFIG_NAME))
}

// 初始化路径服务（预加载单例，创建必要目录）
pub fn init() {
    Lazy::force(&PATH_SERVICE);

    let result = PATH_SERVICE
        .read()
        .map_err(|e| format!("无法获取路径服务锁：{}", e))
        .and_then(|s| s.ensure_dirs());
    if let Err(e) = result {
        log::error!("创建必要目录失败：{}", e);
    }

    log::debug!("PathService 已初始化");
}
