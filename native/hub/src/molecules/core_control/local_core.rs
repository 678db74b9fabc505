// 生产环境的内核协作方：控制器 HTTP + 系统命令

use async_trait::async_trait;
use std::path::PathBuf;

use super::{ControllerClient, CoreControl, CoreError, elevation};
use crate::atoms::{ElevationStrategy, TunConfigPatch};

pub struct LocalCore {
    controller: ControllerClient,
    core_path: PathBuf,
}

impl LocalCore {
    pub fn new(controller: ControllerClient, core_path: PathBuf) -> Self {
        Self {
            controller,
            core_path,
        }
    }
}

#[async_trait]
impl CoreControl for LocalCore {
    async fn patch_config(&self, patch: &TunConfigPatch) -> Result<(), CoreError> {
        self.controller.patch_configs(patch).await
    }

    async fn restart_core(&self) -> Result<(), CoreError> {
        self.controller.restart().await
    }

    async fn grant_permission(
        &self,
        strategy: ElevationStrategy,
        secret: Option<&str>,
    ) -> Result<(), CoreError> {
        elevation::grant_core_permission(&self.core_path, strategy, secret).await
    }

    async fn setup_firewall(&self) -> Result<(), CoreError> {
        elevation::setup_firewall(&self.core_path).await
    }
}
