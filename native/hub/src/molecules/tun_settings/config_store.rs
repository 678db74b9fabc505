// TUN 配置存储
//
// 持有最近一次提交的 tun 配置；可选地落盘到受控内核配置文件的 tun 段，
// 写回时只覆盖八个字段，其余键与其余段保持原样

use anyhow::{Context, Result, anyhow};
use serde_yaml_ng::{Mapping, Value as YamlValue};
use std::path::{Path, PathBuf};

use super::pending_edit::{PartialTunConfig, PendingEdit};
use crate::atoms::{TunConfig, TunConfigPatch, TunFieldsPatch};

const TUN_KEY: &str = "tun";

pub struct ConfigStore {
    committed: TunConfig,
    backing_file: Option<PathBuf>,
}

impl ConfigStore {
    #[cfg(test)]
    pub fn in_memory(committed: TunConfig) -> Self {
        Self {
            committed,
            backing_file: None,
        }
    }

    // 文件不存在时使用默认值
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let committed = if path.exists() {
            read_tun_section(&path)?
        } else {
            log::info!("受控配置文件不存在，使用默认 TUN 配置：{}", path.display());
            TunConfig::default()
        };

        log::debug!(
            "已加载 TUN 配置：device={}, stack={}, mtu={}",
            committed.device,
            committed.stack.as_wire(),
            committed.mtu
        );

        Ok(Self {
            committed,
            backing_file: Some(path),
        })
    }

    pub fn load(&self) -> TunConfig {
        self.committed.clone()
    }

    pub fn begin_edit(&self) -> PendingEdit {
        PendingEdit::from_committed(&self.committed)
    }

    pub fn stage(pending: &PendingEdit, edit: PartialTunConfig) -> PendingEdit {
        pending.merged(edit)
    }

    // 字段级最小补丁，相等时为空
    pub fn diff(pending: &TunConfig, committed: &TunConfig) -> TunConfigPatch {
        fn changed<T: PartialEq + Clone>(next: &T, prev: &T) -> Option<T> {
            (next != prev).then(|| next.clone())
        }

        TunConfigPatch {
            tun: TunFieldsPatch {
                device: changed(&pending.device, &committed.device),
                stack: changed(&pending.stack, &committed.stack),
                auto_route: changed(&pending.auto_route, &committed.auto_route),
                auto_redirect: changed(&pending.auto_redirect, &committed.auto_redirect),
                auto_detect_interface: changed(
                    &pending.auto_detect_interface,
                    &committed.auto_detect_interface,
                ),
                strict_route: changed(&pending.strict_route, &committed.strict_route),
                mtu: changed(&pending.mtu, &committed.mtu),
                dns_hijack: changed(&pending.dns_hijack, &committed.dns_hijack),
            },
        }
    }

    // 内核已接受补丁后调用；落盘成功后才更新内存快照
    pub fn record_commit(&mut self, config: TunConfig) -> Result<()> {
        if let Some(path) = &self.backing_file {
            write_tun_section(path, &config)?;
        }
        self.committed = config;
        Ok(())
    }
}

fn read_tun_section(path: &Path) -> Result<TunConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取受控配置失败：{}", path.display()))?;

    let root: YamlValue = serde_yaml_ng::from_str(&content)
        .with_context(|| format!("解析受控配置失败：{}", path.display()))?;

    let Some(tun) = root.get(TUN_KEY) else {
        return Ok(TunConfig::default());
    };

    match serde_yaml_ng::from_value::<TunConfig>(tun.clone()) {
        Ok(config) => Ok(config),
        Err(e) => {
            log::warn!("tun 段无法识别，使用默认值：{}", e);
            Ok(TunConfig::default())
        }
    }
}

fn write_tun_section(path: &Path, config: &TunConfig) -> Result<()> {
    let mut root = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取受控配置失败：{}", path.display()))?;
        serde_yaml_ng::from_str::<YamlValue>(&content)
            .with_context(|| format!("解析受控配置失败：{}", path.display()))?
    } else {
        YamlValue::Mapping(Mapping::new())
    };

    if root.is_null() {
        root = YamlValue::Mapping(Mapping::new());
    }

    let root_map = root
        .as_mapping_mut()
        .ok_or_else(|| anyhow!("配置根节点必须是 Map：{}", path.display()))?;

    let mut tun_map = root_map
        .get(YamlValue::String(TUN_KEY.to_string()))
        .and_then(|v| v.as_mapping())
        .cloned()
        .unwrap_or_default();

    if let YamlValue::Mapping(fields) =
        serde_yaml_ng::to_value(config).context("序列化 TUN 配置失败")?
    {
        for (key, value) in fields {
            tun_map.insert(key, value);
        }
    }

    root_map.insert(
        YamlValue::String(TUN_KEY.to_string()),
        YamlValue::Mapping(tun_map),
    );

    let yaml = serde_yaml_ng::to_string(&root).context("序列化受控配置失败")?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("创建配置目录失败：{}", parent.display()))?;
    }

    // 先写临时文件再替换，避免写到一半的配置被内核读到
    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, yaml)
        .with_context(|| format!("写入临时配置失败：{}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("替换受控配置失败：{}", path.display()))?;

    log::info!("TUN 配置已写入：{}", path.display());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::atoms::TunStack;

    #[test]
    fn test_load_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("mihomo.yaml")).unwrap();
        assert_eq!(store.load(), TunConfig::default());
    }

    #[test]
    fn test_missing_fields_fall_back_per_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mihomo.yaml");
        std::fs::write(&path, "tun:\n  stack: gvisor\n  mtu: 9000\n").unwrap();

        let config = ConfigStore::open(&path).unwrap().load();
        assert_eq!(config.stack, TunStack::Userspace);
        assert_eq!(config.mtu, 9000);
        assert_eq!(config.device, "Mihomo");
        assert_eq!(config.dns_hijack, vec!["any:53".to_string()]);
    }

    #[test]
    fn test_diff_is_empty_for_equal_configs() {
        let config = TunConfig::default();
        assert!(ConfigStore::diff(&config, &config).is_empty());
    }

    #[test]
    fn test_diff_contains_only_changed_fields() {
        let committed = TunConfig::default();
        let pending = TunConfig {
            device: "utun5".to_string(),
            mtu: 9000,
            ..TunConfig::default()
        };

        let patch = ConfigStore::diff(&pending, &committed);
        assert_eq!(patch.tun.device.as_deref(), Some("utun5"));
        assert_eq!(patch.tun.mtu, Some(9000));
        assert_eq!(patch.tun.stack, None);
        assert_eq!(patch.tun.dns_hijack, None);
        assert_eq!(patch.apply_to(&committed), pending);
    }

    #[test]
    fn test_record_commit_preserves_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mihomo.yaml");
        std::fs::write(
            &path,
            "mixed-port: 7890\ntun:\n  enable: true\n  stack: system\n  route-exclude-address:\n    - 10.0.0.0/8\n",
        )
        .unwrap();

        let mut store = ConfigStore::open(&path).unwrap();
        let next = TunConfig {
            device: "utun5".to_string(),
            auto_redirect: true,
            ..store.load()
        };
        store.record_commit(next.clone()).unwrap();

        let written: YamlValue =
            serde_yaml_ng::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.get("mixed-port").and_then(|v| v.as_i64()), Some(7890));
        let tun = written.get("tun").unwrap();
        assert_eq!(tun.get("enable").and_then(|v| v.as_bool()), Some(true));
        assert!(tun.get("route-exclude-address").is_some());
        assert_eq!(tun.get("device").and_then(|v| v.as_str()), Some("utun5"));
        assert_eq!(tun.get("auto-redirect").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(tun.get("stack").and_then(|v| v.as_str()), Some("system"));

        // 重新打开得到同样的快照
        assert_eq!(ConfigStore::open(&path).unwrap().load(), next);
    }

    #[test]
    fn test_unreadable_tun_section_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mihomo.yaml");
        std::fs::write(&path, "tun:\n  stack: quantum\n").unwrap();

        assert_eq!(ConfigStore::open(&path).unwrap().load(), TunConfig::default());
    }

    #[test]
    fn test_broken_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mihomo.yaml");
        std::fs::write(&path, "tun: [unclosed\n").unwrap();

        assert!(ConfigStore::open(&path).is_err());
    }

    #[test]
    fn test_failed_write_keeps_committed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        // 父路径是普通文件，目录无法创建
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut store = ConfigStore::open(blocker.join("mihomo.yaml")).unwrap();

        let next = TunConfig {
            device: "utun5".to_string(),
            ..TunConfig::default()
        };
        assert!(store.record_commit(next).is_err());
        assert_eq!(store.load(), TunConfig::default());
    }
}
