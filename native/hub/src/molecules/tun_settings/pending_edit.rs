// 未保存的 TUN 编辑
//
// 进入设置页时由已提交配置生成，逐字段合并用户输入，提交时整体消费

use crate::atoms::{
    TunConfig, TunStack, ValidationError, format_dns_hijack, parse_dns_hijack, parse_mtu,
};

// 单次编辑，未设置的字段保持原值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialTunConfig {
    pub device: Option<String>,
    pub stack: Option<TunStack>,
    pub auto_route: Option<bool>,
    pub auto_redirect: Option<bool>,
    pub auto_detect_interface: Option<bool>,
    pub strict_route: Option<bool>,
    // 输入框原文，解析失败时保留
    pub mtu: Option<String>,
    // 输入框原文，逗号分隔
    pub dns_hijack: Option<String>,
}

impl PartialTunConfig {
    #[cfg(test)]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    #[cfg(test)]
    pub fn with_stack(mut self, stack: TunStack) -> Self {
        self.stack = Some(stack);
        self
    }

    #[cfg(test)]
    pub fn with_auto_redirect(mut self, enabled: bool) -> Self {
        self.auto_redirect = Some(enabled);
        self
    }

    #[cfg(test)]
    pub fn with_strict_route(mut self, enabled: bool) -> Self {
        self.strict_route = Some(enabled);
        self
    }

    #[cfg(test)]
    pub fn with_mtu(self, mtu: u32) -> Self {
        self.with_mtu_text(mtu.to_string())
    }

    pub fn with_mtu_text(mut self, text: impl Into<String>) -> Self {
        self.mtu = Some(text.into());
        self
    }

    pub fn with_dns_hijack_text(mut self, text: impl Into<String>) -> Self {
        self.dns_hijack = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    values: TunConfig,
    // MTU 输入框中无法解析的原文，存在时禁止提交
    invalid_mtu: Option<String>,
    // DNS 劫持输入框原文，回显时不做整理
    dns_hijack_text: Option<String>,
}

impl PendingEdit {
    pub fn from_committed(committed: &TunConfig) -> Self {
        Self {
            values: committed.clone(),
            invalid_mtu: None,
            dns_hijack_text: None,
        }
    }

    pub fn values(&self) -> &TunConfig {
        &self.values
    }

    pub fn invalid_mtu(&self) -> Option<&str> {
        self.invalid_mtu.as_deref()
    }

    // 输入框回显：无效输入原样保留
    pub fn mtu_text(&self) -> String {
        match &self.invalid_mtu {
            Some(text) => text.clone(),
            None => self.values.mtu.to_string(),
        }
    }

    // 输入框回显：用户输入过则原样返回
    pub fn dns_hijack_text(&self) -> String {
        match &self.dns_hijack_text {
            Some(text) => text.clone(),
            None => format_dns_hijack(&self.values.dns_hijack),
        }
    }

    // 纯函数合并，同一字段后写覆盖先写
    pub fn merged(&self, edit: PartialTunConfig) -> Self {
        let mut next = self.clone();
        let values = &mut next.values;

        if let Some(device) = edit.device {
            values.device = device;
        }
        if let Some(stack) = edit.stack {
            values.stack = stack;
        }
        if let Some(enabled) = edit.auto_route {
            values.auto_route = enabled;
        }
        if let Some(enabled) = edit.auto_redirect {
            values.auto_redirect = enabled;
        }
        if let Some(enabled) = edit.auto_detect_interface {
            values.auto_detect_interface = enabled;
        }
        if let Some(enabled) = edit.strict_route {
            values.strict_route = enabled;
        }
        if let Some(text) = edit.dns_hijack {
            values.dns_hijack = parse_dns_hijack(&text);
            next.dns_hijack_text = Some(text);
        }

        if let Some(text) = edit.mtu {
            match parse_mtu(&text) {
                Ok(mtu) => {
                    values.mtu = mtu;
                    next.invalid_mtu = None;
                }
                Err(_) => next.invalid_mtu = Some(text),
            }
        }

        next
    }

    // 提交前校验，返回将要提交的配置
    pub fn validate(&self) -> Result<TunConfig, ValidationError> {
        if let Some(text) = &self.invalid_mtu {
            return Err(ValidationError::InvalidMtu(text.clone()));
        }

        let mut config = self.values.clone();
        config.device = config.device.trim().to_string();
        if let Some(text) = &self.dns_hijack_text {
            config.dns_hijack = parse_dns_hijack(text);
        }
        config.validate()?;
        Ok(config)
    }
}
