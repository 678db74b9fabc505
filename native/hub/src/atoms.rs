// L0 原子层：纯数据与纯函数，不做 IO

pub mod platform_policy;
pub mod tun_config;

pub use platform_policy::{
    ControlId, ElevationStrategy, Platform, available_controls, elevation_strategy,
};
pub use tun_config::{
    TunConfig, TunConfigPatch, TunFieldsPatch, TunStack, ValidationError, format_dns_hijack,
    parse_dns_hijack, parse_mtu,
};
