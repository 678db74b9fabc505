// 进程级服务

pub mod logger;
pub mod path_service;
