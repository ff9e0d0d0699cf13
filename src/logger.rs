// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 引擎的注入式告警通道。
//!
//! 引擎本身不假设宿主使用哪种日志后端：宿主通过 [`EngineLogger`] 注入一个实现，
//! 未注入时告警被静默丢弃（内部的 debug 级日志仍然走 `log` 门面）。

use log::warn;

#[cfg_attr(test, mockall::automock)]
pub trait EngineLogger: Send + Sync {
    fn warn(&self, message: &str);
}

/// 转发到 `log` 门面，由宿主配置的 log4rs 决定最终输出位置
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacade;

impl EngineLogger for LogFacade {
    fn warn(&self, message: &str) {
        warn!("{}", message);
    }
}
