//! 容器调试信息

use crate::container::ReadableContainer;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// 容器调试信息
///
/// 每个容器都把它注册为可解析的类型，解析时生成当时的快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerDebugInfo {
    /// 已定义的类型
    pub defined_types: BTreeSet<String>,
    /// 反射缓存：类型名 => 签名
    pub reflections: BTreeMap<String, String>,
}

impl ContainerDebugInfo {
    /// 生成容器快照
    pub fn capture(container: &dyn ReadableContainer) -> Self {
        Self {
            defined_types: container
                .defined_types()
                .into_iter()
                .map(|key| key.to_string())
                .collect(),
            reflections: container.reflection_cache_overview(),
        }
    }
}
