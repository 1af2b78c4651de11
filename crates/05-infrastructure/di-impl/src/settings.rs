//! 容器设置
//!
//! 设置从可选的配置文件和 `JOINERY_` 前缀的环境变量加载，缺省项使用默认值

use di_common::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "JOINERY";

/// 默认配置文件（不含扩展名）
pub const DEFAULT_SETTINGS_FILE: &str = "config/joinery";

/// 容器设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// 反射构建未定义的依赖时输出日志
    pub log_undefined_deps: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 反射缓存容量
    pub reflection_cache_capacity: usize,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            log_undefined_deps: false,
            max_resolution_depth: 100,
            reflection_cache_capacity: 1024,
        }
    }
}

impl ContainerSettings {
    /// 从默认位置加载
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(DEFAULT_SETTINGS_FILE)
    }

    /// 从指定文件加载，文件不存在时只读取环境变量
    pub fn load_from(path: &str) -> ConfigResult<Self> {
        debug!("加载容器设置: {}", path);

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                error!("容器设置构建失败: {}", e);
                ConfigError::ParseError { source: Box::new(e) }
            })?;

        let loaded: Self = settings.try_deserialize().map_err(|e| {
            error!("容器设置绑定失败: {}", e);
            ConfigError::ParseError { source: Box::new(e) }
        })?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// 校验设置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_resolution_depth 必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    /// 设置是否记录未定义的依赖
    pub fn with_log_undefined_deps(mut self, enabled: bool) -> Self {
        self.log_undefined_deps = enabled;
        self
    }

    /// 设置最大解析深度
    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// 设置反射缓存容量
    pub fn with_reflection_cache_capacity(mut self, capacity: usize) -> Self {
        self.reflection_cache_capacity = capacity;
        self
    }
}
