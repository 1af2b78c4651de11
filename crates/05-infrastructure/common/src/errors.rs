//! 错误类型定义

use thiserror::Error;

/// 装箱的通用错误类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 依赖注入错误类型
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("无法构建类型 {type_name} 的依赖，构造函数可能包含无法解析的依赖")]
    UnresolvableType {
        type_name: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("类型 {type_name} 已在当前容器层中定义")]
    DuplicateDefinition { type_name: String },

    #[error("类型 {type_name} 的定义无效: {message}")]
    InvalidDependencyDefinition { type_name: String, message: String },

    #[error("检测到循环依赖: {dependency_chain}")]
    RecursiveDefinition { dependency_chain: String },

    #[error("类型 {type_name} 未定义，显式容器中所有依赖都必须先定义")]
    DependencyNotDefined { type_name: String },

    #[error("无法调用绑定函数 {function}: {message}，无法构建的参数类型: {unresolvable:?}")]
    UnableToInvokeBoundFunction {
        function: String,
        message: String,
        unresolvable: Vec<String>,
    },

    #[error("类型 {type_name} 同时定义在定义源 #{first} 和 #{second} 中")]
    ConflictingDefinitions {
        type_name: String,
        first: usize,
        second: usize,
    },

    #[error("作用域已被使用过，每次调用都需要新的作用域")]
    ScopeReused,

    #[error("作用域已关闭，无法再解析托管资源 {type_name}")]
    ScopeClosed { type_name: String },

    #[error("释放资源 {type_name} 失败: {source}（另有 {suppressed} 个释放失败）")]
    ResourceReleaseFailed {
        type_name: String,
        #[source]
        source: BoxError,
        suppressed: usize,
    },

    #[error("缺少参数 {name}: {type_name}")]
    MissingArgument { name: String, type_name: String },

    #[error("参数 {name} 的类型不匹配，期望 {expected}")]
    ArgumentTypeMismatch { name: String, expected: String },

    #[error("构建类型 {type_name} 失败: {source}")]
    ResolutionFailed {
        type_name: String,
        #[source]
        source: BoxError,
    },
}

impl DependencyError {
    /// 创建无法解析错误
    pub fn unresolvable(type_name: impl Into<String>) -> Self {
        Self::UnresolvableType {
            type_name: type_name.into(),
            source: None,
        }
    }

    /// 创建带原因的无法解析错误
    pub fn unresolvable_because(type_name: impl Into<String>, reason: impl Into<BoxError>) -> Self {
        Self::UnresolvableType {
            type_name: type_name.into(),
            source: Some(reason.into()),
        }
    }

    /// 创建定义无效错误
    pub fn invalid_definition(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDependencyDefinition {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// 包装工厂函数返回的错误
    pub fn resolution_failed(type_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ResolutionFailed {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// 是否属于“无法解析”一类错误（包括参数缺失和类型不匹配）
    pub fn is_unresolvable(&self) -> bool {
        matches!(
            self,
            Self::UnresolvableType { .. }
                | Self::DependencyNotDefined { .. }
                | Self::MissingArgument { .. }
                | Self::ArgumentTypeMismatch { .. }
        )
    }

    /// 若为无法解析错误，返回其类型名
    pub fn unresolvable_type_name(&self) -> Option<&str> {
        match self {
            Self::UnresolvableType { type_name, .. } => Some(type_name),
            _ => None,
        }
    }
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置解析失败: {source}")]
    ParseError {
        #[source]
        source: BoxError,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 结果类型别名
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
