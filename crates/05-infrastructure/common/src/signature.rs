//! 函数签名描述
//!
//! 构造函数和绑定函数在编译期生成签名，解析引擎和绑定器依据签名决定需要注入哪些参数

use crate::key::TypeKey;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// 单个参数的描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// 参数名
    pub name: String,
    /// 参数类型键
    pub key: TypeKey,
    /// 默认值的源码字面量
    pub default: Option<String>,
    /// 是否标记为显式注入
    pub inject: bool,
}

/// 函数签名
#[derive(Debug, Clone, Default)]
pub struct FunctionSpec {
    name: String,
    docs: Option<String>,
    args: Vec<String>,
    annotations: HashMap<String, TypeKey>,
    defaults: HashMap<String, String>,
    injectable: HashSet<String>,
    return_type: Option<TypeKey>,
    is_async: bool,
}

impl FunctionSpec {
    /// 创建空签名
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 追加一个参数
    pub fn param(mut self, name: impl Into<String>, key: TypeKey) -> Self {
        let name = name.into();
        self.annotations.insert(name.clone(), key);
        self.args.push(name);
        self
    }

    /// 追加一个带默认值的参数
    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        key: TypeKey,
        default: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.defaults.insert(name.clone(), default.into());
        self.param(name, key)
    }

    /// 将参数标记为显式注入
    pub fn inject(mut self, name: impl Into<String>) -> Self {
        self.injectable.insert(name.into());
        self
    }

    /// 设置返回类型
    pub fn returns(mut self, key: TypeKey) -> Self {
        self.return_type = Some(key);
        self
    }

    /// 设置文档
    pub fn with_docs(mut self, docs: impl Into<String>) -> Self {
        let docs = docs.into();
        self.docs = (!docs.trim().is_empty()).then_some(docs);
        self
    }

    /// 标记为异步函数
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// 去掉一个参数，用于生成跳过部分参数后的签名
    pub fn without_argument(mut self, name: &str) -> Self {
        self.args.retain(|arg| arg != name);
        self.annotations.remove(name);
        self.defaults.remove(name);
        self.injectable.remove(name);
        self
    }

    /// 函数名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 文档
    pub fn docs(&self) -> Option<&str> {
        self.docs.as_deref()
    }

    /// 按声明顺序排列的参数名
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// 参数名到类型键的映射
    pub fn annotations(&self) -> &HashMap<String, TypeKey> {
        &self.annotations
    }

    /// 参数名到默认值字面量的映射
    pub fn defaults(&self) -> &HashMap<String, String> {
        &self.defaults
    }

    /// 标记为显式注入的参数
    pub fn injectable(&self) -> &HashSet<String> {
        &self.injectable
    }

    /// 返回类型
    pub fn return_type(&self) -> Option<TypeKey> {
        self.return_type
    }

    /// 是否为异步函数
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// 参数个数
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// 参数类型键
    pub fn key_of(&self, name: &str) -> Option<TypeKey> {
        self.annotations.get(name).copied()
    }

    /// 参数是否有默认值
    pub fn has_default(&self, name: &str) -> bool {
        self.defaults.contains_key(name)
    }

    /// 按声明顺序遍历参数
    pub fn parameters(&self) -> impl Iterator<Item = Parameter> + '_ {
        self.args.iter().filter_map(move |name| {
            let key = self.key_of(name)?;
            Some(Parameter {
                name: name.clone(),
                key,
                default: self.defaults.get(name).cloned(),
                inject: self.injectable.contains(name),
            })
        })
    }
}

impl fmt::Display for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .parameters()
            .map(|param| param.key.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({params})")?;
        if let Some(return_type) = self.return_type {
            write!(f, " -> {return_type}")?;
        }
        Ok(())
    }
}
