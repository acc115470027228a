// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了前端控制器在请求处理生命周期中可能抛出的各类异常情况。
//!
//! - **协议层**：请求无法解析、方法或版本不受支持、请求体过大。
//! - **分发层**：模块、入口脚本、处理类、方法或动作无法解析，统一映射为 404。
//! - **执行层**：元数据错误、配置文件解析失败以及模块处理器主动返回的错误，映射为 500。

use std::fmt;

use crate::{registry::ModuleError, resolver::ResolveError};

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行或请求头格式错误。
    MalformedRequest,
    /// 客户端使用了服务器不支持的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求体超过了配置的 `max_body_size`。
    PayloadTooLarge,
    /// 模块名规范化后为空，或模块目录不存在。
    ModuleNotFound(String),
    /// 模块目录下缺少入口脚本。
    ScriptNotFound(String),
    /// 元数据中声明的处理类没有在注册表中登记。
    ClassNotFound(String),
    /// 处理类没有提供所需的方法（渲染方法或动作方法）。
    MethodNotFound(String),
    /// 请求的动作不在模块的动作表中。
    ActionNotFound(String),
    /// 模块元数据结构不合法，例如未知的参数来源或转换器。
    InvalidMetadata(String),
    /// 配置文件解析失败。
    Config(ResolveError),
    /// 模块处理器返回的错误，交由顶层处理。
    Module(ModuleError),
}

use Exception::*;

impl Exception {
    /// 该异常对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8 | MalformedRequest | UnsupportedHttpVersion => 400,
            UnSupportedRequestMethod => 405,
            PayloadTooLarge => 413,
            ModuleNotFound(_) | ScriptNotFound(_) | ClassNotFound(_) | MethodNotFound(_)
            | ActionNotFound(_) => 404,
            InvalidMetadata(_) | Config(_) | Module(_) => 500,
        }
    }

    /// 是否属于“找不到”一类的分发失败
    pub fn is_not_found(&self) -> bool {
        self.status_code() == 404
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed request"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            PayloadTooLarge => write!(f, "Request body too large (413)"),
            ModuleNotFound(name) => write!(f, "Module '{}' not found (404)", name),
            ScriptNotFound(path) => write!(f, "Entry script '{}' not found (404)", path),
            ClassNotFound(class) => write!(f, "Module class '{}' is not registered (404)", class),
            MethodNotFound(method) => write!(f, "Module method '{}' not found (404)", method),
            ActionNotFound(action) => write!(f, "Action '{}' not found (404)", action),
            InvalidMetadata(message) => write!(f, "Invalid module metadata: {}", message),
            Config(e) => write!(f, "Config error: {}", e),
            Module(e) => write!(f, "Module error: {}", e),
        }
    }
}

impl From<ResolveError> for Exception {
    fn from(e: ResolveError) -> Self {
        Config(e)
    }
}

impl From<ModuleError> for Exception {
    fn from(e: ModuleError) -> Self {
        Module(e)
    }
}
