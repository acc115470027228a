// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 前端控制器参数与常量模块
//!
//! 该模块集中定义了 `modserver` 在分发请求时依赖的常量，包括：
//! - 模块目录约定（入口脚本、元数据文件名、默认模块名）。
//! - 配置文件的探测顺序。
//! - 模块可以设置的 HTTP 状态码及其原因短语。
//! - HTTP 方法、版本及编码格式的强类型枚举。

use std::collections::HashMap;
use lazy_static::lazy_static;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "modserver";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 选择模块所使用的查询参数名
pub const DEFAULT_MODULE_VAR: &str = "module";

/// 选择动作所使用的查询参数名
pub const DEFAULT_ACTION_VAR: &str = "action";

/// 请求未指定模块、配置也未给出默认值时使用的模块
pub const DEFAULT_MODULE: &str = "index";

/// 每个模块目录下必须存在的入口文件，同时也是模块的默认视图
pub const DEFAULT_ENTRY_SCRIPT: &str = "view.html";

/// 模块元数据的配置名（在模块目录下按扩展名探测）
pub const MODULE_META_NAME: &str = "module";

/// 未在元数据中指定时调用的渲染方法
pub const DEFAULT_RENDER_METHOD: &str = "render";

/// 未在元数据中指定时调用的上下文更新方法
pub const DEFAULT_UPDATE_CONTEXT_METHOD: &str = "update_context";

/// 配置文件扩展名的探测顺序，先找到者优先
pub const CONFIG_EXTENSIONS: [&str; 4] = ["json", "toml", "xml", "ini"];

pub const CONTENT_TYPE_HTML: &str = "text/html;charset=utf-8";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain;charset=utf-8";

lazy_static! {
    /// 服务器当前允许处理的 HTTP 方法列表。
    ///
    /// 用于在收到请求时进行初步过滤，同时作为 OPTIONS 响应中 `Allow` 头的内容。
    pub static ref ALLOWED_METHODS: Vec<HttpRequestMethod> = {
        vec![
            HttpRequestMethod::Get,
            HttpRequestMethod::Head,
            HttpRequestMethod::Post,
            HttpRequestMethod::Options,
        ]
    };
}

lazy_static! {
    /// 模块可以使用的 HTTP 状态码与其原因短语。
    ///
    /// 模块在 `ResponseContext` 中设置了表外的状态码时，服务器会退回 500。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(204, "No Content");

        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");

        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(409, "Conflict");
        map.insert(410, "Gone");
        map.insert(413, "Content Too Large");
        map.insert(415, "Unsupported Media Type");
        map.insert(422, "Unprocessable Content");
        map.insert(429, "Too Many Requests");

        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(503, "Service Unavailable");
        map
    };
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    V1_1,
}

/// 前端控制器接受的 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    Get,
    /// 与 GET 走同样的分发流程，但不发送响应体
    Head,
    /// 直接以 204 和 `Allow` 头回应，不进入模块分发
    Options,
    /// 请求体会被解析为 `RequestContext` 的 body 参数
    Post,
}

impl HttpRequestMethod {
    /// 从请求行中的方法名解析，大小写不敏感
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_uppercase().as_str() {
            "GET" => Some(HttpRequestMethod::Get),
            "HEAD" => Some(HttpRequestMethod::Head),
            "OPTIONS" => Some(HttpRequestMethod::Options),
            "POST" => Some(HttpRequestMethod::Post),
            _ => None,
        }
    }
}

/// 支持的内容编码（压缩）格式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpEncoding {
    Gzip,
    Deflate,
    Br,
}

use std::fmt;

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
        }
    }
}

impl fmt::Display for HttpEncoding {
    /// 将枚举格式化为 `Content-Encoding` 头所使用的标识符
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Deflate => write!(f, "deflate"),
            HttpEncoding::Br => write!(f, "br"),
        }
    }
}
