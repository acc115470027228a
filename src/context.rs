// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 执行上下文
//!
//! - `RequestContext`：请求的只读视图（查询参数、请求体、请求头、Cookie）。
//! - `ResponseContext`：模块可修改的状态码与响应头。
//! - `ModuleContext`：分发与渲染之间传递数据的载体，持有模块配置、请求、响应以及具名变量。

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};

use crate::{param::HttpRequestMethod, request::Request, resolver::lookup};

#[derive(Debug, Clone)]
pub struct RequestContext {
    method: HttpRequestMethod,
    path: String,
    query: HashMap<String, String>,
    body: Map<String, Value>,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl RequestContext {
    /// 以请求目标（路径加查询字符串）构造一个 GET 请求的上下文
    pub fn get(target: &str) -> Self {
        Self::new(HttpRequestMethod::Get, target)
    }

    pub fn new(method: HttpRequestMethod, target: &str) -> Self {
        let (path, query_string) = match target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (target, ""),
        };
        Self {
            method,
            path: path.to_string(),
            query: parse_urlencoded(query_string.as_bytes()),
            body: Map::new(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        let mut ctx = Self::new(request.method(), request.path());
        for (name, value) in request.headers() {
            ctx.headers.insert(name.to_lowercase(), value.to_string());
        }
        if let Some(cookie) = ctx.headers.get("cookie") {
            ctx.cookies = parse_cookies(cookie);
        }
        let content_type = ctx.header("content-type").unwrap_or("").to_lowercase();
        ctx.body = parse_body(&content_type, request.body());
        ctx
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, name: &str, value: Value) -> Self {
        self.body.insert(name.to_string(), value);
        self
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn body(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// 请求头名大小写不敏感
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

// 同名参数以最后一次出现为准
fn parse_urlencoded(input: &[u8]) -> HashMap<String, String> {
    form_urlencoded::parse(input).into_owned().collect()
}

fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

fn parse_body(content_type: &str, body: &[u8]) -> Map<String, Value> {
    if body.is_empty() {
        return Map::new();
    }
    if content_type.starts_with("application/json") {
        return match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        return parse_urlencoded(body)
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
    }
    Map::new()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseContext {
    status: u16,
    headers: Vec<(String, String)>,
    content_type: Option<String>,
}

impl ResponseContext {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            content_type: None,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// 设置响应头，同名（大小写不敏感）的旧值会被替换。
    /// 名称与值中的 CR、LF 会被去除，避免响应被拆分。
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        let name = strip_crlf(name);
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, strip_crlf(value)));
        self
    }

    /// 追加响应头，允许同名多值（例如 Set-Cookie）
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((strip_crlf(name), strip_crlf(value)));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.content_type = Some(strip_crlf(content_type));
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn redirect(&mut self, location: &str, status: u16) -> &mut Self {
        self.set_status(status).set_header("Location", location)
    }
}

fn strip_crlf(s: &str) -> String {
    s.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

impl Default for ResponseContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 模块执行上下文
#[derive(Debug, Clone)]
pub struct ModuleContext {
    module: String,
    dir: PathBuf,
    config: Value,
    request: RequestContext,
    response: ResponseContext,
    vars: Map<String, Value>,
}

impl ModuleContext {
    pub fn new<P: AsRef<Path>>(module: &str, dir: P, config: Value, request: RequestContext) -> Self {
        let mut vars = Map::new();
        vars.insert("module".to_string(), Value::String(module.to_string()));
        Self {
            module: module.to_string(),
            dir: dir.as_ref().to_path_buf(),
            config,
            request,
            response: ResponseContext::new(),
            vars,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 按点分隔的键读取模块配置
    pub fn config(&self, key: &str) -> Option<&Value> {
        lookup(&self.config, key)
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn response(&self) -> &ResponseContext {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseContext {
        &mut self.response
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set_var(&mut self, name: &str, value: Value) -> &mut Self {
        self.vars.insert(name.to_string(), value);
        self
    }

    pub fn action(&self) -> Option<&str> {
        self.vars.get("action").and_then(Value::as_str)
    }

    pub fn view(&self) -> Option<&str> {
        self.vars.get("view").and_then(Value::as_str)
    }

    pub fn into_response(self) -> ResponseContext {
        self.response
    }

    /// 视图渲染使用的数据：具名变量，外加 `config` 与 `query`（变量同名时变量优先）
    pub fn view_data(&self) -> Value {
        let mut data = self.vars.clone();
        data.entry("config").or_insert_with(|| self.config.clone());
        data.entry("query").or_insert_with(|| {
            Value::Object(
                self.request
                    .query
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )
        });
        Value::Object(data)
    }
}
