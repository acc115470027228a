// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模块定义
//!
//! 模块是模块根目录下的一个子目录，由查询参数选中。本文件负责：
//! 1. 将用户提供的模块名规范化为安全的相对路径。
//! 2. 描述模块元数据（处理类、渲染方法、动作表等）的结构。
//! 3. 按照动作表中的参数来源从请求上下文中提取参数，并应用转换器。

use std::{
    collections::HashMap,
    path::{Component, Path},
};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    context::ModuleContext,
    exception::Exception,
    param::{DEFAULT_RENDER_METHOD, DEFAULT_UPDATE_CONTEXT_METHOD},
};

lazy_static! {
    static ref DISALLOWED_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_\-/\\]").unwrap();
    static ref SEPARATOR_RUNS: Regex = Regex::new(r"[/\\]+").unwrap();
}

/// 规范化模块名。
///
/// 不在白名单内的字符会被直接丢弃；反斜杠视为分隔符；连续的分隔符折叠为一个 `/`，
/// 首尾的分隔符被去掉。结果为空表示没有可用的模块名。
///
/// ```
/// use modserver::module::normalize_module_name;
/// assert_eq!(normalize_module_name("//foo//bar/"), "foo/bar");
/// assert_eq!(normalize_module_name("../../etc/passwd"), "etc/passwd");
/// ```
pub fn normalize_module_name(raw: &str) -> String {
    let filtered = DISALLOWED_CHARS.replace_all(raw, "");
    let collapsed = SEPARATOR_RUNS.replace_all(&filtered, "/");
    collapsed.trim_matches('/').to_string()
}

/// 判断模块目录内的相对文件名是否安全（不允许绝对路径和 `..`）
pub fn is_safe_relative_path(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// 动作参数的来源
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ArgSource {
    Query,
    Body,
    Header,
    Cookie,
    Var,
    Config,
    /// 直接使用 `default` 作为参数值
    Literal,
}

impl ArgSource {
    fn parse(source: &str) -> Option<Self> {
        match source {
            "query" => Some(ArgSource::Query),
            "body" => Some(ArgSource::Body),
            "header" => Some(ArgSource::Header),
            "cookie" => Some(ArgSource::Cookie),
            "var" => Some(ArgSource::Var),
            "config" => Some(ArgSource::Config),
            "literal" => Some(ArgSource::Literal),
            _ => None,
        }
    }
}

/// 单个动作参数的描述
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub source: ArgSource,
    pub key: String,
    pub default: Option<Value>,
    pub transform: Option<String>,
}

#[derive(Deserialize)]
struct FullArgSpec {
    source: ArgSource,
    #[serde(default)]
    key: String,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    transform: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawArgSpec {
    // "source:key|transform"
    Short(String),
    Full(FullArgSpec),
}

impl<'de> Deserialize<'de> for ArgSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawArgSpec::deserialize(deserializer)? {
            RawArgSpec::Short(s) => ArgSpec::parse_short(&s).map_err(serde::de::Error::custom),
            RawArgSpec::Full(full) => Ok(ArgSpec {
                source: full.source,
                key: full.key,
                default: full.default,
                transform: full.transform.filter(|t| !t.is_empty()),
            }),
        }
    }
}

impl ArgSpec {
    /// 解析 `source:key|transform` 形式的简写
    pub fn parse_short(s: &str) -> Result<Self, String> {
        let (spec, transform) = match s.split_once('|') {
            Some((spec, t)) => (spec, Some(t.trim().to_string())),
            None => (s, None),
        };
        let (source, key) = spec.split_once(':').unwrap_or((spec, ""));
        let source = ArgSource::parse(source.trim())
            .ok_or_else(|| format!("未知的参数来源：{}", source))?;
        let key = key.trim().to_string();
        let default = match source {
            ArgSource::Literal => Some(Value::String(key.clone())),
            _ => None,
        };
        Ok(ArgSpec {
            source,
            key,
            default,
            transform: transform.filter(|t| !t.is_empty()),
        })
    }

    /// 从模块上下文中取出参数值，缺失时使用默认值（没有默认值则为 null），再应用转换器
    pub fn extract(&self, ctx: &ModuleContext) -> Result<Value, Exception> {
        let request = ctx.request();
        let found = match self.source {
            ArgSource::Query => request.query(&self.key).map(|v| Value::String(v.to_string())),
            ArgSource::Body => request.body(&self.key).cloned(),
            ArgSource::Header => request.header(&self.key).map(|v| Value::String(v.to_string())),
            ArgSource::Cookie => request.cookie(&self.key).map(|v| Value::String(v.to_string())),
            ArgSource::Var => ctx.var(&self.key).cloned(),
            ArgSource::Config => ctx.config(&self.key).cloned(),
            ArgSource::Literal => None,
        };
        let value = found
            .or_else(|| self.default.clone())
            .unwrap_or(Value::Null);
        match &self.transform {
            Some(name) => apply_transform(name, value),
            None => Ok(value),
        }
    }
}

/// 内置的参数转换器。无法转换的值变为 null，未知的转换器名属于元数据错误。
pub fn apply_transform(name: &str, value: Value) -> Result<Value, Exception> {
    let text = match &value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    };
    let result = match name {
        "int" => match &value {
            Value::Number(n) if n.is_i64() => value.clone(),
            _ => text
                .and_then(|t| t.parse::<i64>().ok())
                .map(Value::from)
                .unwrap_or(Value::Null),
        },
        "float" => text
            .and_then(|t| t.parse::<f64>().ok())
            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
            .unwrap_or(Value::Null),
        "bool" => match &value {
            Value::Bool(_) => value.clone(),
            Value::Null => Value::Bool(false),
            _ => match text.as_deref().map(str::to_lowercase).as_deref() {
                Some("1") | Some("true") | Some("yes") | Some("on") => Value::Bool(true),
                _ => Value::Bool(false),
            },
        },
        "trim" => map_string(value, |s| s.trim().to_string()),
        "lower" => map_string(value, |s| s.to_lowercase()),
        "upper" => map_string(value, |s| s.to_uppercase()),
        "json" => match &value {
            Value::String(s) => serde_json::from_str(s).unwrap_or(Value::Null),
            _ => value.clone(),
        },
        other => {
            return Err(Exception::InvalidMetadata(format!("未知的参数转换器：{}", other)));
        }
    };
    Ok(result)
}

fn map_string<F: Fn(&str) -> String>(value: Value, f: F) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }
}

/// 动作表中的单个动作
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub method: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub args: Vec<ArgSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

// XML 中只有一个子元素时不会形成数组
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(v) => v,
        OneOrMany::One(t) => vec![t],
    })
}

/// 模块元数据，对应模块目录下的 `module.{json,toml,xml,ini}`
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ModuleMeta {
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    render_method: Option<String>,
    #[serde(default)]
    update_context_method: Option<String>,
    #[serde(default)]
    default_action: Option<String>,
    #[serde(default)]
    view: Option<String>,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    actions: HashMap<String, ActionSpec>,
}

impl ModuleMeta {
    pub fn from_value(value: Value) -> Result<Self, Exception> {
        let meta: ModuleMeta = serde_json::from_value(value)
            .map_err(|e| Exception::InvalidMetadata(e.to_string()))?;
        if let Some(view) = meta.view() {
            if !is_safe_relative_path(view) {
                return Err(Exception::InvalidMetadata(format!("非法的视图路径：{}", view)));
            }
        }
        Ok(meta)
    }

    pub fn class(&self) -> Option<&str> {
        non_empty(&self.class)
    }

    pub fn render_method(&self) -> &str {
        non_empty(&self.render_method).unwrap_or(DEFAULT_RENDER_METHOD)
    }

    pub fn update_context_method(&self) -> &str {
        non_empty(&self.update_context_method).unwrap_or(DEFAULT_UPDATE_CONTEXT_METHOD)
    }

    pub fn default_action(&self) -> Option<&str> {
        non_empty(&self.default_action)
    }

    pub fn view(&self) -> Option<&str> {
        non_empty(&self.view)
    }

    /// 模块配置，未配置时为空对象
    pub fn config(&self) -> Value {
        match &self.config {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        }
    }

    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.get(name)
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
