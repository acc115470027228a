// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::{fs, io, path::Path};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::{param::STATUS_CODES, resolver::lookup};

lazy_static! {
    // {{{ raw }}} 不转义，{{ name }} 做 HTML 转义
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\{\s*([\w.\-]+)\s*\}\}\}|\{\{\s*([\w.\-]+)\s*\}\}").unwrap();
}

/// 用于生成错误页面的简单 HTML 构造器
pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = match note {
            Some(n) => n,
            None => STATUS_CODES.get(&code).copied().unwrap_or("Unknown Status"),
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code, description
        );
        Self { title, css, body }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <!-- 本文件由modserver自动生成 -->
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

/// 将模板中的 `{{ key }}` 替换为 `data` 中对应的值。
///
/// 键可以是点分隔的路径；字符串原样输出，其他值输出为 JSON，缺失的键替换为空串。
pub fn render_template(template: &str, data: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let (key, escape) = match (caps.get(1), caps.get(2)) {
                (Some(raw), _) => (raw.as_str(), false),
                (None, Some(name)) => (name.as_str(), true),
                (None, None) => return String::new(),
            };
            let text = match lookup(data, key) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            if escape {
                html_escape::encode_safe(&text).to_string()
            } else {
                text
            }
        })
        .into_owned()
}

pub fn render_file(path: &Path, data: &Value) -> io::Result<String> {
    let template = fs::read_to_string(path)?;
    Ok(render_template(&template, data))
}
