// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体：
//! 1. 请求行（方法、目标、版本）的解析。
//! 2. 全部请求头的提取，以及 `Accept-Encoding` 的内容协商。
//! 3. 按 `Content-Length` 截取请求体。

use bytes::Bytes;
use log::error;

use crate::{exception::Exception, param::*};

const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone)]
pub struct Request {
    method: HttpRequestMethod,
    /// 请求目标（包含查询字符串）
    path: String,
    version: HttpVersion,
    user_agent: String,
    accept_encoding: Vec<HttpEncoding>,
    /// 按出现顺序保存的原始请求头
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// `buffer` 可以只包含请求头，此时请求体为空；请求体超出 `Content-Length` 的部分会被忽略。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let (head, body) = match find_header_end(buffer) {
            Some(end) => (&buffer[..end], &buffer[end + HEADER_END.len()..]),
            None => (buffer, &[][..]),
        };

        // 1. 请求头必须是合法的 UTF-8
        let head = match std::str::from_utf8(head) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut lines = head.split(CRLF);

        // 2. 解析请求行 (e.g., "GET /index?module=blog HTTP/1.1")
        let request_line = lines.next().unwrap_or("");
        let parts: Vec<&str> = request_line.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest);
        }

        let method = match HttpRequestMethod::parse(parts[0]) {
            Some(m) => m,
            None => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, parts[0]);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = parts[parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 路径中含有空格虽不规范，但仍尝试拼接恢复
        let path = parts[1..parts.len() - 1].join(" ");

        // 3. 解析请求头
        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) => {
                    headers.push((name.trim().to_string(), value.trim().to_string()));
                }
                None => {
                    error!("[ID{}]无法解析的请求头：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            }
        }

        let find = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        };

        let user_agent = find("user-agent").unwrap_or("").to_string();

        // 4. 解析 Accept-Encoding，只要包含关键词即视为支持
        let mut accept_encoding = vec![];
        if let Some(encoding) = find("accept-encoding") {
            if encoding.contains("gzip") {
                accept_encoding.push(HttpEncoding::Gzip);
            }
            if encoding.contains("deflate") {
                accept_encoding.push(HttpEncoding::Deflate);
            }
            if encoding.contains("br") {
                accept_encoding.push(HttpEncoding::Br);
            }
        }

        // 5. 请求体
        let content_length = match find("content-length") {
            Some(v) => match v.parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    error!("[ID{}]非法的Content-Length：{}", id, v);
                    return Err(Exception::MalformedRequest);
                }
            },
            None => 0,
        };
        let body = Bytes::copy_from_slice(&body[..content_length.min(body.len())]);

        Ok(Self {
            method,
            path,
            version,
            user_agent,
            accept_encoding,
            headers,
            body,
        })
    }

    /// 若缓冲区中的请求头已经完整，返回整个报文（请求头加请求体）应有的长度。
    ///
    /// 用于在读取 TCP 流时判断是否还需要继续读取。
    pub fn message_length(buffer: &[u8]) -> Option<usize> {
        let end = find_header_end(buffer)?;
        let head = String::from_utf8_lossy(&buffer[..end]);
        let content_length = head
            .split(CRLF)
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        // Content-Length 过大导致溢出时按最大值处理，由调用方拒绝
        Some(
            (end + HEADER_END.len())
                .checked_add(content_length)
                .unwrap_or(usize::MAX),
        )
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEADER_END.len())
        .position(|window| window == HEADER_END)
}

impl Request {
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取请求目标（含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// 获取客户端支持的压缩算法列表
    pub fn accept_encoding(&self) -> &Vec<HttpEncoding> {
        &self.accept_encoding
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
