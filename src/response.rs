// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use crate::{
    application::Rendered,
    exception::Exception,
    param::*,
    request::Request,
    view::HtmlBuilder,
};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error, warn};

use std::io::{self, Write};

// 这些响应头由服务器负责，模块设置的同名头会被忽略
const RESERVED_HEADERS: [&str; 5] = [
    "content-length",
    "content-encoding",
    "content-type",
    "date",
    "server",
];

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    content_length: u64,
    date: DateTime<Utc>,
    content_encoding: Option<HttpEncoding>,
    server_name: String,
    allow: Option<Vec<HttpRequestMethod>>,
    headers: Vec<(String, String)>,
    content: Option<Bytes>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            content_length: 0,
            date: Utc::now(),
            content_encoding: None,
            server_name: SERVER_NAME.to_string(),
            allow: None,
            headers: Vec::new(),
            content: None,
        }
    }

    /// 由模块的渲染结果构建响应
    pub fn from_rendered(rendered: &Rendered, request: &Request, id: u128) -> Self {
        let mut response = Self::new();
        response.set_code(rendered.status());
        for (name, value) in rendered.response().headers() {
            if RESERVED_HEADERS.contains(&name.to_lowercase().as_str()) {
                warn!("[ID{}]模块试图设置保留的响应头{}，已忽略", id, name);
                continue;
            }
            response.headers.push((name.clone(), value.clone()));
        }

        // 204 与 304 不允许携带响应体
        if response.status_code == 204 || response.status_code == 304 {
            return response;
        }

        let headonly = request.method() == HttpRequestMethod::Head;
        let content_type = rendered.content_type();
        response.set_body(
            rendered.body().as_bytes().to_vec(),
            content_type,
            request.accept_encoding(),
            headonly,
            id,
        );
        response
    }

    /// 生成状态码对应的错误页面
    pub fn from_status_code(
        code: u16,
        accept_encoding: &[HttpEncoding],
        headonly: bool,
        id: u128,
    ) -> Self {
        let mut response = Self::new();
        response.set_code(code);
        let note = match code {
            404 => Some(r"<h2>噢！</h2><p>你请求的模块无法找到。</p>"),
            405 => Some(r"<h2>噢！</h2><p>本服务器仅支持GET、HEAD、POST与OPTIONS方法。</p>"),
            413 => Some(r"<h2>噢！</h2><p>请求体过大。</p>"),
            500 => Some(r"<h2>噢！</h2><p>服务器出现了一个内部错误。</p>"),
            _ => None,
        };
        let content = HtmlBuilder::from_status_code(code, note).build();
        response.set_body(
            content.into_bytes(),
            CONTENT_TYPE_HTML,
            accept_encoding,
            headonly,
            id,
        );
        response
    }

    /// 将分发或解析过程中的异常转换为错误响应
    pub fn from_exception(e: &Exception, request: Option<&Request>, id: u128) -> Self {
        let code = e.status_code();
        let (accept_encoding, headonly) = match request {
            Some(r) => (
                r.accept_encoding().clone(),
                r.method() == HttpRequestMethod::Head,
            ),
            None => (Vec::new(), false),
        };
        let mut response = Self::from_status_code(code, &accept_encoding, headonly, id);
        if code == 405 {
            response.allow = Some(ALLOWED_METHODS.to_vec());
        }
        response
    }

    /// OPTIONS 请求的响应
    pub fn response_options() -> Self {
        let mut response = Self::new();
        response.set_code(204);
        response.allow = Some(ALLOWED_METHODS.to_vec());
        response
    }

    pub fn response_500(request: &Request, id: u128) -> Self {
        let accept_encoding = request.accept_encoding().to_vec();
        let headonly = request.method() == HttpRequestMethod::Head;
        Self::from_status_code(500, &accept_encoding, headonly, id)
    }

    fn set_body(
        &mut self,
        data: Vec<u8>,
        content_type: &str,
        accept_encoding: &[HttpEncoding],
        headonly: bool,
        id: u128,
    ) {
        self.content_type = Some(content_type.to_string());
        let encoding = if data.is_empty() || !is_compressible(content_type) {
            None
        } else {
            decide_encoding(accept_encoding)
        };
        // HEAD 与 GET 的响应头一致，因此先压缩再丢弃响应体
        let result = compress(&data, encoding);
        let (data, encoding) = compressed_or_original(data, encoding, result, id);
        self.content_encoding = encoding;
        self.content_length = data.len() as u64;
        if headonly {
            debug!("[ID{}]请求方法为HEAD，不发送响应体", id);
            self.content = None;
        } else {
            self.content = Some(Bytes::from(data));
        }
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        match STATUS_CODES.get(&code) {
            Some(&information) => {
                self.status_code = code;
                self.information = information.to_string();
            }
            None => {
                error!("非法的状态码：{}，改为500", code);
                self.status_code = 500;
                self.information = "Internal Server Error".to_string();
            }
        }
        self
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        if let Some(t) = &self.content_type {
            header.push_str(&format!("Content-Type: {}{}", t, CRLF));
        }
        if let Some(e) = self.content_encoding {
            header.push_str(&format!("Content-Encoding: {}{}", e, CRLF));
        }
        header.push_str(&format!("Content-Length: {}{}", self.content_length, CRLF));
        header.push_str(&format!("Date: {}{}", format_date(&self.date), CRLF));
        header.push_str(&format!("Server: {}{}", self.server_name, CRLF));
        header.push_str(&format!("Connection: close{}", CRLF));
        if let Some(allow) = &self.allow {
            let methods: Vec<String> = allow.iter().map(|m| m.to_string()).collect();
            header.push_str(&format!("Allow: {}{}", methods.join(", "), CRLF));
        }
        for (name, value) in &self.headers {
            header.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        header.push_str(CRLF);
        [
            header.as_bytes(),
            match &self.content {
                Some(c) => c,
                None => b"",
            },
        ]
        .concat()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn content_encoding(&self) -> Option<HttpEncoding> {
        self.content_encoding
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn compress(data: &[u8], mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Br) => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
        None => return Ok(data.to_vec()),
    };

    if let Ok(ref compressed) = result {
        debug!(
            "压缩完成: {:?}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }
    result
}

// 压缩失败时退回未压缩的原始数据
fn compressed_or_original(
    data: Vec<u8>,
    encoding: Option<HttpEncoding>,
    result: io::Result<Vec<u8>>,
    id: u128,
) -> (Vec<u8>, Option<HttpEncoding>) {
    match result {
        Ok(compressed) => (compressed, encoding),
        Err(e) => {
            error!("[ID{}]压缩响应体失败：{}，改为发送未压缩的数据", id, e);
            (data, None)
        }
    }
}

fn is_compressible(content_type: &str) -> bool {
    let content_type = content_type.to_lowercase();
    content_type.starts_with("text/")
        || content_type.starts_with("application/json")
        || content_type.starts_with("application/javascript")
        || content_type.starts_with("application/xml")
}

// 优先级：gzip > deflate > br，Brotli 压缩较慢，只在客户端仅支持它时使用
fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else if accept_encoding.contains(&HttpEncoding::Br) {
        Some(HttpEncoding::Br)
    } else {
        None
    }
}
