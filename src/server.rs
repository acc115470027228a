// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接处理
//!
//! 每个 TCP 连接只处理一个请求：读取完整报文，解析后交给 `Application` 分发，
//! 最后写回响应并关闭连接。模块处理器是同步代码，因此在 `spawn_blocking` 中运行。

use std::{future::Future, sync::Arc, time::Instant};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
};

use crate::{
    application::Application,
    context::RequestContext,
    exception::Exception,
    param::HttpRequestMethod,
    request::Request,
    response::Response,
};

const BUFFER_SIZE: usize = 1024;
/// 请求头部分允许的最大字节数，不计入 `max_body_size`
const MAX_HEADER_SIZE: usize = 8 * 1024;

/// 持续接受连接直到 `shutdown` 完成
pub async fn serve<F>(listener: TcpListener, app: Arc<Application>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut id: u128 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("接收到停机信号，停止接受新的连接");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((mut stream, addr)) => {
                    debug!("新的连接：{}", addr);
                    debug!("[ID{}]TCP连接已建立", id);
                    let app = Arc::clone(&app);
                    tokio::spawn(async move {
                        handle_connection(&mut stream, id, app).await;
                    });
                    id += 1;
                }
                Err(e) => {
                    error!("接受TCP连接时遇到错误：{}", e);
                }
            }
        }
    }
}

/// 处理单个连接上的一个请求
pub async fn handle_connection<S>(stream: &mut S, id: u128, app: Arc<Application>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limit = MAX_HEADER_SIZE + app.config().max_body_size();
    let buffer = match read_message(stream, limit).await {
        Ok(Some(b)) if b.is_empty() => return, // 客户端主动关闭连接
        Ok(b) => b,
        Err(e) => {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            return;
        }
    };
    debug!("[ID{}]HTTP请求接收完毕", id);

    let start_time = Instant::now();

    let response = match buffer {
        None => {
            warn!("[ID{}]请求报文超过{}字节，返回413", id, limit);
            Response::from_exception(&Exception::PayloadTooLarge, None, id)
        }
        Some(buffer) => match Request::try_from(&buffer, id) {
            Ok(request) => {
                debug!("[ID{}]成功解析HTTP请求", id);
                let response = dispatch(&request, id, &app).await;
                info!(
                    "[ID{}] {}, {}, {}, {}, {}, {}, ",
                    id,
                    request.version(),
                    request.path(),
                    request.method(),
                    response.status_code(),
                    response.information(),
                    request.user_agent(),
                );
                response
            }
            Err(e) => {
                warn!("[ID{}]解析HTTP请求失败：{}，返回{}", id, e, e.status_code());
                Response::from_exception(&e, None, id)
            }
        },
    };

    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );

    let response_bytes = response.as_bytes();
    debug!("[ID{}]发送响应，长度: {}", id, response_bytes.len());
    if let Err(e) = stream.write_all(&response_bytes).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    let _ = stream.flush().await;
}

async fn dispatch(request: &Request, id: u128, app: &Arc<Application>) -> Response {
    if request.method() == HttpRequestMethod::Options {
        return Response::response_options();
    }

    let ctx = RequestContext::from_request(request);
    let app = Arc::clone(app);
    let result = tokio::task::spawn_blocking(move || app.run(ctx, id)).await;

    match result {
        Ok(Ok(rendered)) => Response::from_rendered(&rendered, request, id),
        Ok(Err(e)) => {
            if e.is_not_found() {
                warn!("[ID{}]{}，返回404", id, e);
            } else {
                error!("[ID{}]处理请求时发生异常：{}", id, e);
            }
            Response::from_exception(&e, Some(request), id)
        }
        Err(e) => {
            error!("[ID{}]模块处理线程异常退出：{}", id, e);
            Response::response_500(request, id)
        }
    }
}

/// 读取一个完整的 HTTP 报文；报文长度超过 `limit` 时返回 `None`
async fn read_message<S>(stream: &mut S, limit: usize) -> std::io::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(BUFFER_SIZE);
    let mut chunk = [0u8; BUFFER_SIZE];
    loop {
        match Request::message_length(&buffer) {
            Some(length) if length > limit => return Ok(None),
            Some(length) if buffer.len() >= length => break,
            None if buffer.len() > limit => return Ok(None),
            _ => {}
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    Ok(Some(buffer))
}
