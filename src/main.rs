// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模块分发服务器
//!
//! 启动流程：初始化日志，载入配置，登记内置处理类，
//! 然后在 Tokio 多线程运行时上监听端口，直到收到 Ctrl-C。

use modserver::{builtin::register_builtins, server::serve, Application, Config, Registry};

use log::{error, info, warn};
use tokio::{net::TcpListener, runtime::Builder};

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::Arc,
};

fn main() {
    // 1. 日志系统通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 从 TOML 文件读取运行参数
    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");
    info!("模块根目录: {}", config.module_root().display());

    // 3. 根据配置的工作线程数构建运行时
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            error!("无法创建Tokio运行时：{}", e);
            return;
        }
    };

    // 4. 登记处理类
    let mut registry = Registry::new();
    register_builtins(&mut registry);
    info!("已登记的处理类：{}", registry.classes().join(", "));

    let port = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let app = Arc::new(Application::new(config, registry));
    match app.resolve_config("site") {
        Ok(site) => info!("站点配置：{}", site),
        Err(e) => warn!("未载入站点配置：{}", e),
    }

    runtime.block_on(async move {
        info!("服务端将在{}:{}上监听Socket连接", address, port);
        let listener = match TcpListener::bind(SocketAddrV4::new(address, port)).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("无法绑定端口：{}，错误：{}", port, e);
                return;
            }
        };
        info!("端口{}绑定完成", port);

        serve(listener, app, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("无法监听Ctrl-C信号：{}", e);
            }
        })
        .await;
        info!("服务器已停止");
    });
}
