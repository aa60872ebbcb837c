// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 静态文件服务器
//!
//! 读取配置、初始化日志，组装请求处理管道后在 Tokio 多线程运行时上开始监听。

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    process::ExitCode,
    sync::Arc,
};

use log::{error, info};
use tokio::{net::TcpListener, runtime::Builder};

use staticpipe::{server, Config, Pipeline};

const LOG_CONFIG: &str = "config/log4rs.yaml";
const SERVER_CONFIG: &str = "config/development.toml";

fn main() -> ExitCode {
    // 日志系统初始化失败时仍可运行，只是没有日志输出
    if let Err(e) = log4rs::init_file(LOG_CONFIG, Default::default()) {
        eprintln!("无法加载日志配置{}：{}", LOG_CONFIG, e);
    }

    let config = match Config::from_toml(SERVER_CONFIG) {
        Ok(config) => config,
        Err(e) => {
            error!("配置文件载入失败：{}", e);
            eprintln!("配置文件载入失败：{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("配置文件已载入");

    let pipeline = match Pipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("无法构建请求处理管道：{}", e);
            eprintln!("无法构建请求处理管道：{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("请求处理管道已就绪，共{}个阶段", pipeline.stages());

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("工作线程数：{}", config.worker_threads());

    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let socket = SocketAddrV4::new(address, config.port());

    let result = runtime.block_on(async move {
        let listener = TcpListener::bind(socket).await?;
        info!("服务端将在{}上监听Socket连接", socket);
        server::run(listener, Arc::new(pipeline), Arc::new(config)).await
    });
    match result {
        Ok(()) => {
            info!("服务器已停止");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("服务器异常退出：{}", e);
            ExitCode::FAILURE
        }
    }
}
