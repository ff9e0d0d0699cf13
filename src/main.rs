// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 静态资源服务器
//!
//! 基于 Tokio 运行时的宿主程序，把 HTTP 请求交给 [`StaticEngine`] 处理：
//! - 小文件响应体直接来自引擎的内容缓存
//! - 大文件按 `chunk_size` 分块流式发送
//! - 后台管理控制台（CLI 指令交互），支持查看缓存统计、失效与热重载

use std::{
    io::SeekFrom,
    net::{Ipv4Addr, SocketAddrV4},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Instant,
};

use log::{debug, error, info, warn};
use tokio::{
    fs::File as TokioFile,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    runtime::Builder,
    sync::Notify,
};

use webstatic::{
    config::Config,
    engine::ConditionalHeaders,
    param::HttpRequestMethod,
    response::StreamRange,
    util::format_file_size,
    LogFacade, Request, Response, StaticEngine,
};

const CONFIG_FILE: &str = "config/development.toml";
const LOG_CONFIG_FILE: &str = "config/log4rs.yaml";

fn load_config() -> Config {
    match Config::from_toml(CONFIG_FILE) {
        Ok(config) => config,
        Err(e) => {
            error!("{}，使用默认配置", e);
            Config::new()
        }
    }
}

fn main() {
    if let Err(e) = log4rs::init_file(LOG_CONFIG_FILE, Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    let config = load_config();
    info!("配置文件已载入");
    info!("www root: {}", config.www_root());

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建Tokio运行时：{}", e);
            return;
        }
    };
    runtime.block_on(serve(config));
}

async fn serve(config: Config) {
    let engine = Arc::new(
        StaticEngine::builder(config.engine_config())
            .logger(Arc::new(LogFacade))
            .build(),
    );
    let chunk_size = config.chunk_size();

    let port = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    info!("服务端将在{}:{}上监听Socket连接", address, port);
    let listener = match TcpListener::bind(SocketAddrV4::new(address, port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            return;
        }
    };
    info!("端口{}绑定完成", port);

    let shutdown = Arc::new(Notify::new());
    let active_connection = Arc::new(AtomicU32::new(0));

    tokio::spawn(console(
        Arc::clone(&engine),
        Arc::clone(&shutdown),
        Arc::clone(&active_connection),
    ));

    let mut id: u128 = 0;
    loop {
        let (mut stream, addr) = tokio::select! {
            _ = shutdown.notified() => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("接受TCP连接失败：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let engine = Arc::clone(&engine);
        let active_connection = Arc::clone(&active_connection);
        tokio::spawn(async move {
            active_connection.fetch_add(1, Ordering::SeqCst);
            handle_connection(&mut stream, id, &engine, chunk_size).await;
            active_connection.fetch_sub(1, Ordering::SeqCst);
        });
        id += 1;
    }
}

/// # 管理控制台
///
/// 从标准输入读取运维指令。
async fn console(engine: Arc<StaticEngine>, shutdown: Arc<Notify>, active_connection: Arc<AtomicU32>) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let (cmd, arg) = match input.trim().split_once(' ') {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (input.trim(), ""),
        };
        match cmd {
            "" => {}
            "stop" => {
                shutdown.notify_one();
                println!("停机指令已激活，服务器将停止接受新连接...");
                break;
            }
            "help" => {
                println!("== Webserver Help ==");
                println!("stop              - 发出停机信号");
                println!("status            - 查看当前服务器运行状态");
                println!("stats             - 查看缓存统计（JSON）");
                println!("invalidate <path> - 失效某个请求路径的缓存");
                println!("reload            - 重新读取配置文件并应用映射");
                println!("help              - 显示此帮助信息");
                println!("====================");
            }
            "status" => {
                let stats = engine.cache_stats();
                println!("== Webserver 状态 ===");
                println!("当前活跃连接数: {}", active_connection.load(Ordering::SeqCst));
                println!(
                    "内容缓存: {}项，{}",
                    stats.content.items,
                    format_file_size(stats.content.byte_size)
                );
                println!("====================");
            }
            "stats" => match serde_json::to_string_pretty(&engine.cache_stats()) {
                Ok(json) => println!("{}", json),
                Err(e) => println!("无法序列化缓存统计：{}", e),
            },
            "invalidate" if !arg.is_empty() => match engine.invalidate_file(arg) {
                true => println!("已失效：{}", arg),
                false => println!("路径{}无法映射到任何文件", arg),
            },
            "reload" => match Config::from_toml(CONFIG_FILE) {
                Ok(config) => {
                    engine.replace_config(config.engine_config());
                    info!("配置已重新载入");
                    println!("配置已重新载入");
                }
                Err(e) => {
                    error!("重新载入配置失败：{}", e);
                    println!("重新载入配置失败：{}", e);
                }
            },
            _ => println!("无效的命令：{}", input.trim()),
        }
    }
}

/// # 连接处理器
///
/// 读取并解析请求，交给引擎得出结论，然后写出响应。
async fn handle_connection(stream: &mut TcpStream, id: u128, engine: &StaticEngine, chunk_size: usize) {
    let mut buffer = vec![0; 8192];
    let n = match stream.read(&mut buffer).await {
        Ok(0) => return,
        Ok(n) => n,
        Err(e) => {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            return;
        }
    };
    debug!("[ID{}]HTTP请求接收完毕", id);
    let start_time = Instant::now();

    let request = match Request::try_from(&buffer[..n], id) {
        Ok(request) => request,
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败：{}", id, e);
            let _ = stream.write_all(&Response::from_status_code(400, None).as_bytes()).await;
            return;
        }
    };

    let response = match request.method() {
        HttpRequestMethod::Options => Response::options(),
        HttpRequestMethod::Post => Response::from_status_code(405, None),
        method @ (HttpRequestMethod::Get | HttpRequestMethod::Head) => {
            let conditional = ConditionalHeaders {
                if_none_match: request.if_none_match(),
            };
            match engine
                .handle_request(request.path(), conditional, request.range())
                .await
            {
                Ok(result) => Response::from_serve(result, method == HttpRequestMethod::Head, id),
                Err(e) if method == HttpRequestMethod::Head => Response::from_lookup_error(&e, id).head_only(),
                Err(e) => Response::from_lookup_error(&e, id),
            }
        }
    };

    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );
    info!(
        "[ID{}] {}, {}, {}, {}, {}, {}",
        id,
        request.version(),
        request.path(),
        request.method(),
        response.status_code(),
        response.information(),
        request.user_agent(),
    );

    if let Err(e) = stream.write_all(&response.as_bytes()).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    if let Some(range) = response.stream() {
        match send_file(stream, range, chunk_size).await {
            Ok(sent) => debug!("[ID{}]流式传输完成，共发送 {} 字节", id, sent),
            Err(e) => error!("[ID{}]流式传输{}失败: {}", id, range.path.display(), e),
        }
    }
    let _ = stream.flush().await;
}

/// 把文件区间按块写入连接
async fn send_file(stream: &mut TcpStream, range: &StreamRange, chunk_size: usize) -> std::io::Result<u64> {
    let mut file = TokioFile::open(&range.path).await?;
    file.seek(SeekFrom::Start(range.offset)).await?;
    let mut reader = file.take(range.length);
    let mut buffer = vec![0u8; chunk_size];
    let mut total_sent = 0u64;
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&buffer[..n]).await?;
        total_sent += n as u64;
    }
    Ok(total_sent)
}
