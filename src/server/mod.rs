pub mod handlers;
pub mod streaming;

use crate::gateway::Gateway;
use crate::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// 启动 HTTP 服务器（带优雅关闭与 SIGHUP 重载）
pub async fn start_server(gateway: Arc<Gateway>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("deploygate 服务器运行在 http://{}", listener.local_addr()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(());

    #[cfg(unix)]
    spawn_reload_on_hangup(Arc::clone(&gateway));

    let server_handle = tokio::spawn(serve(listener, gateway, shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    if let Err(e) = server_handle.await {
        error!("等待服务器关闭时出错: {}", e);
    }

    info!("服务器已关闭");
    Ok(())
}

/// 接受连接直到收到关闭信号
pub async fn serve(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let io = TokioIo::new(stream);
                        let gateway = Arc::clone(&gateway);

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handlers::handle_request(req, Arc::clone(&gateway))
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!("服务连接错误: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("接受连接失败: {}", e);
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("收到关闭信号，停止接受新连接");
                break;
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("设置 Ctrl+C 信号处理失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("设置 SIGTERM 信号处理失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("收到 Ctrl+C 信号，开始优雅关闭..."),
        _ = terminate => warn!("收到 SIGTERM 信号，开始优雅关闭..."),
    }
}

/// 收到 SIGHUP 时重新读取配置文件；失败时继续使用旧路由表
#[cfg(unix)]
fn spawn_reload_on_hangup(gateway: Arc<Gateway>) {
    tokio::spawn(async move {
        let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                warn!("无法监听 SIGHUP，配置热重载不可用: {}", e);
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!("收到 SIGHUP 信号，重新加载配置");
            let gateway = Arc::clone(&gateway);
            if let Err(e) = tokio::task::spawn_blocking(move || gateway.reload()).await {
                error!("配置重载任务异常退出: {}", e);
            }
        }
    });
}
