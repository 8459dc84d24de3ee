use anyhow::Context;
use clap::Parser;
use deploygate::gateway::Gateway;
use deploygate::providers::ProviderResolver;
use deploygate::server;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "deploygate")]
#[command(about = "模型部署反向代理服务", long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, env = "DEPLOYGATE_CONFIG", default_value = "deploygate.yaml")]
    config: PathBuf,

    /// 监听地址
    #[arg(short, long, env = "DEPLOYGATE_BIND", default_value = "127.0.0.1:5000")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let addr: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("无效的监听地址: {}", args.bind))?;

    // 配置或任一端点无效时拒绝启动
    let gateway = Gateway::from_file(&args.config, ProviderResolver::builtin())
        .with_context(|| format!("无法从 {} 加载网关配置", args.config.display()))?;

    server::start_server(Arc::new(gateway), addr).await?;

    Ok(())
}
