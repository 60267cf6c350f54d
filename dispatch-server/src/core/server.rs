//! Server Implementation
//!
//! HTTP / WebSocket 服务器启动和关闭

use std::time::Duration;

use tokio::net::TcpListener;

use crate::api;
use crate::core::{Config, Result, ServerState};

/// 后台任务关闭等待时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// HTTP Server
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// 使用已有状态创建 (main 中先初始化状态以便提前报告错误)
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config)?,
        };

        let tasks = state.start_background_tasks();

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Dispatch server listening on {}", addr);

        let app = api::build_app(state.clone());
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        };

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        // 先停计时器，避免关闭期间触发新的波次
        state.dispatch.shutdown();
        tasks.shutdown(SHUTDOWN_GRACE).await;

        served?;
        Ok(())
    }
}
