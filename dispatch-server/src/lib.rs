//! Dispatch Server - 订单下单、库存预留与骑手派单
//!
//! # 架构概述
//!
//! - **订单** (`orders`): 下单校验、库存预留与回滚、取消、状态流转
//! - **派单** (`dispatch`): 分波次推送 (priority → expanded)、超时升级、单一赢家接单
//! - **通知** (`notify`): 骑手会话注册表，离线报价回放
//! - **计价** (`pricing`): 按距离计算配送费，道路距离失败时回退到直线距离
//! - **存储** (`db`): 嵌入式 redb，条件更新在单个写事务内完成
//! - **HTTP / WebSocket** (`api`)
//!
//! # 模块结构
//!
//! ```text
//! dispatch-server/src/
//! ├── core/          # 配置、状态、错误、后台任务、服务器
//! ├── api/           # HTTP 路由和 WebSocket 会话
//! ├── orders/        # 下单与库存账本
//! ├── dispatch/      # 派单控制器、接单仲裁、波次计时器
//! ├── notify/        # 通知通道
//! ├── couriers/      # 骑手位置与在线状态
//! ├── pricing/       # 金额、道路距离、配送费
//! ├── geo/           # 球面距离与半径匹配
//! ├── db/            # 存储与种子数据
//! └── utils/         # 日志、参数校验
//! ```

pub mod api;
pub mod core;
pub mod couriers;
pub mod db;
pub mod dispatch;
pub mod geo;
pub mod notify;
pub mod orders;
pub mod pricing;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use db::DispatchStorage;
pub use dispatch::{DispatchConfig, DispatchController};
pub use notify::{NotificationTransport, SessionRegistry};
pub use orders::OrderService;
pub use utils::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

/// 设置运行环境: 加载 .env，创建工作目录，初始化日志
///
/// 在 [`Config::from_env`] 之前调用，保证 .env 中的变量生效。
pub fn setup_environment() -> anyhow::Result<Config> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    let log_dir = config.log_dir();
    let file_logging = std::fs::create_dir_all(&log_dir).is_ok();
    let log_dir = log_dir.to_string_lossy().into_owned();

    init_logger_with_file(
        &config.log_level,
        config.log_json,
        file_logging.then_some(log_dir.as_str()),
    )?;

    if !file_logging {
        tracing::warn!(dir = %log_dir, "Log directory not writable, console logging only");
    }
    Ok(config)
}

pub fn print_banner() {
    println!(
        r#"
    ____  _                  __       __
   / __ \(_)________  ____ _/ /______/ /_
  / / / / / ___/ __ \/ __ `/ __/ ___/ __ \
 / /_/ / (__  ) /_/ / /_/ / /_/ /__/ / / /
/_____/_/____/ .___/\__,_/\__/\___/_/ /_/
            /_/
    "#
    );
}
