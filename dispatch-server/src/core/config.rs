use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::DispatchConfig;
use crate::pricing::{FeeConfig, RoutingConfig};

/// 服务配置 - 调度服务的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/dispatch | 工作目录 (数据库、日志) |
/// | HTTP_PORT | 3000 | HTTP / WebSocket 端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 默认日志级别 (RUST_LOG 优先) |
/// | LOG_JSON | false | JSON 格式日志 |
/// | SEED_FILE | - | 启动时导入的种子数据 |
/// | PRIORITY_RADIUS_KM | 5 | 第一波半径 |
/// | EXPANDED_RADIUS_KM | 50 | 第二波半径 |
/// | WAVE_TIMEOUT_SECS | 30 | 每波超时 |
/// | ACK_TIMEOUT_SECS | 10 | 接单/拒单确认超时 |
/// | LOCATION_THROTTLE_SECS | 30 | 骑手位置写入最小间隔 |
/// | DEFAULT_SERVICE_RADIUS_KM | 10 | 商家默认服务半径 |
/// | FREE_DELIVERY_THRESHOLD | 0 | 免配送费门槛 (0 关闭) |
/// | DISTANCE_BASED_DELIVERY | true | 按距离计费 |
/// | BASE_DELIVERY_CHARGE | 40 | 起步价 |
/// | BASE_DELIVERY_DISTANCE_KM | 2 | 起步距离 |
/// | DELIVERY_KM_RATE | 10 | 超出部分每公里单价 |
/// | FLAT_DELIVERY_CHARGE | 40 | 固定配送费 |
/// | PLATFORM_FEE | 0 | 平台费 |
/// | ROUTING_API_URL | - | 道路距离服务地址 |
/// | ROUTING_API_KEY | - | 道路距离服务密钥 |
/// | ROUTING_TIMEOUT_MS | 3000 | 道路距离请求超时 |
/// | BROADCAST_FALLBACK | false | 骑手无会话时广播到公共频道 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/dispatch HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库和日志
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    /// 种子数据文件 (JSON)
    pub seed_file: Option<String>,
    /// 骑手位置写入节流
    pub location_throttle: Duration,
    /// 商家未设置半径时的默认值 (km)
    pub default_service_radius_km: f64,
    /// 公共频道兜底广播
    pub broadcast_fallback: bool,
    pub dispatch: DispatchConfig,
    pub fees: FeeConfig,
    pub routing: RoutingConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        let dispatch_defaults = DispatchConfig::default();
        let fee_defaults = FeeConfig::default();
        let routing_defaults = RoutingConfig::default();

        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/dispatch".into()),
            http_port: env_or("HTTP_PORT", 3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_or("LOG_JSON", false),
            seed_file: env_opt("SEED_FILE"),
            location_throttle: Duration::from_secs(env_or("LOCATION_THROTTLE_SECS", 30)),
            default_service_radius_km: env_or("DEFAULT_SERVICE_RADIUS_KM", 10.0),
            broadcast_fallback: env_or("BROADCAST_FALLBACK", false),
            dispatch: DispatchConfig {
                priority_radius_km: env_or("PRIORITY_RADIUS_KM", dispatch_defaults.priority_radius_km),
                expanded_radius_km: env_or("EXPANDED_RADIUS_KM", dispatch_defaults.expanded_radius_km),
                wave_timeout: Duration::from_secs(env_or(
                    "WAVE_TIMEOUT_SECS",
                    dispatch_defaults.wave_timeout.as_secs(),
                )),
                ack_timeout: Duration::from_secs(env_or(
                    "ACK_TIMEOUT_SECS",
                    dispatch_defaults.ack_timeout.as_secs(),
                )),
            },
            fees: FeeConfig {
                free_delivery_threshold: env_or("FREE_DELIVERY_THRESHOLD", fee_defaults.free_delivery_threshold),
                distance_based: env_or("DISTANCE_BASED_DELIVERY", fee_defaults.distance_based),
                base_charge: env_or("BASE_DELIVERY_CHARGE", fee_defaults.base_charge),
                base_distance_km: env_or("BASE_DELIVERY_DISTANCE_KM", fee_defaults.base_distance_km),
                km_rate: env_or("DELIVERY_KM_RATE", fee_defaults.km_rate),
                flat_charge: env_or("FLAT_DELIVERY_CHARGE", fee_defaults.flat_charge),
                platform_fee: env_or("PLATFORM_FEE", fee_defaults.platform_fee),
            },
            routing: RoutingConfig {
                api_url: env_opt("ROUTING_API_URL"),
                api_key: env_opt("ROUTING_API_KEY"),
                timeout: Duration::from_millis(env_or(
                    "ROUTING_TIMEOUT_MS",
                    routing_defaults.timeout.as_millis() as u64,
                )),
            },
        }
    }

    /// 使用自定义工作目录和端口
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 数据库文件路径
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database").join("dispatch.redb")
    }

    /// 日志目录
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
