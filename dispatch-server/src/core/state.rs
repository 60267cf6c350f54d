use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, Result, ServerError};
use crate::couriers::CourierService;
use crate::db::{DispatchStorage, SeedData};
use crate::dispatch::DispatchController;
use crate::notify::SessionRegistry;
use crate::orders::OrderService;
use crate::pricing::{FeeCalculator, HttpRoadDistance, ProviderError, RoadDistanceProvider};
use crate::utils::logger::DISPATCH_TARGET;

/// 会话统计日志间隔
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// 服务器状态 - 持有所有服务的共享引用
///
/// 所有字段都是 Arc 或内部 Arc 的句柄，Clone 成本极低。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | storage | redb 存储 |
/// | registry | 骑手会话注册表 (通知通道) |
/// | dispatch | 派单控制器 (波次 + 计时器) |
/// | orders | 下单 / 取消 / 状态流转 |
/// | couriers | 骑手位置与在线状态 |
#[derive(Clone, Debug)]
pub struct ServerState {
    pub config: Config,
    pub storage: DispatchStorage,
    pub registry: SessionRegistry,
    pub dispatch: DispatchController,
    pub orders: OrderService,
    pub couriers: CourierService,
    /// 进程启动时间 (health 使用)
    pub started_at: Instant,
}

impl ServerState {
    /// 组装所有服务
    ///
    /// 道路距离服务可选；未配置时配送费只用直线距离。
    pub fn new(
        config: Config,
        storage: DispatchStorage,
        road_distance: Option<Arc<dyn RoadDistanceProvider>>,
    ) -> Self {
        let registry = SessionRegistry::new(config.broadcast_fallback);
        let dispatch = DispatchController::new(
            storage.clone(),
            Arc::new(registry.clone()),
            config.dispatch.clone(),
        );
        let fees = Arc::new(FeeCalculator::new(config.fees.clone(), road_distance));
        let orders = OrderService::new(
            storage.clone(),
            dispatch.clone(),
            fees,
            config.default_service_radius_km,
        );
        let couriers = CourierService::new(storage.clone(), config.location_throttle);

        Self {
            config,
            storage,
            registry,
            dispatch,
            orders,
            couriers,
            started_at: Instant::now(),
        }
    }

    /// 初始化服务器状态
    ///
    /// 1. 创建工作目录
    /// 2. 打开数据库 (work_dir/database/dispatch.redb)
    /// 3. 导入种子数据 (SEED_FILE)
    /// 4. 构建道路距离客户端
    pub fn initialize(config: &Config) -> Result<Self> {
        let db_path = config.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let storage = DispatchStorage::open(&db_path)?;
        tracing::info!(path = %db_path.display(), "Database opened");

        if let Some(seed_file) = &config.seed_file {
            let seed = SeedData::from_file(seed_file)
                .map_err(|e| ServerError::Seed(format!("{seed_file}: {e}")))?;
            let summary = seed.apply(&storage)?;
            tracing::info!(
                file = %seed_file,
                sellers = summary.sellers,
                couriers = summary.couriers,
                products = summary.products,
                "Seed data loaded"
            );
        }

        let road_distance: Option<Arc<dyn RoadDistanceProvider>> =
            match HttpRoadDistance::from_config(&config.routing) {
                Ok(client) => {
                    tracing::info!("Road-distance provider configured");
                    Some(Arc::new(client))
                }
                Err(ProviderError::Unconfigured) => {
                    tracing::info!("Road-distance provider not configured, using straight-line distance");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Road-distance client unavailable, using straight-line distance");
                    None
                }
            };

        Ok(Self::new(config.clone(), storage, road_distance))
    }

    /// 内存数据库 + 直线距离 (测试用)
    pub fn in_memory(config: Config) -> Result<Self> {
        let storage = DispatchStorage::open_in_memory()?;
        Ok(Self::new(config, storage, None))
    }

    /// 启动后台任务
    ///
    /// - dispatch_recovery (Warmup): 重新挂载重启前仍在进行的波次
    /// - session_stats (Periodic): 定期输出会话与波次统计
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let dispatch = self.dispatch.clone();
        tasks.spawn("dispatch_recovery", TaskKind::Warmup, async move {
            match dispatch.recover().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(target: DISPATCH_TARGET, orders = n, "Dispatch recovery finished"),
                Err(e) => tracing::error!(target: DISPATCH_TARGET, error = %e, "Dispatch recovery failed"),
            }
        });

        let registry = self.registry.clone();
        let dispatch = self.dispatch.clone();
        tasks.spawn_periodic("session_stats", STATS_INTERVAL, move || {
            let sessions = registry.session_count();
            let couriers = registry.online_couriers();
            let waves = dispatch.active_waves();
            async move {
                tracing::debug!(sessions, couriers, waves, "Session stats");
            }
        });

        tasks.log_summary();
        tasks
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
