//! 骑手会话注册表
//!
//! # 架构
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    SessionRegistry                        │
//! │  sessions: courier_key ─▶ [Session(mpsc::Sender), ...]    │
//! │  pending:  courier_key ─▶ { order_id ─▶ OrderOffer }      │
//! │  general:  broadcast::Sender<ServerEvent>  (fallback)     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! - 一个骑手可以有多个会话（多设备），报价推送到全部会话
//! - 无会话时报价进入 pending，重连时回放
//! - 通用广播通道默认关闭，只在目标没有任何会话时使用
//!
//! Every key goes through [`normalize_identity`], so `" Courier-7 "` and
//! `"courier-7"` reach the same sessions.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use shared::message::{OfferOutcome, OrderOffer, ServerEvent};
use shared::util::normalize_identity;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::{DeliveryReport, NotificationTransport};

/// Per-session outbound buffer
const SESSION_CHANNEL_CAPACITY: usize = 64;

/// General channel capacity
const GENERAL_CHANNEL_CAPACITY: usize = 256;

/// One live connection
#[derive(Debug)]
struct Session {
    id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
}

/// Returned by [`SessionRegistry::register`]; owned by the connection task
#[derive(Debug)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub courier_key: String,
    pub rx: mpsc::Receiver<ServerEvent>,
    /// Unresolved offers to replay right away
    pub replay: Vec<OrderOffer>,
}

#[derive(Debug)]
struct RegistryInner {
    sessions: DashMap<String, Vec<Session>>,
    pending: DashMap<String, DashMap<String, OrderOffer>>,
    general: broadcast::Sender<ServerEvent>,
    broadcast_fallback: bool,
}

/// 会话注册表 (Clone 共享同一份状态)
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(broadcast_fallback: bool) -> Self {
        let (general, _) = broadcast::channel(GENERAL_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RegistryInner {
                sessions: DashMap::new(),
                pending: DashMap::new(),
                general,
                broadcast_fallback,
            }),
        }
    }

    /// Register a new session for a courier
    pub fn register(&self, courier_id: &str) -> SessionHandle {
        let courier_key = normalize_identity(courier_id);
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let session_id = Uuid::new_v4();

        self.inner
            .sessions
            .entry(courier_key.clone())
            .or_default()
            .push(Session { id: session_id, tx });

        let mut replay: Vec<OrderOffer> = self
            .inner
            .pending
            .get(&courier_key)
            .map(|offers| offers.iter().map(|e| e.value().clone()).collect())
            .unwrap_or_default();
        replay.sort_by_key(|o| o.offered_at);

        tracing::info!(
            courier = %courier_key,
            session = %session_id,
            replay = replay.len(),
            "Courier session registered"
        );

        SessionHandle {
            session_id,
            courier_key,
            rx,
            replay,
        }
    }

    /// Remove one session; the courier stays reachable through its others
    pub fn unregister(&self, courier_key: &str, session_id: Uuid) {
        let key = normalize_identity(courier_key);
        let now_empty = match self.inner.sessions.get_mut(&key) {
            Some(mut list) => {
                list.retain(|s| s.id != session_id);
                list.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.inner.sessions.remove_if(&key, |_, list| list.is_empty());
        }
        tracing::info!(courier = %key, session = %session_id, "Courier session closed");
    }

    /// Receiver on the general channel (`/ws/general`)
    pub fn subscribe_general(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.general.subscribe()
    }

    /// Total live sessions
    pub fn session_count(&self) -> usize {
        self.inner.sessions.iter().map(|e| e.value().len()).sum()
    }

    /// Couriers with at least one live session
    pub fn online_couriers(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Unresolved offers remembered for a courier, oldest first
    pub fn pending_offers(&self, courier_id: &str) -> Vec<OrderOffer> {
        let key = normalize_identity(courier_id);
        let mut offers: Vec<OrderOffer> = self
            .inner
            .pending
            .get(&key)
            .map(|m| m.iter().map(|e| e.value().clone()).collect())
            .unwrap_or_default();
        offers.sort_by_key(|o| o.offered_at);
        offers
    }

    /// Hand an event to every live session of `key`, pruning closed ones.
    ///
    /// Never awaits while holding the map guard: a full session buffer drops
    /// the event for that session, and the pending store covers the gap on
    /// the next reconnect.
    fn deliver(&self, key: &str, event: &ServerEvent) -> usize {
        let Some(mut list) = self.inner.sessions.get_mut(key) else {
            return 0;
        };

        let mut delivered = 0;
        list.retain(|session| match session.tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(courier = %key, session = %session.id, "Session buffer full, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        let now_empty = list.is_empty();
        drop(list);

        if now_empty {
            self.inner.sessions.remove_if(key, |_, list| list.is_empty());
        }
        delivered
    }

    fn forget(&self, key: &str, order_id: &str) {
        if let Some(offers) = self.inner.pending.get(key) {
            offers.remove(order_id);
        }
        self.inner.pending.remove_if(key, |_, offers| offers.is_empty());
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl NotificationTransport for SessionRegistry {
    async fn send_offer(&self, courier_id: &str, offer: &OrderOffer) -> DeliveryReport {
        let key = normalize_identity(courier_id);

        // Keyed by order id: a re-sent offer replaces the old one
        self.inner
            .pending
            .entry(key.clone())
            .or_default()
            .insert(offer.order_id.clone(), offer.clone());

        let event = ServerEvent::NewOrder(offer.clone());
        let sessions = self.deliver(&key, &event);

        let broadcast = if sessions == 0 && self.inner.broadcast_fallback {
            self.inner.general.send(event).is_ok()
        } else {
            false
        };

        if sessions == 0 {
            tracing::debug!(
                courier = %key,
                order_id = %offer.order_id,
                broadcast,
                "Courier offline, offer queued for replay"
            );
        }

        DeliveryReport {
            sessions,
            queued: true,
            broadcast,
        }
    }

    async fn send_outcome(
        &self,
        courier_id: &str,
        order_id: &str,
        outcome: &OfferOutcome,
    ) -> DeliveryReport {
        let key = normalize_identity(courier_id);
        self.forget(&key, order_id);

        let sessions = self.deliver(&key, &ServerEvent::from_outcome(order_id, outcome));
        DeliveryReport {
            sessions,
            queued: false,
            broadcast: false,
        }
    }

    fn withdraw_offer(&self, courier_id: &str, order_id: &str) {
        self.forget(&normalize_identity(courier_id), order_id);
    }

    fn clear_pending(&self, order_id: &str) {
        for entry in self.inner.pending.iter() {
            entry.value().remove(order_id);
        }
        self.inner.pending.retain(|_, offers| !offers.is_empty());
    }

    fn is_reachable(&self, courier_id: &str) -> bool {
        let key = normalize_identity(courier_id);
        self.inner
            .sessions
            .get(&key)
            .is_some_and(|list| list.iter().any(|s| !s.tx.is_closed()))
    }
}
