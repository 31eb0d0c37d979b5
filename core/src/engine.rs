//! `TradingEngine`: wires every subsystem from §2's pipeline diagram into
//! one running system — `MarketDataCache`/`StreamSupervisor` feed finalized
//! bars through `StrategyEvaluator`, emitted signals pass through
//! `RiskGate` into `OrderExecutor`, fills update `PositionTracker` and
//! `StopOrchestrator`, and closed trades feed `RiskGate::record_trade_result`
//! and the per-strategy health ladder.
//!
//! The `StreamSupervisor` callback contract (§2) is synchronous, but the
//! pipeline downstream of it does async I/O (risk checks that may hit the
//! exchange, order submission, position sync). The callback only pushes
//! `(Symbol, Interval)` onto an unbounded channel; a dedicated task drains
//! it one bar at a time, which also gives us the serialized-per-strategy
//! evaluation order §5 requires without an explicit lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use talus_analytics::health::{HealthState, HealthThresholds, StrategyHealth};
use talus_analytics::rolling::RollingEvCalculator;
use talus_data::{source::MarketFeed, MarketDataCache, StreamSupervisor, SupervisorHandle};
use talus_execution::client::ExchangeClient;
use talus_execution::executor::OrderExecutor;
use talus_execution::order::OrderType;
use talus_execution::persistence::OrderStore;
use talus_execution::position::Position;
use talus_execution::stop::StopOrchestrator;
use talus_execution::tracker::PositionTracker;
use talus_execution::trade::{ClosedTrade, ExitReason};
use talus_integration::settings::{HealthSettings, RiskSettings as SettingsRiskSettings};
use talus_markets::{ExchangeId, Interval, InstrumentSpec, Side, Symbol};
use talus_risk::{AccountSnapshot, RiskGate, RiskSettings};
use talus_trader::signal::{Signal, SignalType};
use talus_trader::strategy::Strategy;

use crate::error::CoreError;
use crate::evaluator::{HealthGate, StrategyEvaluator};
use crate::health_store::HealthStore;

const FILL_POLL_ATTEMPTS: u32 = 3;
const FILL_POLL_INTERVAL: Duration = Duration::from_millis(120);
const SYNC_INTERVAL: Duration = Duration::from_secs(2);

/// The position side a signal's type corresponds to — for an exit this is
/// the side of the position being closed, not the order's buy/sell side.
fn position_side_for(signal_type: SignalType) -> Side {
    match signal_type {
        SignalType::EntryLong | SignalType::ExitLong => Side::Long,
        SignalType::EntryShort | SignalType::ExitShort => Side::Short,
    }
}

fn risk_settings_from(settings: &SettingsRiskSettings) -> RiskSettings {
    RiskSettings {
        per_trade: settings.per_trade,
        max_drawdown: settings.max_drawdown,
        max_consecutive_losses: settings.max_consecutive_losses,
        max_position_ratio: settings.max_position_ratio,
        max_stop_loss_percent: settings.max_stop_loss_percent,
        max_positions_per_symbol: settings.max_positions_per_symbol,
        margin_buffer: settings.margin_buffer,
    }
}

/// Per-strategy rolling EV + health state, consulted by the evaluator and
/// updated on every closed trade (§4.7). Implements [`HealthGate`] so the
/// evaluator never depends on `talus-analytics` directly.
struct HealthRegistry {
    thresholds: HealthThresholds,
    rolling: RollingEvCalculator,
    health: RwLock<HashMap<String, StrategyHealth>>,
    store: HealthStore,
}

impl HealthRegistry {
    fn new(settings: &HealthSettings, store: HealthStore) -> Self {
        HealthRegistry {
            thresholds: HealthThresholds {
                min_sample: settings.min_sample,
                max_consecutive_losses: settings.max_consecutive_losses,
                min_ev_negative_trades: settings.min_ev_negative_trades,
                ev_min: settings.ev_min,
            },
            rolling: RollingEvCalculator::new(100),
            health: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Registers a strategy, honoring any persisted state from a previous
    /// run (§4.7: "at startup, the evaluator honors them").
    fn register(&self, strategy_id: &str) {
        let restored = self.store.get(strategy_id).unwrap_or(HealthState::Enabled);
        self.health.write().insert(strategy_id.to_string(), StrategyHealth::restore(strategy_id, restored));
    }

    fn record_closed_trade(&self, trade: &ClosedTrade) {
        let metrics = self.rolling.record(trade.clone());
        let mut table = self.health.write();
        let entry = table
            .entry(trade.strategy_id.clone())
            .or_insert_with(|| StrategyHealth::new(trade.strategy_id.clone()));
        if entry.evaluate(&metrics, &self.thresholds) {
            if let Err(err) = self.store.put(&trade.strategy_id, entry.state(), Utc::now()) {
                error!(strategy_id = %trade.strategy_id, %err, "failed to persist health state transition");
            }
        }
    }
}

impl HealthGate for HealthRegistry {
    fn is_disabled(&self, strategy_id: &str) -> bool {
        self.health.read().get(strategy_id).is_some_and(|health| health.is_disabled())
    }
}

/// The running system (§2, §5). Construct with [`TradingEngine::new`],
/// register strategies, call [`TradingEngine::start`] for each `(symbol,
/// interval)` it should subscribe to, and [`TradingEngine::stop`] to shut
/// everything down in reverse order.
pub struct TradingEngine {
    cache: Arc<MarketDataCache>,
    evaluator: Arc<StrategyEvaluator>,
    health: Arc<HealthRegistry>,
    risk: Arc<RiskGate>,
    executor: Arc<OrderExecutor>,
    tracker: Arc<PositionTracker>,
    stops: Arc<StopOrchestrator>,
    client: Arc<dyn ExchangeClient>,
    feed: Arc<dyn MarketFeed>,
    supervisor: StreamSupervisor,
    leverage: u32,
    supervisors: RwLock<Vec<SupervisorHandle>>,
    known_symbols: RwLock<Vec<Symbol>>,
    bar_tx: mpsc::UnboundedSender<(Symbol, Interval)>,
    bar_task: RwLock<Option<JoinHandle<()>>>,
    sync_task: RwLock<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for TradingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingEngine")
            .field("known_symbols", &self.known_symbols.read().len())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl TradingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: ExchangeId,
        leverage: u32,
        risk_settings: &SettingsRiskSettings,
        health_settings: &HealthSettings,
        instruments: HashMap<Symbol, InstrumentSpec>,
        client: Arc<dyn ExchangeClient>,
        feed: Arc<dyn MarketFeed>,
        auto_adopt_orphans: bool,
        orphan_stop_pct: rust_decimal::Decimal,
        data_root: impl Into<PathBuf>,
    ) -> Result<Self, CoreError> {
        let data_root = data_root.into();
        let cache = Arc::new(MarketDataCache::new());
        let evaluator = Arc::new(StrategyEvaluator::new());
        let health_store = HealthStore::load(data_root.clone())?;
        let health = Arc::new(HealthRegistry::new(health_settings, health_store));
        let risk = Arc::new(RiskGate::new(
            risk_settings_from(risk_settings),
            exchange,
            OrderType::Market,
            instruments,
        ));
        let store = OrderStore::new(data_root);
        let executor = Arc::new(OrderExecutor::new(client.clone(), store));
        let tracker = Arc::new(PositionTracker::new(auto_adopt_orphans, orphan_stop_pct));
        let stops = Arc::new(StopOrchestrator::new());
        let supervisor = StreamSupervisor::new(feed.clone(), cache.clone());

        let (bar_tx, bar_rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));

        let engine = TradingEngine {
            cache,
            evaluator,
            health,
            risk,
            executor,
            tracker,
            stops,
            client,
            feed,
            supervisor,
            leverage,
            supervisors: RwLock::new(Vec::new()),
            known_symbols: RwLock::new(Vec::new()),
            bar_tx,
            bar_task: RwLock::new(None),
            sync_task: RwLock::new(None),
            running,
        };

        engine.spawn_bar_worker(bar_rx);
        Ok(engine)
    }

    /// Recovers any orders and open positions left over from a previous run
    /// before subscribing to live data. Fatal startup errors (§7) propagate;
    /// the caller should refuse to start live trading on `Err`.
    pub async fn recover(&self) -> Result<(), CoreError> {
        self.executor.recover().await?;
        Ok(())
    }

    /// Register a strategy and warm its market data history (§4.1
    /// `initialize_history`). `cooldown_bars` gates re-entry per §4.2.
    pub async fn register_strategy(&self, strategy: Box<dyn Strategy + Send>, cooldown_bars: u32, history_count: u32) -> Result<(), CoreError> {
        let strategy_id = strategy.strategy_id().to_string();
        let symbol = strategy.symbol().clone();
        let interval = strategy.interval();

        self.cache.initialize_history(&*self.feed, &symbol, interval, history_count).await?;
        self.tracker.register_strategy_symbol(symbol.clone(), strategy_id.clone());
        self.health.register(&strategy_id);
        self.evaluator.register(strategy, cooldown_bars);

        let mut known = self.known_symbols.write();
        if !known.contains(&symbol) {
            known.push(symbol);
        }
        Ok(())
    }

    /// Subscribes to `(symbol, interval)`'s live feed; finalized bars are
    /// pushed onto the async bar-processing worker (§2).
    pub fn start(&self, symbol: Symbol, interval: Interval) {
        let tx = self.bar_tx.clone();
        let handle = self.supervisor.subscribe(symbol, interval, move |symbol, interval| {
            let _ = tx.send((symbol, interval));
        });
        self.supervisors.write().push(handle);
    }

    /// Starts the 2s periodic `PositionTracker::sync` loop (§4.6 "Periodic
    /// reconciliation loop"). Idempotent: calling twice replaces the prior
    /// task with a fresh one.
    pub fn start_sync_loop(self: &Arc<Self>) {
        let engine = self.clone();
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SYNC_INTERVAL);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                engine.run_sync_tick().await;
            }
        });
        *self.sync_task.write() = Some(task);
    }

    async fn run_sync_tick(&self) {
        let symbols = self.known_symbols.read().clone();
        if symbols.is_empty() {
            return;
        }
        let triggers = self.tracker.sync(&*self.client, &self.stops, &symbols, Utc::now()).await;
        for trigger in triggers {
            self.handle_stop_trigger(trigger.symbol, trigger.side).await;
        }
    }

    async fn handle_stop_trigger(&self, symbol: Symbol, side: Side) {
        let Some(position) = self.tracker.tracked_position(&symbol) else { return };
        let signal_type = match side {
            Side::Long => SignalType::ExitLong,
            Side::Short => SignalType::ExitShort,
        };
        let signal = Signal::exit(
            position.strategy_id.clone(),
            symbol,
            signal_type,
            position.stop_loss,
            position.qty,
            "local stop triggered",
            ExitReason::StopLoss,
        );
        self.handle_signal(signal).await;
    }

    fn spawn_bar_worker(&self, mut bar_rx: mpsc::UnboundedReceiver<(Symbol, Interval)>) {
        let cache = self.cache.clone();
        let evaluator = self.evaluator.clone();
        let tracker = self.tracker.clone();
        let health = self.health.clone();
        let risk = self.risk.clone();
        let executor = self.executor.clone();
        let stops = self.stops.clone();
        let client = self.client.clone();
        let leverage = self.leverage;
        let running = self.running.clone();

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let Some((symbol, interval)) = bar_rx.recv().await else { break };
                let signals = evaluator.on_finalized_bar(&symbol, interval, &cache, &tracker, health.as_ref());
                for signal in signals {
                    process_signal(&risk, &executor, &tracker, &stops, &health, &*client, leverage, signal).await;
                }
            }
        });
    }

    async fn handle_signal(&self, signal: Signal) {
        process_signal(
            &self.risk,
            &self.executor,
            &self.tracker,
            &self.stops,
            &self.health,
            &*self.client,
            self.leverage,
            signal,
        )
        .await;
    }

    /// Removes the signal listener, stops every stream subscription, stops
    /// the sync loop, and lets in-flight executor work finish (§5: "Engine.stop
    /// removes its signal listener, stops the strategy engine, stops the
    /// local stop manager, shuts down the sync executor").
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        for handle in self.supervisors.write().drain(..) {
            handle.unsubscribe();
        }

        if let Some(task) = self.sync_task.write().take() {
            task.abort();
        }
        if let Some(task) = self.bar_task.write().take() {
            task.abort();
        }

        info!("trading engine stopped");
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_signal(
    risk: &RiskGate,
    executor: &OrderExecutor,
    tracker: &PositionTracker,
    stops: &StopOrchestrator,
    health: &HealthRegistry,
    client: &dyn ExchangeClient,
    leverage: u32,
    signal: Signal,
) {
    let strategy_id = signal.strategy_id.clone();
    let symbol = signal.symbol.clone();
    let is_entry = signal.signal_type.is_entry();
    let stop_loss = signal.stop_loss;
    let position_side = position_side_for(signal.signal_type);
    let price = signal.price;
    let exit_reason = signal.exit_reason;

    let existing_positions: Vec<Position> =
        tracker.tracked_symbols().iter().filter_map(|symbol| tracker.tracked_position(symbol)).collect();

    let account = match client.get_account().await {
        Ok(account) => account,
        Err(err) => {
            warn!(%strategy_id, %err, "failed to fetch account snapshot, dropping signal");
            return;
        }
    };
    risk.observe_equity(&strategy_id, account.total_equity);

    let snapshot = AccountSnapshot { total_equity: account.total_equity, available_equity: account.available_equity };
    let now = Utc::now();

    let order = match risk.validate_and_create_order(&signal, &existing_positions, snapshot, now) {
        Ok(order) => order,
        Err(rejection) => {
            info!(%strategy_id, %symbol, %rejection, "signal rejected by risk gate");
            return;
        }
    };

    let order_id = order.id.clone();
    if let Err(err) = executor.submit(order).await {
        warn!(%strategy_id, %symbol, %err, "order submission failed");
        return;
    }

    let filled = poll_for_fill(executor, &order_id).await;

    if is_entry {
        match filled {
            Some(order) if order.filled_qty > rust_decimal::Decimal::ZERO => {
                let entry_price = order.avg_fill_price.unwrap_or(price);
                if let Err(err) = tracker
                    .confirm_entry(symbol, position_side, entry_price, order.filled_qty, stop_loss, strategy_id, leverage, now, stops, client)
                    .await
                {
                    warn!(%err, "failed to confirm entry");
                }
            }
            _ => {
                tracker.record_pending_entry(symbol, strategy_id, position_side, stop_loss, now);
            }
        }
    } else if let Some(order) = filled {
        if order.filled_qty > rust_decimal::Decimal::ZERO {
            let exit_price = order.avg_fill_price.unwrap_or(price);
            let exit_reason = exit_reason.unwrap_or(ExitReason::StrategyExit);
            if let Some(trade) = tracker
                .confirm_exit(&symbol, exit_price, order.filled_qty, rust_decimal::Decimal::ZERO, exit_reason, order_id, now, stops, client)
                .await
            {
                risk.record_trade_result(&trade.strategy_id, trade.is_win(), trade.net_pnl());
                health.record_closed_trade(&trade);
            }
        }
    }
}

async fn poll_for_fill(executor: &OrderExecutor, order_id: &str) -> Option<talus_execution::order::Order> {
    for attempt in 0..FILL_POLL_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(FILL_POLL_INTERVAL).await;
        }
        match executor.check_status(order_id).await {
            Ok(order) if order.is_terminal() => return Some(order),
            Ok(order) => {
                if attempt + 1 == FILL_POLL_ATTEMPTS {
                    return Some(order);
                }
            }
            Err(err) => {
                warn!(order_id, %err, "failed to poll order status");
                return None;
            }
        }
    }
    None
}
