use crate::error::ExecutionError;
use crate::order::Order;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

/// Crash-safe full-file writer: writes `value` to `path.tmp` then renames
/// over `path`, so a crash mid-write never leaves a half-written file behind
/// (Design Note: "Disk state files ... MUST make updates crash-safe").
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ExecutionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ExecutionError::Persistence {
            path: path.display().to_string(),
            source,
        })?;
    }
    let tmp_path = tmp_path_for(path);
    let payload = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp_path, &payload).map_err(|source| ExecutionError::Persistence {
        path: tmp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| ExecutionError::Persistence {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Reads and parses `path`; `Ok(None)` when the file does not exist yet
/// (first run).
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ExecutionError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ExecutionError::Persistence {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// `data/orders/<exchange>/<orderId>.json`, one snapshot file per order,
/// overwritten atomically on every state transition (§6 persisted state
/// layout).
#[derive(Debug, Clone)]
pub struct OrderStore {
    root: PathBuf,
}

impl OrderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        OrderStore { root: root.into() }
    }

    fn path_for(&self, exchange: talus_markets::ExchangeId, order_id: &str) -> PathBuf {
        self.root
            .join("orders")
            .join(exchange.as_str().to_lowercase())
            .join(format!("{order_id}.json"))
    }

    pub fn save(&self, order: &Order) -> Result<(), ExecutionError> {
        write_atomic(&self.path_for(order.exchange, &order.id), order)
    }

    /// Load every persisted order across all exchange subdirectories —
    /// used by [`crate::executor::OrderExecutor::recover`] at startup.
    pub fn load_all(&self) -> Result<Vec<Order>, ExecutionError> {
        let mut orders = Vec::new();
        let orders_root = self.root.join("orders");
        if !orders_root.exists() {
            return Ok(orders);
        }
        for exchange_dir in std::fs::read_dir(&orders_root).map_err(|source| ExecutionError::Persistence {
            path: orders_root.display().to_string(),
            source,
        })? {
            let exchange_dir = exchange_dir.map_err(|source| ExecutionError::Persistence {
                path: orders_root.display().to_string(),
                source,
            })?;
            if !exchange_dir.path().is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(exchange_dir.path()).map_err(|source| ExecutionError::Persistence {
                path: exchange_dir.path().display().to_string(),
                source,
            })? {
                let entry = entry.map_err(|source| ExecutionError::Persistence {
                    path: orders_root.display().to_string(),
                    source,
                })?;
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                    if let Some(order) = read_json::<Order>(&path)? {
                        orders.push(order);
                    }
                }
            }
        }
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use talus_markets::{ExchangeId, OrderSide, Symbol};

    fn sample_order() -> Order {
        Order::new_exit(
            "o1".into(),
            ExchangeId::Mock,
            Symbol::new("BTC"),
            OrderSide::Sell,
            crate::order::OrderType::Market,
            dec!(1),
            None,
            "s1".into(),
            "c1".into(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn save_and_recover_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = OrderStore::new(dir.path());
        let order = sample_order();
        store.save(&order).unwrap();

        let recovered = store.load_all().unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].id, order.id);
    }

    #[test]
    fn load_all_on_empty_store_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = OrderStore::new(dir.path());
        assert!(store.load_all().unwrap().is_empty());
    }
}
