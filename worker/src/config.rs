use std::env;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_ABANDONED_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CLEANUP_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;

/// Configuración del worker, leída una sola vez al arrancar.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub bind_addr: String,
    pub node_id: String,
    /// Sin heartbeat por más de esto, una tarea no terminada se aborta.
    pub abandoned_timeout: Duration,
    /// Una tarea terminada se olvida después de esto sin heartbeat.
    pub cleanup_timeout: Duration,
    pub sweep_interval: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con otra fuente de variables (tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("WORKER_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let node_id = lookup("WORKER_NODE_ID")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(default_node_id);

        Self {
            bind_addr,
            node_id,
            abandoned_timeout: secs_var(
                &lookup,
                "TASK_ABANDONED_TIMEOUT_SECS",
                DEFAULT_ABANDONED_TIMEOUT_SECS,
            ),
            cleanup_timeout: secs_var(&lookup, "TASK_CLEANUP_TIMEOUT_SECS", DEFAULT_CLEANUP_TIMEOUT_SECS),
            sweep_interval: secs_var(&lookup, "TASK_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

fn secs_var<F>(lookup: &F, key: &str, default: u64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let secs = match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(v) => v,
            Err(_) => {
                warn!("{}={:?} no es un número válido, usando {}", key, raw, default);
                default
            }
        },
    };
    Duration::from_secs(secs)
}

/// Hostname de la máquina; si no se puede leer, un uuid.
fn default_node_id() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> WorkerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn sin_variables_usa_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.abandoned_timeout, Duration::from_secs(60));
        assert_eq!(config.cleanup_timeout, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert!(!config.node_id.is_empty());
    }

    #[test]
    fn variables_pisan_defaults() {
        let config = config_from(&[
            ("WORKER_BIND_ADDR", "127.0.0.1:9000"),
            ("WORKER_NODE_ID", "node-7"),
            ("TASK_ABANDONED_TIMEOUT_SECS", "10"),
            ("TASK_CLEANUP_TIMEOUT_SECS", " 20 "),
            ("TASK_SWEEP_INTERVAL_SECS", "1"),
        ]);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.node_id, "node-7");
        assert_eq!(config.abandoned_timeout, Duration::from_secs(10));
        assert_eq!(config.cleanup_timeout, Duration::from_secs(20));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
    }

    #[test]
    fn valores_invalidos_vuelven_al_default() {
        let config = config_from(&[
            ("TASK_ABANDONED_TIMEOUT_SECS", "mucho"),
            ("TASK_CLEANUP_TIMEOUT_SECS", "-3"),
            ("WORKER_NODE_ID", "  "),
        ]);
        assert_eq!(config.abandoned_timeout, Duration::from_secs(60));
        assert_eq!(config.cleanup_timeout, Duration::from_secs(300));
        assert!(!config.node_id.trim().is_empty());
    }
}
