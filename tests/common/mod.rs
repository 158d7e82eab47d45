//! Common test utilities: a scripted in-memory store

#![allow(dead_code)]

use parking_lot::Mutex;
use retention_monitor::config::Config;
use retention_monitor::error::StoreError;
use retention_monitor::store::{Connector, Dialect, Row, Store};
use std::collections::HashMap;
use std::sync::Arc;

pub const GIB: u64 = 1024 * 1024 * 1024;
pub const MIB: u64 = 1024 * 1024;

/// Canned answers plus a record of every statement received
#[derive(Debug)]
pub struct Script {
    pub connect_failures: u32,
    pub usage: Result<Vec<Row>, StoreError>,
    pub row_count: Result<Vec<Row>, StoreError>,
    pub delete: Result<u64, StoreError>,
    pub connects: u32,
    pub queries: Vec<String>,
    pub execs: Vec<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            connect_failures: 0,
            usage: Ok(vec![Row(vec![GIB - 600 * MIB, GIB])]),
            row_count: Ok(vec![Row(vec![1000])]),
            delete: Ok(0),
            connects: 0,
            queries: Vec::new(),
            execs: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.script.lock().queries.clone()
    }

    pub fn execs(&self) -> Vec<String> {
        self.script.lock().execs.clone()
    }

    pub fn connects(&self) -> u32 {
        self.script.lock().connects
    }

    /// Replace the usage answer between invocations
    pub fn set_usage(&self, free: u64, total: u64) {
        self.script.lock().usage = Ok(vec![Row(vec![free, total])]);
    }
}

impl Connector for ScriptedConnector {
    type Store = ScriptedStore;

    async fn connect(&self) -> Result<ScriptedStore, StoreError> {
        let mut script = self.script.lock();
        script.connects += 1;
        if script.connect_failures > 0 {
            script.connect_failures -= 1;
            return Err(StoreError::Transport("connection refused".to_string()));
        }
        Ok(ScriptedStore {
            script: Arc::clone(&self.script),
        })
    }
}

pub struct ScriptedStore {
    script: Arc<Mutex<Script>>,
}

impl Store for ScriptedStore {
    fn dialect(&self) -> Dialect {
        Dialect::ClickHouse
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let mut script = self.script.lock();
        script.queries.push(sql.to_string());
        if sql.contains("count()") {
            script.row_count.clone()
        } else {
            script.usage.clone()
        }
    }

    async fn exec(&self, sql: &str) -> Result<u64, StoreError> {
        let mut script = self.script.lock();
        script.execs.push(sql.to_string());
        script.delete.clone()
    }
}

/// Configuration with defaults, overridden by `pairs`
pub fn config(pairs: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| vars.get(key).cloned()).expect("valid test config")
}
