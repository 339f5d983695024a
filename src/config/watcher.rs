//! Hot reload of the configuration file.
//!
//! Editors often emit several modify events for one save, so the watcher
//! remembers the last text it accepted and only forwards a new
//! [`RedirectConfig`] when the file content actually changed and validates.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::RedirectConfig;

/// Watches one config file and publishes validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RedirectConfig>,
    last_text: Mutex<Option<String>>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for reloaded configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RedirectConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let last_text = std::fs::read_to_string(path).ok();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
                last_text: Mutex::new(last_text),
            },
            update_rx,
        )
    }

    /// Re-read the file and publish it if it changed. Returns true when a
    /// new configuration was sent.
    pub fn reload(&self) -> bool {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Config file unreadable, keeping current configuration");
                return false;
            }
        };

        let Ok(mut last) = self.last_text.lock() else {
            return false;
        };
        if last.as_deref() == Some(text.as_str()) {
            return false;
        }

        match parse_config(&text) {
            Ok(config) => {
                *last = Some(text);
                tracing::info!(path = ?self.path, "Configuration reloaded");
                self.update_tx.send(config).is_ok()
            }
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Rejected config reload, keeping current configuration");
                false
            }
        }
    }

    /// Start watching in notify's background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    self.reload();
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
