//! File-based StrategyRepository implementation

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use greyroute_core::{Error, Result, StrategyRepository};

/// Type alias for strategy file change streams
pub type StrategyChangeStream = BoxStream<'static, Result<StrategyChange>>;

/// Strategy file change notification
#[derive(Debug, Clone)]
pub struct StrategyChange {
    /// Timestamp of the change
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Local write counter (not the strategy's own version)
    pub revision: u32,
}

/// File-based strategy repository
///
/// Stores the strategy document as JSON on disk and watches for changes
/// using the `notify` crate.
#[derive(Debug)]
pub struct FileStrategyRepository {
    /// Path to the strategy document
    path: PathBuf,
    /// Write counter (incremented on each store)
    revision: Arc<AtomicU32>,
}

impl FileStrategyRepository {
    /// Create a new file-based strategy repository
    ///
    /// # Arguments
    /// * `path` - Path to the JSON strategy document (`~` is expanded)
    ///
    /// # Errors
    /// - `Error::ConfigNotFound` if the file doesn't exist
    /// - `Error::Config` if the home directory cannot be determined
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = expand_tilde(path.into())?;

        // Verify the file exists
        if !tokio::fs::try_exists(&path).await? {
            return Err(Error::ConfigNotFound);
        }

        info!("Initialized FileStrategyRepository for {:?}", path);

        Ok(Self {
            path,
            revision: Arc::new(AtomicU32::new(1)),
        })
    }

    /// Path of the strategy document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate a strategy document before saving
    ///
    /// Only the structure is checked here; the engine does the full parse.
    ///
    /// # Errors
    /// - `Error::Parse` if the document isn't JSON
    /// - `Error::ConfigValidation` if a top-level field has the wrong shape
    pub fn validate(document: &str) -> Result<()> {
        let value: serde_json::Value = serde_json::from_str(document)?;

        let Some(obj) = value.as_object() else {
            return Err(Error::ConfigValidation(
                "Strategy must be a JSON object".to_string(),
            ));
        };

        if let Some(version) = obj.get("version")
            && !version.is_i64()
        {
            return Err(Error::ConfigValidation(
                "'version' must be an integer".to_string(),
            ));
        }

        // Out-of-range ports are tolerated here; the engine treats them as unset
        if let Some(port) = obj.get("port")
            && !(port.is_i64() || port.is_u64() || port.is_null())
        {
            return Err(Error::ConfigValidation(
                "'port' must be an integer".to_string(),
            ));
        }

        if let Some(host) = obj.get("host")
            && !host.is_string()
        {
            return Err(Error::ConfigValidation("'host' must be a string".to_string()));
        }

        if let Some(apis) = obj.get("apis")
            && !(apis.is_object() || apis.is_null())
        {
            return Err(Error::ConfigValidation(
                "'apis' must be an object keyed by API identifier".to_string(),
            ));
        }

        debug!("Strategy validation passed");
        Ok(())
    }

    /// Watch the strategy file for changes
    ///
    /// The stream emits whenever the file is modified or recreated and ends
    /// when the watcher cannot be set up or the stream is dropped.
    ///
    /// The parent directory is watched rather than the file itself, so the
    /// watch survives the file being replaced by a rename (as `store` and
    /// most editors do).
    pub fn watch_changes(&self) -> StrategyChangeStream {
        // Create a channel for file system events
        let (tx, rx) = mpsc::channel(100);

        // Clone path and revision for the watcher thread
        let path = self.path.clone();
        let directory = watched_directory(&path);
        let revision = self.revision.clone();

        // Spawn watcher in a blocking task
        tokio::task::spawn_blocking(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: std::result::Result<Event, notify::Error>| {
                    if let Err(e) = notify_tx.send(res) {
                        error!("Failed to send file watch event: {}", e);
                    }
                },
                notify::Config::default(),
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&directory, RecursiveMode::NonRecursive) {
                error!("Failed to watch strategy directory {:?}: {}", directory, e);
                return;
            }

            info!("Watching strategy file for changes: {:?}", path);

            while let Ok(event_result) = notify_rx.recv() {
                match event_result {
                    Ok(event) => {
                        // Only emit modify/create events for the strategy file itself
                        if is_strategy_change(&event, &path) {
                            let change = StrategyChange {
                                timestamp: chrono::Utc::now(),
                                revision: revision.load(Ordering::SeqCst),
                            };

                            if tx.blocking_send(Ok(change)).is_err() {
                                debug!("Strategy change stream closed, stopping watcher");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("File watch error: {}", e);
                        if tx
                            .blocking_send(Err(Error::Internal(format!("File watch error: {}", e))))
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        // Convert mpsc receiver to stream
        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Box::pin(stream)
    }
}

#[async_trait]
impl StrategyRepository for FileStrategyRepository {
    async fn fetch(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            error!("Failed to read strategy file {:?}: {}", self.path, e);
            Error::Fetch(format!("{}: {}", self.path.display(), e))
        })
    }

    async fn store(&self, document: String) -> Result<()> {
        // Validate before writing
        Self::validate(&document)?;

        // Write through a sibling temp file so readers never see a partial document
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, document.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Wrote strategy file {:?} (revision {})", self.path, revision);
        Ok(())
    }
}

/// Directory holding `path`; a bare file name lives in the current directory
fn watched_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether a directory event modified or (re)created the strategy file
///
/// Paths are compared by file name because the watcher may report them in
/// canonical form (e.g. through a symlinked temp directory).
fn is_strategy_change(event: &Event, path: &Path) -> bool {
    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return false;
    }
    let Some(file_name) = path.file_name() else {
        return false;
    };
    event
        .paths
        .iter()
        .any(|changed| changed.file_name() == Some(file_name))
}

fn expand_tilde(path: PathBuf) -> Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path);
    };
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
    Ok(home.join(rest))
}
