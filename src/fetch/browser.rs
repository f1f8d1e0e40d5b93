use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::quiescence::{
    DEFAULT_MAX_RENDER_WAIT, DEFAULT_RESOURCE_WAIT, FetchSession, ResourceEvent,
};
use crate::error::{Error, Result};
use crate::traits::Fetcher;

const DRIVER_SCRIPT: &str = include_str!("driver.js");

/// Binary names searched for on the `PATH`
const ENGINE_NAMES: &[&str] = &["phantomjs", "phantom"];

/// Find a headless browser engine on the `PATH`.
pub fn find_engine() -> Option<PathBuf> {
    ENGINE_NAMES.iter().find_map(|name| which::which(name).ok())
}

/// Whether [`BrowserFetcher::new`] can succeed on this system.
pub fn has_engine() -> bool {
    find_engine().is_some()
}

/// Settings for [`BrowserFetcher`]
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Engine binary to use instead of searching the `PATH`
    pub engine: Option<PathBuf>,
    /// How long loads must stay quiet before the page is rendered
    pub resource_wait: Duration,
    /// Render regardless of outstanding loads after this long
    pub max_render_wait: Duration,
    /// How long the engine may keep running once the page should have been
    /// rendered before it is killed
    pub watchdog_grace: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: None,
            resource_wait: DEFAULT_RESOURCE_WAIT,
            max_render_wait: DEFAULT_MAX_RENDER_WAIT,
            watchdog_grace: Duration::from_secs(5),
        }
    }
}

/// Private session state for the engine, removed on `close`
#[derive(Debug)]
struct Workspace {
    dir: TempDir,
    script: PathBuf,
    cookies: PathBuf,
}

/// What the driver script prints on success
#[derive(Debug, Deserialize)]
struct RenderOutput {
    contents: String,
}

/// Fetches pages through a headless browser engine so client-side scripts
/// run before the markup is read.
///
/// Each fetch spawns a fresh engine process which waits for network
/// quiescence (see [`super::quiescence`]) and prints the rendered document.
#[derive(Debug)]
pub struct BrowserFetcher {
    engine: PathBuf,
    config: BrowserConfig,
    workspace: Option<Workspace>,
}

impl BrowserFetcher {
    pub fn new() -> Result<Self> {
        Self::with_config(BrowserConfig::default())
    }

    pub fn with_config(config: BrowserConfig) -> Result<Self> {
        let engine = match &config.engine {
            Some(path) => which::which(path).ok(),
            None => find_engine(),
        }
        .ok_or(Error::NoBrowserEngine)?;

        debug!("Using browser engine at {}", engine.display());
        Ok(Self {
            engine,
            config,
            workspace: None,
        })
    }

    pub fn engine(&self) -> &Path {
        &self.engine
    }

    /// The engine's working directory, while prepared.
    pub fn workdir(&self) -> Option<&Path> {
        self.workspace.as_ref().map(|ws| ws.dir.path())
    }

    fn driver_script(&self) -> String {
        DRIVER_SCRIPT
            .replace(
                "{resource_wait}",
                &self.config.resource_wait.as_millis().to_string(),
            )
            .replace(
                "{max_render_wait}",
                &self.config.max_render_wait.as_millis().to_string(),
            )
    }

    fn command(&self, workspace: &Workspace, url: &str) -> Command {
        let mut cookies = OsString::from("--cookies-file=");
        cookies.push(&workspace.cookies);

        let mut command = Command::new(&self.engine);
        command
            .arg("--ignore-ssl-errors=true")
            .arg("--web-security=false")
            .arg(cookies)
            .arg(&workspace.script)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn prepare(&mut self) -> Result<()> {
        if self.workspace.is_some() {
            return Ok(());
        }

        let dir = tempfile::Builder::new()
            .prefix("pagescrape-browser-")
            .tempdir()?;
        let script = dir.path().join("driver.js");
        tokio::fs::write(&script, self.driver_script()).await?;
        let cookies = dir.path().join("cookies.dat");

        info!("Prepared browser workspace in {}", dir.path().display());
        self.workspace = Some(Workspace {
            dir,
            script,
            cookies,
        });
        Ok(())
    }

    async fn fetch(&self, method: &str, url: &str) -> Result<Vec<u8>> {
        if method != "GET" {
            return Err(Error::InvalidMethod(method.to_string()));
        }
        let workspace = self.workspace.as_ref().ok_or(Error::NotPrepared)?;

        debug!("Rendering {} with {}", url, self.engine.display());
        let mut child = self.command(workspace, url).spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("engine stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("engine stderr was not captured"))?;

        let session = FetchSession::new(self.config.resource_wait, self.config.max_render_wait);
        let (events_tx, events_rx) = mpsc::channel(64);

        let (output, diagnostics, status) = tokio::join!(
            read_all(stdout),
            pump_log(stderr, events_tx),
            supervise(&mut child, session, events_rx, self.config.watchdog_grace),
        );

        let status = status?;
        if !status.success() {
            let message = if diagnostics.is_empty() {
                "no diagnostics".to_string()
            } else {
                diagnostics.join("; ")
            };
            return Err(Error::EngineExit { status, message });
        }

        let contents = decode_output(&output?)?;
        info!("Rendered {} ({} bytes)", url, contents.len());
        Ok(contents)
    }

    async fn close(&mut self) {
        let Some(workspace) = self.workspace.take() else {
            return;
        };

        let path = workspace.dir.path().to_path_buf();
        match workspace.dir.close() {
            Ok(()) => debug!("Removed browser workspace {}", path.display()),
            Err(e) => warn!("Failed to remove browser workspace {}: {}", path.display(), e),
        }
    }
}

async fn read_all(mut stdout: ChildStdout) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stdout.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Forward resource events from the engine's log and keep every other line
/// for error reporting.
async fn pump_log(stderr: ChildStderr, events: mpsc::Sender<ResourceEvent>) -> Vec<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut diagnostics = Vec::new();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!("engine: {}", line);
                match ResourceEvent::parse(&line) {
                    // The session stops listening once it settles
                    Some(event) => {
                        let _ = events.send(event).await;
                    }
                    None => diagnostics.push(line),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read browser engine log: {}", e);
                break;
            }
        }
    }

    diagnostics
}

/// Wait for the engine to exit, killing it if it outlives the point where the
/// page should have been rendered by more than `grace`.
async fn supervise(
    child: &mut Child,
    session: FetchSession,
    events: mpsc::Receiver<ResourceEvent>,
    grace: Duration,
) -> Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => Ok(status?),
        settled = session.settle(events) => {
            debug!(
                reason = ?settled.reason,
                elapsed = ?settled.elapsed,
                requests = settled.requests,
                in_flight = settled.in_flight,
                "page settled"
            );

            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => Ok(status?),
                Err(_) => {
                    warn!(
                        "Browser engine still running {:?} after the page settled, killing it",
                        grace
                    );
                    child.kill().await?;
                    Err(Error::EngineHung { grace })
                }
            }
        }
    }
}

/// Pull the rendered markup out of the first JSON object the engine printed.
fn decode_output(stdout: &[u8]) -> Result<Vec<u8>> {
    let output = serde_json::Deserializer::from_slice(stdout)
        .into_iter::<RenderOutput>()
        .next()
        .ok_or_else(|| Error::MalformedOutput("no output".to_string()))?
        .map_err(|e| Error::MalformedOutput(e.to_string()))?;

    Ok(output.contents.into_bytes())
}
