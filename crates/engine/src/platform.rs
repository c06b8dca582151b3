//! Real implementations of the capability traits.
//!
//! - [`StdFilesystem`]: real std::fs operations
//! - [`TokioClock`]: wall-clock sleeps via tokio
//! - [`DirectoryHost`]: "save as" into a directory
//! - [`WebDriverSurface`]: a browser page driven over W3C WebDriver

use crate::catalogue::EffectLabel;
use crate::export::ExportFile;
use crate::traits::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ===========================================================================
// Filesystem – wraps std::fs
// ===========================================================================

pub struct StdFilesystem;

impl FilesystemOps for StdFilesystem {
    fn read_file(&self, path: &Path) -> CapResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CapError::NotFound(format!("{}: {}", path.display(), e))
            }
            _ => CapError::Io(e),
        })
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> CapResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, data).map_err(CapError::Io)
    }
}

// ===========================================================================
// Clock – tokio timer
// ===========================================================================

pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ===========================================================================
// Export host – files land in one directory
// ===========================================================================

pub struct DirectoryHost {
    dir: PathBuf,
    fs: Box<dyn FilesystemOps>,
}

impl DirectoryHost {
    pub fn new(dir: impl Into<PathBuf>, fs: Box<dyn FilesystemOps>) -> Self {
        Self {
            dir: dir.into(),
            fs,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `file_name` will be written.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

impl FileHost for DirectoryHost {
    fn offer_file(&self, file: &ExportFile) -> CapResult<()> {
        // Only the final component is honoured, the host owns the directory.
        let name = Path::new(&file.name)
            .file_name()
            .ok_or_else(|| CapError::Other(format!("invalid file name: {:?}", file.name)))?;
        let path = self.dir.join(name);
        self.fs.write_file(&path, &file.bytes)?;
        tracing::debug!(path = %path.display(), mime = %file.mime_type, "file written");
        Ok(())
    }
}

// ===========================================================================
// WebDriver surface
// ===========================================================================

/// W3C web element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4d4ec3b5b8d0";

/// How the coverage calculator page marks up its controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSelectors {
    /// CSS selector matching every currently selected item.
    pub selected: String,
    /// Attribute carrying the 1-based item index.
    pub item_attribute: String,
    /// `id` of the compute button.
    pub compute_id: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            selected: ".selected".to_string(),
            item_attribute: "data-typeid".to_string(),
            compute_id: "calc-coverage".to_string(),
        }
    }
}

/// `[attr='value']`
fn attr_selector(attribute: &str, value: &str) -> String {
    format!("[{}='{}']", attribute, value)
}

pub struct WebDriverSurface {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
    selectors: PageSelectors,
}

impl WebDriverSurface {
    /// Open a browser session on `endpoint` and navigate to `page_url`.
    pub async fn connect(
        endpoint: &str,
        page_url: &str,
        selectors: PageSelectors,
        timeout_ms: u64,
    ) -> CapResult<Self> {
        ensure_crypto_provider();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| CapError::Network(format!("failed to build HTTP client: {}", e)))?;
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let created = send(
            &client,
            reqwest::Method::POST,
            &format!("{}/session", endpoint),
            Some(json!({ "capabilities": { "alwaysMatch": {} } })),
        )
        .await?;
        let session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| CapError::Other("new session response has no sessionId".into()))?
            .to_string();
        tracing::info!(endpoint = %endpoint, session = %session_id, "webdriver session opened");

        let surface = Self {
            client,
            endpoint,
            session_id,
            selectors,
        };
        surface
            .command(reqwest::Method::POST, "url", Some(json!({ "url": page_url })))
            .await?;
        tracing::info!(page = %page_url, "page loaded");
        Ok(surface)
    }

    async fn command(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> CapResult<Value> {
        let url = format!("{}/session/{}/{}", self.endpoint, self.session_id, path);
        send(&self.client, method, &url, body).await
    }

    async fn find_all(&self, css: &str) -> CapResult<Vec<String>> {
        let value = self
            .command(
                reqwest::Method::POST,
                "elements",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;
        let elements = value
            .as_array()
            .ok_or_else(|| CapError::Other(format!("unexpected elements response for {}", css)))?;
        Ok(elements.iter().filter_map(element_id).collect())
    }

    async fn find(&self, css: &str) -> CapResult<String> {
        let value = self
            .command(
                reqwest::Method::POST,
                "element",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await
            .map_err(|e| match e {
                CapError::NotFound(_) => CapError::NotFound(css.to_string()),
                other => other,
            })?;
        element_id(&value).ok_or_else(|| CapError::NotFound(css.to_string()))
    }

    async fn click(&self, element: &str) -> CapResult<()> {
        self.command(
            reqwest::Method::POST,
            &format!("element/{}/click", element),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn text(&self, element: &str) -> CapResult<String> {
        let value = self
            .command(reqwest::Method::GET, &format!("element/{}/text", element), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn css_value(&self, element: &str, property: &str) -> CapResult<String> {
        let value = self
            .command(
                reqwest::Method::GET,
                &format!("element/{}/css/{}", element, property),
                None,
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn item_selector(&self, item: usize) -> String {
        attr_selector(&self.selectors.item_attribute, &item.to_string())
    }
}

#[async_trait::async_trait]
impl SelectorSurface for WebDriverSurface {
    async fn clear_all(&self) -> CapResult<()> {
        // Clicking a selected item toggles it off.
        for element in self.find_all(&self.selectors.selected).await? {
            self.click(&element).await?;
        }
        Ok(())
    }

    async fn select(&self, item: usize) -> CapResult<()> {
        let element = self.find(&self.item_selector(item)).await?;
        self.click(&element).await
    }

    async fn compute(&self) -> CapResult<()> {
        let element = self
            .find(&attr_selector("id", &self.selectors.compute_id))
            .await?;
        self.click(&element).await
    }

    async fn read_effectiveness(&self, effect: &EffectLabel) -> CapResult<String> {
        let element = self.find(&attr_selector("id", &effect.readout)).await?;
        self.text(&element).await
    }

    async fn is_item_disabled(&self, item: usize) -> CapResult<bool> {
        let element = self.find(&self.item_selector(item)).await?;
        Ok(self.css_value(&element, "display").await? == "none")
    }
    async fn close(&self) -> CapResult<()> {
        let url = format!("{}/session/{}", self.endpoint, self.session_id);
        send(&self.client, reqwest::Method::DELETE, &url, None).await?;
        tracing::info!(session = %self.session_id, "webdriver session closed");
        Ok(())
    }
}

fn element_id(value: &Value) -> Option<String> {
    value.get(ELEMENT_KEY).and_then(Value::as_str).map(String::from)
}

/// Send one WebDriver request and unwrap its `value` member.
async fn send(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<Value>,
) -> CapResult<Value> {
    let mut request = client.request(method.clone(), url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let resp = request.send().await.map_err(|e| {
        if e.is_timeout() {
            CapError::Timeout
        } else {
            CapError::Network(format!("{} {}: {}", method, url, e))
        }
    })?;

    let status = resp.status();
    let mut payload: Value = resp
        .json()
        .await
        .map_err(|e| CapError::Network(format!("reading {} response: {}", url, e)))?;
    let value = payload
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    Err(webdriver_error(status.as_u16(), &value))
}

/// Map a WebDriver error body onto a capability error.
fn webdriver_error(status: u16, value: &Value) -> CapError {
    let code = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    match code {
        "no such element" | "stale element reference" | "no such window" => {
            CapError::NotFound(format!("{}: {}", code, message))
        }
        "timeout" | "script timeout" => CapError::Timeout,
        "unknown command" | "unsupported operation" => {
            CapError::Unsupported(format!("{}: {}", code, message))
        }
        _ => CapError::Other(format!("webdriver {} ({}): {}", code, status, message)),
    }
}

/// reqwest is built without a default TLS provider.
fn ensure_crypto_provider() {
    // Err means a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}
