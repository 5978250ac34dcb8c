use std::time::{Duration, Instant};

use action_primitives::{
    anchor_script, anchor_token, extract_selector, js_string, links_script, normalize_url,
    scroll_script, ActionError, AnchorDescriptor, BrowserSession, PageLink, Primitive,
    PrimitiveOutcome, Target,
};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webpilot_core_types::{truncate_chars, Observation};

use crate::config::ChromiumConfig;
use crate::error::{cdp, AdapterError};

const RESOLVE_POLL: Duration = Duration::from_millis(250);
const SETTLE_POLL: Duration = Duration::from_millis(200);
const SETTLE_LIMIT: Duration = Duration::from_secs(10);

const VISIBLE_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";
const READY_STATE_SCRIPT: &str = "document.readyState";
const NAV_STATUS_SCRIPT: &str = r#"(() => {
    const nav = performance.getEntriesByType('navigation')[0];
    return nav && nav.responseStatus ? nav.responseStatus : null;
})()"#;

struct BrowserState {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

/// A single Chromium page driven over the DevTools protocol.
pub struct ChromiumSession {
    config: ChromiumConfig,
    state: Mutex<Option<BrowserState>>,
}

impl ChromiumSession {
    pub fn new(config: ChromiumConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ChromiumConfig {
        &self.config
    }

    async fn launch(&self) -> Result<BrowserState, AdapterError> {
        let (width, height) = self.config.viewport;
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.config.request_timeout)
            .launch_timeout(self.config.launch_timeout)
            .window_size(width, height)
            .viewport(None)
            .args(self.config.launch_args());
        if !self.config.headless {
            builder = builder.with_head();
        }
        if self.config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = self.config.resolve_executable() {
            builder = builder.chrome_executable(executable);
        }
        if let Some(dir) = &self.config.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        let config = builder.build().map_err(AdapterError::Config)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| AdapterError::Launch(err.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(target: "cdp-adapter", error = %err, "devtools handler stopped");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        info!(
            target: "cdp-adapter",
            headless = self.config.headless,
            width,
            height,
            "chromium launched"
        );
        Ok(BrowserState {
            browser,
            page,
            handler,
        })
    }

    async fn page(&self) -> Result<Page, ActionError> {
        let guard = self.state.lock().await;
        guard
            .as_ref()
            .map(|state| state.page.clone())
            .ok_or_else(|| AdapterError::NotOpen.into())
    }

    async fn eval(&self, page: &Page, script: &str) -> Result<Option<Value>, ActionError> {
        let result = page.evaluate(script).await.map_err(cdp)?;
        Ok(result.value().cloned())
    }

    async fn eval_string(&self, page: &Page, script: &str) -> Result<String, ActionError> {
        Ok(self
            .eval(page, script)
            .await?
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    async fn navigate(&self, page: &Page, url: &str, timeout: Duration) -> Result<(), ActionError> {
        debug!(target: "cdp-adapter", %url, "navigating");
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Err(_) => {
                return Err(ActionError::NavigationFailed(format!(
                    "{url} did not load within {}s",
                    timeout.as_secs()
                )))
            }
            Ok(Err(err)) => {
                let err = AdapterError::from(err);
                if err.is_disconnect() {
                    return Err(err.into());
                }
                return Err(ActionError::NavigationFailed(format!("{url}: {err}")));
            }
            Ok(Ok(_)) => {}
        }

        let current = page.url().await.map_err(cdp)?.unwrap_or_default();
        if current.starts_with("chrome-error://") {
            return Err(ActionError::NavigationFailed(format!(
                "{url} failed to load"
            )));
        }
        let status = self
            .eval(page, NAV_STATUS_SCRIPT)
            .await
            .ok()
            .flatten()
            .and_then(|value| value.as_u64());
        if let Some(code) = status.filter(|code| *code >= 400) {
            return Err(ActionError::NavigationFailed(format!(
                "{url} returned HTTP {code}"
            )));
        }
        Ok(())
    }

    /// Wait for `document.readyState` to reach `complete`, bounded.
    async fn settle(&self, page: &Page) -> Result<(), ActionError> {
        let deadline = Instant::now() + SETTLE_LIMIT.min(self.config.request_timeout);
        loop {
            match self.eval_string(page, READY_STATE_SCRIPT).await {
                Ok(state) if state == "complete" => return Ok(()),
                Err(err) if err.is_fatal() => return Err(err),
                _ => {}
            }
            if Instant::now() >= deadline {
                debug!(target: "cdp-adapter", "page did not settle before deadline");
                return Ok(());
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }

    /// Single attempt: tag the first visible match of `anchor`.
    async fn try_anchor(
        &self,
        page: &Page,
        anchor: &AnchorDescriptor,
    ) -> Result<Option<String>, ActionError> {
        let script = anchor_script(anchor, &anchor_token());
        match self.eval(page, &script).await {
            Ok(value) => Ok(value.as_ref().and_then(extract_selector)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                debug!(target: "cdp-adapter", %anchor, error = %err, "anchor evaluation failed");
                Ok(None)
            }
        }
    }

    /// Try each candidate until one resolves or the element timeout lapses.
    async fn resolve(&self, page: &Page, target: &Target) -> Result<String, ActionError> {
        if target.is_empty() {
            return Err(ActionError::TargetNotFound("empty target".to_string()));
        }
        let deadline = Instant::now() + self.config.element_timeout;
        loop {
            for anchor in &target.candidates {
                if let Some(selector) = self.try_anchor(page, anchor).await? {
                    debug!(target: "cdp-adapter", hint = %target, %anchor, "target resolved");
                    return Ok(selector);
                }
            }
            if Instant::now() >= deadline {
                return Err(ActionError::TargetNotFound(target.hint.clone()));
            }
            tokio::time::sleep(RESOLVE_POLL).await;
        }
    }

    async fn click_selector(&self, page: &Page, selector: &str, hint: &str) -> Result<(), ActionError> {
        let element = page
            .find_element(selector)
            .await
            .map_err(|err| element_error(hint, err))?;
        element.click().await.map_err(|err| element_error(hint, err))?;
        Ok(())
    }

    async fn fill(&self, page: &Page, target: &Target, text: &str) -> Result<(), ActionError> {
        let selector = self.resolve(page, target).await?;
        let clear = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                if ('value' in el) {{ el.value = ''; }} else if (el.isContentEditable) {{ el.textContent = ''; }}
                return true;
            }})()"#,
            sel = js_string(&selector),
        );
        self.eval(page, &clear).await?;
        let element = page
            .find_element(selector.as_str())
            .await
            .map_err(|err| element_error(&target.hint, err))?;
        element
            .click()
            .await
            .map_err(|err| element_error(&target.hint, err))?
            .type_str(text)
            .await
            .map_err(|err| element_error(&target.hint, err))?;
        Ok(())
    }

    async fn extract_text(
        &self,
        page: &Page,
        target: Option<&Target>,
        max_chars: usize,
    ) -> Result<String, ActionError> {
        let raw = match target {
            Some(target) => {
                let selector = self.resolve(page, target).await?;
                let script = format!(
                    "(() => {{ const el = document.querySelector({sel}); return el ? (el.innerText || el.textContent || '') : ''; }})()",
                    sel = js_string(&selector),
                );
                self.eval_string(page, &script).await?
            }
            None => self.eval_string(page, VISIBLE_TEXT_SCRIPT).await?,
        };
        Ok(truncate_chars(raw.trim(), max_chars))
    }

    async fn dismiss_overlays(
        &self,
        page: &Page,
        anchors: &[AnchorDescriptor],
    ) -> Result<bool, ActionError> {
        for anchor in anchors {
            let Some(selector) = self.try_anchor(page, anchor).await? else {
                continue;
            };
            match self.click_selector(page, &selector, &anchor.to_string()).await {
                Ok(()) => {
                    info!(target: "cdp-adapter", %anchor, "dismissed overlay");
                    return Ok(true);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(target: "cdp-adapter", %anchor, error = %err, "overlay click failed");
                }
            }
        }
        Ok(false)
    }
}

fn element_error(hint: &str, err: CdpError) -> ActionError {
    match ActionError::from(AdapterError::from(err)) {
        ActionError::SessionLost(msg) => ActionError::SessionLost(msg),
        other => ActionError::TargetNotFound(format!("{hint}: {other}")),
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open(&self, url: &str) -> Result<(), ActionError> {
        let url = normalize_url(url)?;
        {
            let mut guard = self.state.lock().await;
            if guard.is_none() {
                *guard = Some(self.launch().await?);
            }
        }
        let page = self.page().await?;
        self.navigate(&page, &url, self.config.request_timeout).await?;
        self.settle(&page).await
    }

    async fn current_observation(&self) -> Result<Observation, ActionError> {
        let page = self.page().await?;
        let url = page.url().await.map_err(cdp)?.unwrap_or_default();
        let title = self.eval_string(&page, "document.title").await?;
        let text = self.eval_string(&page, VISIBLE_TEXT_SCRIPT).await?;
        let title = (!title.trim().is_empty()).then(|| title.trim().to_string());
        let observation = Observation::new(
            url,
            title,
            truncate_chars(text.trim(), self.config.max_text_chars),
        );

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        match page.screenshot(params).await {
            Ok(png) => Ok(observation.with_screenshot(png)),
            Err(err) => {
                let err = ActionError::from(AdapterError::from(err));
                if err.is_fatal() {
                    return Err(err);
                }
                warn!(target: "cdp-adapter", error = %err, "screenshot failed");
                Ok(observation)
            }
        }
    }

    async fn perform(&self, primitive: &Primitive) -> Result<PrimitiveOutcome, ActionError> {
        let page = self.page().await?;
        debug!(target: "cdp-adapter", primitive = primitive.name(), "performing");
        match primitive {
            Primitive::Click(target) => {
                let selector = self.resolve(&page, target).await?;
                self.click_selector(&page, &selector, &target.hint).await?;
                self.settle(&page).await?;
                Ok(PrimitiveOutcome::Done)
            }
            Primitive::Fill { target, text } => {
                self.fill(&page, target, text).await?;
                Ok(PrimitiveOutcome::Done)
            }
            Primitive::TypeFocused(text) => {
                page.execute(InsertTextParams::new(text.clone()))
                    .await
                    .map_err(cdp)?;
                Ok(PrimitiveOutcome::Done)
            }
            Primitive::Scroll { direction, amount } => {
                self.eval(&page, &scroll_script(*direction, *amount)).await?;
                Ok(PrimitiveOutcome::Done)
            }
            Primitive::Navigate { url, timeout } => {
                let url = normalize_url(url)?;
                self.navigate(&page, &url, *timeout).await?;
                self.settle(&page).await?;
                Ok(PrimitiveOutcome::Done)
            }
            Primitive::Wait(duration) => {
                tokio::time::sleep(*duration).await;
                page.url().await.map_err(cdp)?;
                Ok(PrimitiveOutcome::Done)
            }
            Primitive::ExtractText { target, max_chars } => {
                let text = self.extract_text(&page, target.as_ref(), *max_chars).await?;
                Ok(PrimitiveOutcome::Text(text))
            }
            Primitive::ExtractLinks { limit } => {
                let value = self
                    .eval(&page, &links_script(*limit))
                    .await?
                    .unwrap_or(Value::Array(Vec::new()));
                let links: Vec<PageLink> = serde_json::from_value(value)
                    .map_err(|err| ActionError::Internal(format!("malformed link list: {err}")))?;
                Ok(PrimitiveOutcome::Links(links))
            }
            Primitive::DismissOverlays(anchors) => {
                let dismissed = self.dismiss_overlays(&page, anchors).await?;
                Ok(PrimitiveOutcome::Dismissed(dismissed))
            }
        }
    }

    async fn close(&self) -> Result<(), ActionError> {
        let Some(mut state) = self.state.lock().await.take() else {
            return Ok(());
        };
        if let Err(err) = state.browser.close().await {
            warn!(target: "cdp-adapter", error = %err, "browser close failed");
        }
        state.handler.abort();
        info!(target: "cdp-adapter", "chromium closed");
        Ok(())
    }
}
