use thirtyfour::prelude::*;
use thirtyfour::ChromeCapabilities;
use tracing::{debug, info};

use crate::engine::convergence::ReviewSource;
use crate::engine::{HarvestError, RawBlock};
use crate::locator;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Chrome-backed rendering collaborator. Owns the WebDriver session; the
/// engine only sees it through `ReviewSource`.
pub struct BrowserSource {
    driver: WebDriver,
}

impl BrowserSource {
    /// Connect to a running chromedriver. Connection or capability failures
    /// are fatal: the run cannot start without a browser.
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self, HarvestError> {
        let caps = build_capabilities(headless)?;
        let driver = WebDriver::new(webdriver_url, caps)
            .await
            .map_err(|e| HarvestError::CollaboratorUnavailable(e.to_string()))?;
        info!(url = webdriver_url, headless, "browser session started");
        Ok(Self { driver })
    }

    pub async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
        info!(url, "navigating");
        self.driver
            .goto(url)
            .await
            .map_err(|e| HarvestError::CollaboratorUnavailable(e.to_string()))
    }

    pub async fn title(&self) -> Result<String, HarvestError> {
        self.driver
            .title()
            .await
            .map_err(|e| HarvestError::Collaborator(e.to_string()))
    }

    pub async fn quit(self) -> Result<(), HarvestError> {
        self.driver
            .quit()
            .await
            .map_err(|e| HarvestError::Collaborator(e.to_string()))
    }
}

impl ReviewSource for BrowserSource {
    async fn visible_blocks(&mut self) -> Result<Vec<RawBlock>, HarvestError> {
        let html = self
            .driver
            .source()
            .await
            .map_err(|e| HarvestError::Collaborator(e.to_string()))?;
        let blocks = locator::locate_blocks(&html);
        debug!(blocks = blocks.len(), "snapshot taken");
        Ok(blocks)
    }

    async fn reveal_more(&mut self) -> Result<(), HarvestError> {
        self.driver
            .execute(SCROLL_TO_BOTTOM, Vec::new())
            .await
            .map_err(|e| HarvestError::Collaborator(e.to_string()))?;
        Ok(())
    }
}

/// Chrome options matching what the site tolerates: fixed desktop viewport,
/// a real user agent, and the automation banner suppressed.
fn build_capabilities(headless: bool) -> Result<ChromeCapabilities, HarvestError> {
    let mut caps = DesiredCapabilities::chrome();
    let setup = |caps: &mut ChromeCapabilities| -> WebDriverResult<()> {
        if headless {
            caps.add_arg("--headless")?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--disable-gpu")?;
        caps.add_arg("--window-size=1920,1080")?;
        caps.add_arg(&format!("user-agent={USER_AGENT}"))?;
        caps.add_experimental_option("excludeSwitches", serde_json::json!(["enable-automation"]))?;
        caps.add_experimental_option("useAutomationExtension", serde_json::json!(false))?;
        Ok(())
    };
    setup(&mut caps).map_err(|e| HarvestError::CollaboratorUnavailable(e.to_string()))?;
    Ok(caps)
}
