use crate::error::CrawlError;
use crate::scrapers::traits::{FetcherFactory, PageFetcher};
use crate::scrapers::types::FetchSettings;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Browser-based fetcher using headless Chrome
///
/// The browser is launched lazily and dropped after any browser-level
/// failure, so the next attempt starts from a fresh process.
pub struct BrowserFetcher {
    settings: FetchSettings,
    browser: Arc<Mutex<Option<Browser>>>,
}

impl BrowserFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self {
            settings,
            browser: Arc::new(Mutex::new(None)),
        }
    }

    fn launch(settings: &FetchSettings) -> Result<Browser, CrawlError> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(settings.page_timeout * 3)
            .args(vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--blink-settings=imagesEnabled=false"),
            ])
            .build()
            .map_err(|e| CrawlError::Browser(format!("failed to build launch options: {e}")))?;

        Browser::new(options)
            .map_err(|e| CrawlError::Browser(format!("failed to launch Chrome: {e}")))
    }

    fn session(
        slot: &Mutex<Option<Browser>>,
        settings: &FetchSettings,
    ) -> Result<Browser, CrawlError> {
        let mut guard = slot
            .lock()
            .map_err(|_| CrawlError::Browser("browser slot poisoned".to_string()))?;
        if let Some(browser) = guard.as_ref() {
            return Ok(browser.clone());
        }
        let browser = Self::launch(settings)?;
        *guard = Some(browser.clone());
        Ok(browser)
    }

    fn load_page(browser: &Browser, url: &str, settings: &FetchSettings) -> Result<String, CrawlError> {
        let browser_err = |e: anyhow::Error| CrawlError::Browser(e.to_string());

        let tab = browser.new_tab().map_err(browser_err)?;
        tab.set_default_timeout(settings.page_timeout);
        tab.set_user_agent(&settings.user_agent, None, None)
            .map_err(browser_err)?;

        tab.navigate_to(url).map_err(browser_err)?;
        tab.wait_until_navigated().map_err(|_| CrawlError::Timeout(settings.page_timeout))?;

        // Pages without the payload are still returned; extraction reports it.
        if tab.wait_for_element(&settings.ready_selector).is_err() {
            debug!(url = %url, selector = %settings.ready_selector, "Ready selector never appeared");
        }
        std::thread::sleep(Duration::from_millis(500));

        let html = tab.get_content().map_err(browser_err)?;
        if let Err(e) = tab.close(true) {
            warn!("Failed to close tab: {}", e);
        }
        Ok(html)
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CrawlError> {
        let slot = Arc::clone(&self.browser);
        let settings = self.settings.clone();
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            let browser = Self::session(&slot, &settings)?;
            let result = Self::load_page(&browser, &url, &settings);
            if let Err(CrawlError::Browser(reason)) = &result {
                warn!(url = %url, "Restarting browser after failure: {}", reason);
                if let Ok(mut guard) = slot.lock() {
                    *guard = None;
                }
            }
            result
        })
        .await
        .map_err(|e| CrawlError::Browser(format!("browser task panicked: {e}")))?
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}

pub struct BrowserFetcherFactory {
    pub settings: FetchSettings,
}

impl FetcherFactory for BrowserFetcherFactory {
    fn create(&self) -> Result<Box<dyn PageFetcher>, CrawlError> {
        Ok(Box::new(BrowserFetcher::new(self.settings.clone())))
    }
}
