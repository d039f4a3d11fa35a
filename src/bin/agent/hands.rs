use anyhow::Result;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::PathBuf;
use std::sync::Arc;

/// Persistent browser session. Created once, reused for every command.
pub struct BrowserSession {
    _browser: Browser,
    pub tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch() -> Result<Self> {
        // 1. Try to connect to existing Chrome (Attach Mode)
        eprintln!("[Hands] Attempting to attach to existing Chrome on port 9222...");
        if let Ok(browser) = Browser::connect("http://127.0.0.1:9222".to_string()) {
            eprintln!("[Hands] Attached to existing Chrome.");

            // get_tabs() returns Arc<Mutex<Vec<Arc<Tab>>>>
            let tab = {
                let tabs_lock = browser.get_tabs();
                let tabs = tabs_lock.lock().unwrap();
                if let Some(t) = tabs.first() {
                    eprintln!("[Hands] Using existing tab.");
                    t.clone()
                } else {
                    eprintln!("[Hands] No tabs found, creating new one.");
                    browser.new_tab()?
                }
            };

            return Ok(Self {
                _browser: browser,
                tab,
            });
        }

        eprintln!("[Hands] Could not attach. Launching with a shadow profile...");

        let chrome_path = find_chrome()?;

        // Use a shadow profile to avoid locking the real one.
        let agent_profile = std::env::current_dir()?.join("agent_profile");
        if !agent_profile.exists() {
            eprintln!(
                "[Hands] Creating new shadow profile at: {:?}",
                agent_profile
            );
            std::fs::create_dir_all(&agent_profile)?;
        } else {
            eprintln!("[Hands] Using existing shadow profile.");
        }

        let options = LaunchOptions {
            headless: false,
            path: Some(chrome_path),
            user_data_dir: Some(agent_profile.clone()),
            args: vec![
                std::ffi::OsStr::new("--no-first-run"),
                std::ffi::OsStr::new("--no-default-browser-check"),
                std::ffi::OsStr::new("--disable-infobars"),
                std::ffi::OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: std::time::Duration::from_secs(60),
            ..Default::default()
        };

        eprintln!("[Hands] Starting Chrome (shadow profile)...");
        let browser = Browser::new(options).map_err(|e| {
            eprintln!("[Hands] Browser launch failed: {}", e);
            anyhow::anyhow!("Browser launch failed: {}", e)
        })?;

        eprintln!("[Hands] Chrome started, creating tab...");
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;

        eprintln!("[Hands] Chrome ready.");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

// Helper to find the Chrome executable across platforms.
fn find_chrome() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_PATH") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    let mut candidates: Vec<PathBuf> = vec![
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/google-chrome-stable"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(
            local
                .join("Google")
                .join("Chrome")
                .join("Application")
                .join("chrome.exe"),
        );
    }

    for p in &candidates {
        if p.exists() {
            return Ok(p.clone());
        }
    }

    anyhow::bail!(
        "Chrome executable not found. Install Google Chrome or set CHROME_PATH."
    )
}
