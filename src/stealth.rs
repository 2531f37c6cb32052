//! Browser fingerprint hardening.
//!
//! Coupang fronts its search pages with anti-automation checks; a stock
//! headless Chrome gets the CAPTCHA interstitial almost immediately. The
//! script below runs before any page script (via
//! `Page.addScriptToEvaluateOnNewDocument`) and removes the obvious
//! automation tells.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;

static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    ]
});

/// Pick a random desktop user agent for one session.
pub fn pick_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36")
}

/// The stealth injection script. Must run before the first page script.
pub fn stealth_script() -> &'static str {
    r#"
        // Unmask `navigator.webdriver`
        Object.defineProperty(navigator, 'webdriver', {
            get: () => undefined,
        });

        // Headless Chrome ships without `window.chrome`; real Chrome never does.
        window.chrome = {
            runtime: {
                connect: function() {
                    return {
                        onMessage: { addListener: function() {}, removeListener: function() {} },
                        postMessage: function() {},
                        disconnect: function() {}
                    };
                },
                sendMessage: function() {},
                onMessage: { addListener: function() {}, removeListener: function() {} }
            },
            app: { isInstalled: false },
            csi: function() {},
            loadTimes: function() { return { navigationType: "Other", connectionInfo: "h2" }; }
        };

        // Standard plugin set; an empty PluginArray is a headless giveaway.
        Object.defineProperty(navigator, 'plugins', {
            get: () => {
                const pdf = {
                    description: "Portable Document Format",
                    filename: "internal-pdf-viewer",
                    length: 1,
                    name: "Chrome PDF Plugin"
                };
                const p = [pdf, pdf, pdf];
                Object.setPrototypeOf(p, PluginArray.prototype);
                return p;
            }
        });

        Object.defineProperty(navigator, 'languages', {
            get: () => ['ko-KR', 'ko', 'en-US', 'en'],
        });

        // Notification permission must not report 'prompt' under automation.
        const originalQuery = window.navigator.permissions.query;
        window.navigator.permissions.query = (parameters) => (
            parameters.name === 'notifications' ?
            Promise.resolve({ state: Notification.permission }) :
            originalQuery(parameters)
        );
    "#
}
