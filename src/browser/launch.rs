use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Browser launch settings as named capabilities rather than raw flags.
///
/// `false` on a capability switches that subsystem off. The default is the
/// hardened container profile: headless, no sandbox, no GPU, no telemetry,
/// no background throttling, no extensions, no `/dev/shm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub headless: bool,
    pub sandbox: bool,
    pub gpu: bool,
    pub telemetry: bool,
    pub background_throttling: bool,
    pub extensions: bool,
    pub shared_memory: bool,
    pub window: (u32, u32),
    pub user_agent: String,
    pub executable: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            gpu: false,
            telemetry: false,
            background_throttling: false,
            extensions: false,
            shared_memory: false,
            window: (1920, 1080),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            executable: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl LaunchConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let (width, height) = self.window;
        if width == 0 || height == 0 {
            anyhow::bail!("browser window must be non-empty, got {width}x{height}");
        }
        if self.user_agent.trim().is_empty() {
            anyhow::bail!("browser user agent is empty");
        }
        if self.request_timeout.is_zero() {
            anyhow::bail!("browser request timeout must be positive");
        }
        if let Some(path) = &self.executable {
            if !path.is_file() {
                anyhow::bail!("browser executable not found: {}", path.display());
            }
        }
        Ok(())
    }

    /// Command-line flags for the configured capabilities.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<&str> = vec!["--mute-audio", "--hide-scrollbars"];
        let mut disabled_features = vec!["VizDisplayCompositor"];

        if !self.sandbox {
            args.extend(["--no-sandbox", "--disable-setuid-sandbox", "--no-zygote"]);
        }
        if !self.gpu {
            args.extend(["--disable-gpu", "--disable-accelerated-2d-canvas"]);
        }
        if !self.shared_memory {
            args.push("--disable-dev-shm-usage");
        }
        if !self.telemetry {
            args.extend([
                "--no-first-run",
                "--no-default-browser-check",
                "--no-pings",
                "--disable-background-networking",
                "--disable-client-side-phishing-detection",
                "--disable-domain-reliability",
                "--disable-default-apps",
                "--disable-sync",
                "--disable-translate",
            ]);
            disabled_features.push("TranslateUI");
        }
        if !self.background_throttling {
            args.extend([
                "--disable-background-timer-throttling",
                "--disable-backgrounding-occluded-windows",
                "--disable-renderer-backgrounding",
                "--disable-ipc-flooding-protection",
                "--disable-hang-monitor",
            ]);
            disabled_features.push("AudioServiceOutOfProcess");
        }
        if !self.extensions {
            args.extend([
                "--disable-extensions",
                "--disable-plugins",
                "--disable-component-extensions-with-background-pages",
            ]);
        }

        let mut out = args.into_iter().map(String::from).collect::<Vec<_>>();
        out.push(format!("--disable-features={}", disabled_features.join(",")));
        out.push(format!("--user-agent={}", self.user_agent));
        out
    }
}
