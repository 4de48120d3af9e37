//! URL openers used by the side-effecting tools

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to launch browser: {0}")]
    Launch(#[from] std::io::Error),

    #[error("browser launcher exited with {0}")]
    ExitStatus(std::process::ExitStatus),
}

/// Makes a URL visible to the user
#[async_trait]
pub trait UrlOpener: Send + Sync {
    async fn open(&self, url: &Url) -> Result<(), OpenError>;
}

/// Opens URLs in the desktop's default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl SystemBrowser {
    #[cfg(target_os = "macos")]
    fn command(url: &Url) -> Command {
        let mut cmd = Command::new("open");
        cmd.arg(url.as_str());
        cmd
    }

    /// Hands the URL to the protocol handler directly; `cmd /C start` would
    /// interpret `&` and `|` in the query string
    #[cfg(target_os = "windows")]
    fn command(url: &Url) -> Command {
        let mut cmd = Command::new("rundll32");
        cmd.args(["url.dll,FileProtocolHandler", url.as_str()]);
        cmd
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn command(url: &Url) -> Command {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url.as_str());
        cmd
    }
}

#[async_trait]
impl UrlOpener for SystemBrowser {
    async fn open(&self, url: &Url) -> Result<(), OpenError> {
        debug!(url = %url, "Launching system browser");
        let status = Self::command(url).status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(OpenError::ExitStatus(status))
        }
    }
}

/// Logs URLs instead of opening them, for headless deployments
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingOpener;

#[async_trait]
impl UrlOpener for LoggingOpener {
    async fn open(&self, url: &Url) -> Result<(), OpenError> {
        info!(url = %url, "Open URL");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_opener_always_succeeds() {
        let url = Url::parse("https://example.com").unwrap();
        assert!(LoggingOpener.open(&url).await.is_ok());
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    #[test]
    fn test_system_browser_uses_xdg_open() {
        let url = Url::parse("https://example.com/a?b=c").unwrap();
        let cmd = SystemBrowser::command(&url);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "xdg-open");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec!["https://example.com/a?b=c"]);
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn test_system_browser_bypasses_shell() {
        let url = Url::parse("https://x.com/?a=1&calc").unwrap();
        let cmd = SystemBrowser::command(&url);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "rundll32");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec!["url.dll,FileProtocolHandler", "https://x.com/?a=1&calc"]);
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_system_browser_uses_open() {
        let url = Url::parse("https://x.com/?a=1&b=2").unwrap();
        let cmd = SystemBrowser::command(&url);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "open");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec!["https://x.com/?a=1&b=2"]);
    }
}
