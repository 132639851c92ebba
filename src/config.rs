use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "tactics-core")]
#[command(about = "Tactics Core - Chess tactics training backend")]
pub struct AppConfig {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value = "21430")]
    pub port: u16,

    /// Where progress, usage counters and limits.json live
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Curriculum JSON file. The built-in curriculum is used when omitted.
    #[arg(long)]
    pub curriculum: Option<PathBuf>,

    /// Key for signing anonymous usage cookies
    #[arg(long, env = "TACTICS_COOKIE_SECRET", hide_env_values = true)]
    pub cookie_secret: Option<String>,

    /// Mark issued cookies `Secure` (serve behind TLS)
    #[arg(long)]
    pub secure_cookies: bool,
}

impl AppConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tactics")
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::parse_from(["tactics-core"]);
        assert_eq!(config.addr(), "127.0.0.1:21430");
        assert!(config.curriculum.is_none());
        assert!(!config.secure_cookies);
        assert!(config.data_dir().ends_with("tactics"));
    }

    #[test]
    fn test_explicit_data_dir() {
        let config =
            AppConfig::parse_from(["tactics-core", "--data-dir", "/tmp/tactics-test", "--port", "8080"]);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/tactics-test"));
        assert_eq!(config.port, 8080);
    }
}
