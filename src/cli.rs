//! Command-line interface definitions.
//!
//! Every option can also be supplied through the environment variable named
//! next to it, which is how the service is usually configured in a container.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the briefing ingestion service.
///
/// # Examples
///
/// ```sh
/// # Bundled site list, local SQLite file, API on port 5000
/// briefing_ingest
///
/// # Custom sites and a shorter interval
/// briefing_ingest --config sites.yaml --interval-hours 2
///
/// # One pass, no API
/// briefing_ingest --once
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a YAML site/category configuration (bundled defaults if omitted)
    #[arg(short, long, env = "BRIEFING_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite connection URL
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite://briefings.db?mode=rwc"
    )]
    pub database_url: String,

    /// Address the read API listens on
    #[arg(short, long, env = "BRIEFING_BIND", default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,

    /// Hours between ingestion passes
    #[arg(
        long,
        env = "SCRAPE_INTERVAL_HOURS",
        default_value_t = 8,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval_hours: u64,

    /// Sentences kept in each summary
    #[arg(long, env = "SUMMARY_SENTENCES", default_value_t = 5)]
    pub summary_sentences: usize,

    /// Keywords extracted per page
    #[arg(long, env = "KEYWORD_COUNT", default_value_t = 10)]
    pub keyword_count: usize,

    /// Seconds between scheduler checks
    #[arg(
        long,
        env = "POLL_SECONDS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_seconds: u64,

    /// Run one ingestion pass and exit without serving the API
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours * 3600)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["briefing_ingest"]);

        assert_eq!(cli.config, None);
        assert_eq!(cli.bind, "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(cli.interval(), Duration::from_secs(8 * 3600));
        assert_eq!(cli.poll(), Duration::from_secs(60));
        assert_eq!(cli.summary_sentences, 5);
        assert_eq!(cli.keyword_count, 10);
        assert!(!cli.once);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "briefing_ingest",
            "-c",
            "/etc/briefing/sites.yaml",
            "--database-url",
            "sqlite::memory:",
            "--bind",
            "127.0.0.1:8080",
            "--interval-hours",
            "2",
            "--once",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/briefing/sites.yaml")));
        assert_eq!(cli.database_url, "sqlite::memory:");
        assert_eq!(cli.bind.port(), 8080);
        assert_eq!(cli.interval_hours, 2);
        assert!(cli.once);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(Cli::try_parse_from(["briefing_ingest", "--interval-hours", "0"]).is_err());
    }
}
