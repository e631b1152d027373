use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use clap::Parser;

use crate::models::listing::SearchQuery;

/// Upper bound for `--pages`; job boards stop serving results long before this.
const MAX_PAGES: i64 = 1000;

#[derive(Parser, Debug, Clone)]
#[command(name = "jobscout", about = "Scheduled job-board collector")]
pub struct Config {
    /// Primary search query
    #[arg(long, env = "MAIN_TAG")]
    pub main_tag: String,

    /// Cities to search in, comma separated
    #[arg(long, env = "CITIES", value_delimiter = ',', default_value = "Москва")]
    pub cities: Vec<String>,

    /// Keywords that must all appear in a listing's description, comma separated
    #[arg(long, env = "EXTRA_TAGS", value_delimiter = ',')]
    pub extra_tags: Vec<String>,

    /// Number of result pages to scan per run
    #[arg(long, env = "NUMBER_OF_PAGES", default_value = "3", value_parser = clap::value_parser!(u32).range(0..=MAX_PAGES))]
    pub pages: u32,

    /// Directory holding the per-source state files
    #[arg(long, env = "STATE_DIR", default_value = ".")]
    pub state_dir: PathBuf,

    /// Sources to collect from, comma separated
    #[arg(long, env = "SOURCES", value_delimiter = ',', default_value = "headhunter,superjob")]
    pub sources: Vec<String>,

    /// Daily local time of the HeadHunter run (HH:MM)
    #[arg(long, env = "HEADHUNTER_AT", default_value = "17:00", value_parser = parse_time_of_day)]
    pub headhunter_at: NaiveTime,

    /// Daily local time of the SuperJob run (HH:MM)
    #[arg(long, env = "SUPERJOB_AT", default_value = "18:00", value_parser = parse_time_of_day)]
    pub superjob_at: NaiveTime,

    /// WebDriver endpoint used for sources that need browser rendering
    #[arg(long, env = "WEBDRIVER_URL", default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    /// Maximum seconds to wait for a single page
    #[arg(long, env = "FETCH_TIMEOUT", default_value = "30")]
    pub fetch_timeout: u64,

    /// Milliseconds to let a rendered page settle before reading it
    #[arg(long, env = "RENDER_WAIT_MS", default_value = "2000")]
    pub render_wait_ms: u64,

    /// Scheduler tick in milliseconds
    #[arg(long, env = "TICK_MS", default_value = "1000")]
    pub tick_ms: u64,

    /// Write logs to this file (truncated on start) instead of stderr
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Run every source at its daily time, forever (default when no subcommand given)
    Schedule,
    /// Run a single collection for one source right now and exit
    Collect {
        /// Source name, e.g. headhunter
        #[arg(long)]
        source: String,
    },
}

impl Config {
    /// Resolve the command, defaulting to Schedule if none specified.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Schedule)
    }

    pub fn search_query(&self) -> SearchQuery {
        let clean = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        SearchQuery {
            main_tag: self.main_tag.trim().to_string(),
            cities: clean(&self.cities),
            extra_tags: clean(&self.extra_tags),
            page_count: self.pages,
        }
    }

    /// Daily fire time for a source; unknown sources fall back to the HeadHunter slot.
    pub fn fire_time(&self, source: &str) -> NaiveTime {
        match source {
            "superjob" => self.superjob_at,
            _ => self.headhunter_at,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    pub fn render_wait(&self) -> Duration {
        Duration::from_millis(self.render_wait_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| format!("expected HH:MM, got '{s}': {e}"))
}
