use std::path::PathBuf;

/// Exit status for configuration, IO and other runtime failures
pub const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatArg {
    /// Colored text for terminals
    #[default]
    Text,
    /// Machine-readable JSON on stdout
    Json,
    /// Markdown, e.g. for $GITHUB_STEP_SUMMARY
    Markdown,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandArg {
    Simple,
    Moderate,
    Complex,
}

#[derive(clap::Parser, Debug)]
#[command(name = "perplexity-budget", version, about = "Perplexity API budget guard and issue analyzer")]
pub struct Args {
    /// Config file (TOML). Defaults to ~/.config/perplexity-budget/config.toml
    #[arg(long, global = true, env = "PPLX_BUDGET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Ledger file, overrides config and PPLX_LEDGER_PATH
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Response cache directory, overrides config and PPLX_CACHE_DIR
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Weekly budget in USD, overrides config and PPLX_WEEKLY_BUDGET
    #[arg(long, global = true)]
    pub budget: Option<f64>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = FormatArg::Text)]
    pub format: FormatArg,

    /// Debug logging (or set RUST_LOG)
    #[arg(short, long, global = true, env = "PPLX_DEBUG")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Analyze a batch of issues within the weekly budget
    Analyze {
        /// JSON array of issues (`gh issue list --json number,title,body,labels`)
        #[arg(long)]
        issues: PathBuf,

        /// Estimate costs only; no API calls, no ledger writes
        #[arg(long)]
        dry_run: bool,

        /// Analyze at most this many issues
        #[arg(long)]
        max: Option<usize>,

        /// Skip the response cache
        #[arg(long)]
        no_cache: bool,

        /// Also write the report to this file (format follows --format)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Classify text from --file or stdin into a complexity band
    Classify {
        #[arg(long)]
        file: Option<PathBuf>,

        /// Issue labels, comma-separated
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
    },

    /// Estimate the cost of one request
    Estimate {
        /// Model id; defaults to the band's tier model
        #[arg(long)]
        model: Option<String>,

        /// Pick the model and defaults from a complexity band
        #[arg(long, value_enum)]
        band: Option<BandArg>,

        #[arg(long = "in", default_value_t = 0)]
        tokens_in: u64,

        /// Defaults to the tier's max_tokens
        #[arg(long = "out")]
        tokens_out: Option<u64>,

        /// Defaults to the tier's search query count
        #[arg(long)]
        searches: Option<u64>,
    },

    /// Weekly budget status and gating
    Budget {
        #[command(subcommand)]
        action: BudgetAction,
    },

    /// Cost report over recent weeks
    Report {
        /// Number of ISO weeks to include
        #[arg(long, default_value_t = 4)]
        weeks: usize,
    },

    /// Response cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Ledger maintenance
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum BudgetAction {
    /// Show this week's spend against the budget
    Status,
    /// Gate a prospective request; exit 2 when denied, 1 when downgraded (with --strict)
    Check {
        /// Estimated cost of the request in USD
        #[arg(long, default_value_t = 0.0)]
        estimate: f64,

        /// Exit non-zero on warning as well as on denial
        #[arg(long)]
        strict: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum CacheAction {
    Stats,
    /// Remove expired entries
    Purge,
    /// Remove every entry
    Clear,
}

#[derive(clap::Subcommand, Debug)]
pub enum LedgerAction {
    /// Append a usage record made outside this tool
    Record {
        #[arg(long)]
        model: String,
        #[arg(long = "in", default_value_t = 0)]
        tokens_in: u64,
        #[arg(long = "out", default_value_t = 0)]
        tokens_out: u64,
        #[arg(long, default_value_t = 0)]
        searches: u64,
        /// Actual cost in USD; estimated from the model's pricing when omitted
        #[arg(long)]
        cost: Option<f64>,
        #[arg(long)]
        cached: bool,
        #[arg(long)]
        issue: Option<String>,
    },
    /// Drop records older than the last N ISO weeks
    Prune {
        #[arg(long, default_value_t = 12)]
        keep_weeks: usize,
    },
    /// Print records, optionally for one ISO week (YYYY-W##)
    Show {
        #[arg(long)]
        week: Option<String>,
    },
}

impl Args {
    pub fn parse() -> Self {
        <Args as clap::Parser>::parse()
    }
}
