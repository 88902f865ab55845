//! sitevault CLI: crawl a site into a browsable offline mirror.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use sitevault::{
    CrawlConfig, CrawlEngine, CrawlEvent, CrawlScope, FileTypePolicy, LogLevel, archive,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScopeArg {
    SameHost,
    SameDomain,
    Subdomains,
    Custom,
}

impl From<ScopeArg> for CrawlScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::SameHost => Self::SameHost,
            ScopeArg::SameDomain => Self::SameDomain,
            ScopeArg::Subdomains => Self::Subdomains,
            ScopeArg::Custom => Self::Custom,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "sitevault",
    version,
    about = "Archive a website for offline browsing"
)]
struct Cli {
    /// Seed URL to start crawling from
    url: String,

    /// Base directory for job sandboxes
    #[arg(long, default_value = "./archive")]
    output: PathBuf,

    /// Page admission scope relative to the seed host
    #[arg(long, value_enum, default_value_t = ScopeArg::SameHost)]
    scope: ScopeArg,

    /// Additional allowed host (repeatable, implies --scope custom rules)
    #[arg(long = "domain")]
    custom_domains: Vec<String>,

    /// Glob whitelist over page URLs (repeatable)
    #[arg(long = "include")]
    include_paths: Vec<String>,

    /// Glob blacklist over page URLs (repeatable)
    #[arg(long = "exclude")]
    exclude_paths: Vec<String>,

    /// Lift the depth and page-count ceilings
    #[arg(long)]
    unlimited: bool,

    #[arg(long, default_value_t = 5)]
    max_depth: u32,

    #[arg(long, default_value_t = 500)]
    max_pages: usize,

    /// Per-response byte ceiling
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Aggregate storage byte ceiling
    #[arg(long)]
    max_total_size: Option<u64>,

    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Baseline inter-request delay in milliseconds (jittered per request)
    #[arg(long, default_value_t = 250)]
    delay_ms: u64,

    /// Per-request deadline in milliseconds
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// Fixed User-Agent (default: rotate through a browser pool)
    #[arg(long)]
    user_agent: Option<String>,

    /// Cookies for the seed host, "name=value; name2=value2"
    #[arg(long)]
    cookies: Option<String>,

    /// Do not consult robots.txt
    #[arg(long)]
    ignore_robots: bool,

    /// Treat redirects as terminal responses instead of following them
    #[arg(long)]
    no_follow_redirects: bool,

    #[arg(long, default_value_t = 10)]
    max_redirects: u32,

    /// Disable SSRF private-address blocking (intranet mirrors only)
    #[arg(long)]
    allow_private_networks: bool,

    /// Skip a content category (repeatable): js, images, fonts, media,
    /// documents, other
    #[arg(long = "skip")]
    skip_types: Vec<String>,

    /// Also pack the finished mirror into a ZIP at this path
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Print progress events as they happen
    #[arg(long, short)]
    verbose: bool,
}

fn file_types_from(skips: &[String]) -> Result<FileTypePolicy> {
    let mut policy = FileTypePolicy::default();
    for skip in skips {
        match skip.to_ascii_lowercase().as_str() {
            "html" => policy.html = false,
            "css" => policy.css = false,
            "js" => policy.js = false,
            "images" => policy.images = false,
            "fonts" => policy.fonts = false,
            "media" => policy.media = false,
            "documents" => policy.documents = false,
            "other" => policy.other = false,
            unknown => anyhow::bail!("unknown content category '{unknown}'"),
        }
    }
    Ok(policy)
}

fn build_config(cli: &Cli) -> Result<CrawlConfig> {
    let scope = if cli.custom_domains.is_empty() {
        cli.scope.into()
    } else {
        CrawlScope::Custom
    };
    let mut custom_domains = cli.custom_domains.clone();
    if scope == CrawlScope::Custom {
        // The seed host is always admissible.
        if let Ok(seed) = url::Url::parse(&cli.url)
            && let Some(host) = seed.host_str()
        {
            custom_domains.push(host.to_string());
        }
    }

    let mut builder = CrawlConfig::builder()
        .seed_url(cli.url.clone())
        .output_root(cli.output.clone())
        .scope(scope)
        .custom_domains(custom_domains)
        .include_paths(cli.include_paths.clone())
        .exclude_paths(cli.exclude_paths.clone())
        .unlimited_mode(cli.unlimited)
        .max_depth(cli.max_depth)
        .max_pages(cli.max_pages)
        .file_types(file_types_from(&cli.skip_types)?)
        .concurrency(cli.concurrency)
        .delay_ms(cli.delay_ms)
        .timeout_ms(cli.timeout_ms)
        .respect_robots_txt(!cli.ignore_robots)
        .follow_redirects(!cli.no_follow_redirects)
        .max_redirects(cli.max_redirects)
        .allow_private_networks(cli.allow_private_networks);

    if let Some(size) = cli.max_file_size {
        builder = builder.max_file_size(size);
    }
    if let Some(size) = cli.max_total_size {
        builder = builder.max_total_size(size);
    }
    if let Some(ua) = &cli.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    if let Some(cookies) = &cli.cookies {
        builder = builder.cookies(cookies.clone());
    }

    builder.build().context("invalid configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = build_config(&cli)?;
    let job_id = uuid::Uuid::new_v4().simple().to_string();
    let engine = Arc::new(
        CrawlEngine::new(job_id.clone(), &cli.url, config).context("cannot create crawl job")?,
    );

    // Ctrl-C cancels; a second Ctrl-C kills the process the usual way.
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupt: cancelling crawl");
                engine.cancel();
            }
        });
    }

    let printer = {
        let mut events = engine.subscribe();
        let verbose = cli.verbose;
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(CrawlEvent::Progress { snapshot, .. }) => {
                        if verbose {
                            println!(
                                "[{}] pages {} / assets {} / {} bytes / {} errors - {}",
                                snapshot.status,
                                snapshot.pages_processed,
                                snapshot.assets_processed,
                                snapshot.bytes_downloaded,
                                snapshot.errors,
                                snapshot.current_url.as_deref().unwrap_or("-")
                            );
                        }
                    }
                    Ok(CrawlEvent::Log {
                        level: LogLevel::Warn | LogLevel::Error,
                        message,
                        context,
                        ..
                    }) => {
                        eprintln!("warn: {message} ({})", context.url.as_deref().unwrap_or("-"));
                    }
                    Ok(CrawlEvent::Completed { .. }) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
    };

    let outcome = engine.start().await?;
    let _ = printer.await;

    println!(
        "{}: {} pages, {} assets, {} bytes in {:.1}s ({} errors)",
        if outcome.success { "complete" } else { "finished with errors" },
        outcome.pages,
        outcome.assets,
        outcome.bytes,
        outcome.duration_ms as f64 / 1000.0,
        outcome.errors.len()
    );
    println!(
        "mirror: {}",
        engine
            .storage()
            .map(|s| s.root().display().to_string())
            .unwrap_or_default()
    );

    if let Some(archive_path) = &cli.archive
        && let Some(storage) = engine.storage()
    {
        let size = archive::pack_to_file(&storage, archive_path).await?;
        println!("archive: {} ({size} bytes)", archive_path.display());
    }

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
