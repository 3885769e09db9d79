// Main entry point
mod interfaces;
mod presentation;

use clap::Parser;
use colored::Colorize;
use interfaces::cli::{parse_endpoint, Cli};
use presentation::theme::Theme;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tmq::infrastructure::config::{self, Config};
use tmq::infrastructure::corpus::load_document;
use tmq::{
    DispatchEvent, Dispatcher, DispatcherHandle, Endpoint, LocalCorpusProvider, MatchRecord,
    Provider, QueryContext, RemoteServiceProvider, Subscription,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config()?;

    // Initialize logging
    if config.logging.enable {
        init_logging(&config.logging)?;
    }

    if cli.generate_config {
        config::generate_config_sample()?;
        return Ok(());
    }

    let providers = build_providers(&cli, &config).await?;
    if providers.is_empty() {
        eprintln!("{}", "No provider enabled".red());
        std::process::exit(1);
    }

    let context = QueryContext::new(
        cli.source.clone().or_else(|| config.source_lang.clone()),
        cli.target.clone().or_else(|| config.target_lang.clone()),
    );

    if cli.status {
        print_status(&providers, &context);
        return Ok(());
    }

    let theme_name = cli.theme.as_deref().unwrap_or(config.display.theme.as_str());
    let theme = Theme::from_name(theme_name);
    // Remote answers can take up to the timeout, give them a little extra
    let settle_limit = config.remote.timeout() + Duration::from_secs(1);

    let dispatcher = Dispatcher::spawn(providers, context);
    let printer = tokio::spawn(print_events(
        dispatcher.subscribe(),
        theme,
        cli.json,
        config.display.enable_emoji,
    ));

    let interrupted = tokio::select! {
        result = feed_queries(&dispatcher, &cli.query) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted, shutting down...");
            true
        }
    };

    if !interrupted {
        wait_until_idle(&dispatcher, settle_limit).await;
    }
    dispatcher.close().await?;
    printer.await?;

    Ok(())
}

async fn build_providers(cli: &Cli, config: &Config) -> anyhow::Result<Vec<Arc<dyn Provider>>> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

    if config.local.enable && !cli.no_local {
        let local = LocalCorpusProvider::new("current-file", config.local.matcher_options());
        if let Some(path) = &cli.corpus {
            let document = load_document(path).await?;
            local.reload(&document).await?;
        }
        providers.push(Arc::new(local));
    }

    let endpoint = match &cli.remote {
        Some(value) => {
            let (host, port) = parse_endpoint(value)
                .ok_or_else(|| anyhow::anyhow!("Invalid remote '{}', expected HOST:PORT", value))?;
            Some(Endpoint::new(host, port))
        }
        None if config.remote.enable => Some(Endpoint::new(
            config.remote.host.clone(),
            config.remote.port,
        )),
        None => None,
    };
    if let Some(endpoint) = endpoint {
        let remote = RemoteServiceProvider::new("remote-tm", endpoint, config.remote.timeout())?;
        providers.push(Arc::new(remote));
    }

    Ok(providers)
}

/// Submit the query from the command line, or one query per stdin line.
async fn feed_queries(dispatcher: &DispatcherHandle, query: &[String]) -> anyhow::Result<()> {
    if !query.is_empty() {
        dispatcher.submit_query(query.join(" "));
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !line.is_empty() {
            dispatcher.submit_query(line);
        }
    }
    Ok(())
}

/// Wait for pending lookups to resolve, up to `limit`.
async fn wait_until_idle(dispatcher: &DispatcherHandle, limit: Duration) {
    let started = Instant::now();
    while started.elapsed() < limit {
        match dispatcher.stats().await {
            Ok(stats) if stats.in_flight() > 0 => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            _ => return,
        }
    }
}

async fn print_events(mut subscription: Subscription, theme: Theme, json: bool, enable_emoji: bool) {
    while let Some(event) = subscription.recv().await {
        if let DispatchEvent::MatchFound {
            provider,
            query,
            results,
        } = event
        {
            if json {
                let line = serde_json::json!({
                    "provider": provider,
                    "query": query,
                    "results": results,
                });
                println!("{}", line);
            } else {
                print!(
                    "{}",
                    format_matches(provider.as_str(), &query, &results, &theme, enable_emoji)
                );
            }
        }
    }
}

/// Format one provider's answer as string
fn format_matches(
    provider: &str,
    query: &str,
    results: &[MatchRecord],
    theme: &Theme,
    enable_emoji: bool,
) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    let indicator = if enable_emoji {
        format!("💾 [{}]", provider)
    } else {
        format!("[{}]", provider)
    };
    writeln!(output, "{} {}", (theme.title)(query), (theme.provider)(&indicator)).ok();

    if results.is_empty() {
        writeln!(output, "  {}", (theme.line)("no matches")).ok();
        writeln!(output).ok();
        return output;
    }

    let prefix = if enable_emoji { "≫" } else { ">" };
    for (i, record) in results.iter().enumerate() {
        let quality = record
            .quality()
            .map(|q| format!("{}%", q))
            .unwrap_or_else(|| "?".to_string());
        writeln!(
            output,
            "  {}. {} {}",
            (theme.idx)(&(i + 1).to_string()),
            (theme.quality)(&format!("[{}]", quality)),
            (theme.target)(record.target_text())
        )
        .ok();

        let mut detail = format!("{}   {}", prefix, (theme.source)(record.source_text()));
        if let Some(context) = record.context() {
            write!(detail, "  {}", (theme.context)(&format!("({})", context))).ok();
        }
        writeln!(output, "     {}", detail).ok();
    }

    writeln!(output).ok();
    output
}

fn print_status(providers: &[Arc<dyn Provider>], context: &QueryContext) {
    println!("{}", "tmq Status".green().bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Languages: {}", context);
    for provider in providers {
        println!("Provider: {}", provider.id());
    }
    println!(
        "Config: {}",
        config::get_config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "Not found".to_string())
    );
}

/// Initialize logging with path and level configuration
fn init_logging(logging: &config::Logging) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let level = logging.filter_directive();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(path) = &logging.path {
        if !path.is_empty() {
            // Log to file
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .init();
            return Ok(());
        }
    }

    // Log to stderr (default)
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
