use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::io::Read;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Command, EnhanceArgs, FeedArgs, FunctionArgs, RootArgs, TrackArgs};
use memory_capsule::action::{ActionTransport, HttpActionTransport, InProcessAction};
use memory_capsule::capsule::{self, Capsule};
use memory_capsule::config::{self, CapsuleConfig};
use memory_capsule::enhance::{EnhancementProgress, EnhancementService};
use memory_capsule::function::{parse_request_body, EnhanceFunction, EnhancementResult};
use memory_capsule::platform::{start_enhancement, FunctionExecutor, PlatformClient};
use memory_capsule::present;
use memory_capsule::provider::{router_model, RouterClient};
use memory_capsule::realtime::PollingRealtime;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);
    let config = config::load_config(args.config.as_deref())?;

    match args.command {
        Command::Function(args) => cmd_function(&config, args),
        Command::Enhance(args) => cmd_enhance(&config, args),
        Command::Track(args) => cmd_track(&config, args),
        Command::Feed(args) => cmd_feed(&config, args),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_function(config: &CapsuleConfig, args: FunctionArgs) -> Result<()> {
    let raw = match args.body {
        Some(body) => body,
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("read request body from stdin")?;
            body
        }
    };

    let provider = RouterClient::new(&config.provider_url, config.hf_token.clone());
    let model = router_model(&config.model, config.inference_provider.as_deref());
    let function = EnhanceFunction::new(&provider, model);
    let response = function.handle(parse_request_body(&raw).as_ref());

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_enhance(config: &CapsuleConfig, args: EnhanceArgs) -> Result<()> {
    let platform = Arc::new(PlatformClient::new(config.platform()?));
    let function_id = config.function_id()?;
    let service = build_service(config, platform.clone(), &function_id);

    let mut on_progress = print_progress;
    let result = if args.realtime {
        let execution_id =
            start_enhancement(platform.as_ref(), &function_id, args.text.trim())?;
        eprintln!("execution: {execution_id}");
        service.enhance_text_with_realtime(&execution_id, &mut on_progress)?
    } else {
        service.enhance_text(&args.text, &mut on_progress)?
    };
    print_result(&result, args.json)
}

fn cmd_track(config: &CapsuleConfig, args: TrackArgs) -> Result<()> {
    let platform = Arc::new(PlatformClient::new(config.platform()?));
    let function_id = config.function_id()?;
    let service = build_service(config, platform, &function_id);

    let mut on_progress = print_progress;
    let result = service.enhance_text_with_realtime(&args.execution_id, &mut on_progress)?;
    print_result(&result, args.json)
}

fn cmd_feed(config: &CapsuleConfig, args: FeedArgs) -> Result<()> {
    let platform = PlatformClient::new(config.platform()?);
    let now = Utc::now();

    let entries: Vec<present::FeedEntry> = capsule::load_public_capsules(&platform)
        .into_iter()
        .filter_map(|record| {
            let title = record.title.clone();
            match Capsule::try_from(record) {
                Ok(capsule) => Some(present::feed_entry(&capsule, now)),
                Err(err) => {
                    tracing::warn!(title = %title, error = %err, "skipping invalid capsule");
                    None
                }
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No public capsules yet.");
        return Ok(());
    }
    for entry in &entries {
        println!("{} [{}] {}", entry.title, entry.status, entry.unlock);
        if let Some(created) = &entry.created {
            println!("  created {created}");
        }
        if !entry.preview.is_empty() {
            println!("  {}", entry.preview);
        }
    }
    Ok(())
}

fn build_service(
    config: &CapsuleConfig,
    executor: Arc<dyn FunctionExecutor>,
    function_id: &str,
) -> EnhancementService {
    let action: Box<dyn ActionTransport> = match config.action_url.as_deref() {
        Some(url) => Box::new(HttpActionTransport::new(url)),
        None => Box::new(InProcessAction::new(Arc::clone(&executor), function_id)),
    };
    let realtime = PollingRealtime::new(executor, function_id, config.poll_interval());
    EnhancementService::new(action, Box::new(realtime)).with_timeout(config.realtime_timeout())
}

fn print_progress(progress: &EnhancementProgress) {
    eprintln!("[{}] {}", progress.status(), progress.message());
}

fn print_result(result: &EnhancementResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", result.enhanced_text);
    }
    Ok(())
}
