use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use elchymin_agent::{Agent, Lifecycle};
use elchymin_core::{ElchyminConfig, EntityTag};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "elchymin.toml", env = "ELCHYMIN_CONFIG")]
    config: PathBuf,

    /// Directory holding the snapshot files (overrides the config)
    #[arg(short, long, env = "ELCHYMIN_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Who is typing at the terminal
    #[arg(short, long, default_value = "privileged")]
    entity: String,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq)]
enum Input {
    Quit,
    Status,
    Think,
    Save,
    Evolve,
    Diagnose,
    Feedback(f32),
    Speak(String),
    Empty,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "quit" | "exit" | "/quit" => Input::Quit,
        "/status" => Input::Status,
        "/think" => Input::Think,
        "/save" => Input::Save,
        "/evolve" => Input::Evolve,
        "/diagnose" => Input::Diagnose,
        "/good" => Input::Feedback(1.0),
        "/bad" => Input::Feedback(0.0),
        _ => Input::Speak(line.to_string()),
    }
}

fn init_tracing(args: &Args) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    // stdout is reserved for replies
    if args.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args);

    let mut config = ElchyminConfig::load_or_default(&args.config);
    if let Some(dir) = &args.state_dir {
        config.persistence.state_dir = dir.clone();
    }
    info!("Waking Elchymin (state in {})...", config.persistence.state_dir.display());

    let agent = Agent::start(config).await;
    let entity = EntityTag::parse(&args.entity);

    let mut watch = agent.subscribe();
    tokio::spawn(async move {
        let mut last = watch.borrow().lifecycle;
        while watch.changed().await.is_ok() {
            let now = watch.borrow_and_update().lifecycle;
            if now != last {
                if now == Lifecycle::SafeMode {
                    warn!("Agent entered safe mode; the heartbeat is suspended");
                }
                last = now;
            }
        }
    });

    println!("Elchymin is awake. Type 'quit' to exit, '/status' to look inside.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Status => println!("{}", serde_json::to_string_pretty(&agent.status())?),
            Input::Think => match agent.generate(None).await {
                Ok(thought) => println!("({}) {}", thought.archetype, thought.text),
                Err(e) => println!("[no thought: {}]", e),
            },
            Input::Save => match agent.save().await? {
                Ok(()) => println!("[saved]"),
                Err(e) => println!("[save failed: {}]", e),
            },
            Input::Evolve => match agent.evolve().await {
                Ok(lambda) => println!("Elchymin: evolved, λ is now {:.3}", lambda),
                Err(e) => println!("[no evolution: {}]", e),
            },
            Input::Diagnose => println!("{}", serde_json::to_string(&agent.diagnose().await?)?),
            Input::Feedback(score) => match agent.feedback(score).await? {
                Some(id) => println!("[new template variant #{}]", id),
                None => println!("[noted]"),
            },
            Input::Speak(message) => {
                let reply = agent.speak(&message, entity.clone()).await;
                println!("\nElchymin: {}\n", reply);
            }
        }
    }

    info!("Going to sleep...");
    agent.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("  "), Input::Empty);
        assert_eq!(parse_input("exit\n"), Input::Quit);
        assert_eq!(parse_input("/status"), Input::Status);
        assert_eq!(parse_input("/good"), Input::Feedback(1.0));
        assert_eq!(parse_input("/evolve"), Input::Evolve);
        assert_eq!(parse_input(" hello there "), Input::Speak("hello there".into()));
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["elchymin"]);
        assert_eq!(args.entity, "privileged");
        assert!(!args.json_logs);
    }
}
