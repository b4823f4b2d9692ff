use clap::{Arg, Command};
use log::LevelFilter;
use phishhound::analyzer::{AnalysisEngine, EmailContent};
use phishhound::config::Config;
use phishhound::{html_report, mime};
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("phishhound")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Email threat triage: investigate a suspicious email and score it")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/phishhound.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and show which services are usable")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("analyze")
                .long("analyze")
                .value_name("FILE")
                .help("Analyze a raw email file and print the triage report")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("html")
                .long("html")
                .help("Also print the rendered HTML report")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("mock")
                .long("mock")
                .help("Use fixture intelligence data instead of live services")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let mut config = load_config(config_path);
    if matches.get_flag("mock") {
        config.use_mock_data = true;
    }

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    if let Some(email_file) = matches.get_one::<String>("analyze") {
        analyze_file(&config, email_file, matches.get_flag("html")).await;
        return;
    }

    eprintln!("Nothing to do. Try --analyze <FILE>, or --help for all options.");
    process::exit(2);
}

fn load_config(path: &str) -> Config {
    if !std::path::Path::new(path).exists() {
        log::warn!("Configuration file {path} not found, using defaults");
        return Config::default();
    }
    match Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration from {path}: {e}");
            process::exit(1);
        }
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => println!("Default configuration written to {path}"),
        Err(e) => {
            eprintln!("Failed to write configuration to {path}: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("Configuration is valid.");
    println!();
    let state = |key: &Option<String>| if key.is_some() { "configured" } else { "not configured" };
    println!("Reputation service:  {}", state(&config.vt_api_key));
    println!("URL sandbox:         {}", state(&config.urlscan_api_key));
    println!("Synthesis assistant: {}", state(&config.assistant_api_key));
    println!("Fallback recipient:  {}", config.inbox_address.as_deref().unwrap_or("none"));
    if config.use_mock_data {
        println!();
        println!("Mock data mode is enabled; no live services will be contacted.");
    }
}

async fn analyze_file(config: &Config, path: &str, with_html: bool) {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Failed to read {path}: {e}");
            process::exit(1);
        }
    };

    let parsed = mime::parse_email(&raw);
    let email = EmailContent {
        id: format!("file:{path}"),
        sender: parsed.sender,
        subject: parsed.subject,
        plain_body: parsed.plain_body,
        html_body: parsed.html_body,
        auth_results: parsed.auth_results,
    };

    let engine = match AnalysisEngine::new(config.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to initialize analysis engine: {e}");
            process::exit(1);
        }
    };

    let result = engine.analyze(&email).await;
    println!("{}", result.report_text);
    if with_html {
        println!();
        println!("{}", html_report::render_html(&result));
    }
}
