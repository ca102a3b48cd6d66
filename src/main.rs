//! Bot Publisher - 可插拔的 bot 项目发布服务
//!
//! Usage:
//! - Normal mode: `bot-publisher`
//! - With custom port: `bot-publisher --port 5001`
//! - Custom directories: `bot-publisher --plugins-dir ./plugins --data-dir ./data`

use std::path::PathBuf;

use bot_publisher::RuntimeConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                i += 2;
            }
            "--plugins-dir" if i + 1 < args.len() => {
                config.plugins_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--data-dir" if i + 1 < args.len() => {
                config.data_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("Bot Publisher - 可插拔的 bot 项目发布服务");
    println!();
    println!("USAGE:");
    println!("    bot-publisher [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>          Override the listening port");
    println!("    --plugins-dir <DIR>    Directory scanned for publish plugins");
    println!("    --data-dir <DIR>       Directory for published artifacts");
    println!("    -h, --help             Print help information");
    println!();
    println!("EXAMPLES:");
    println!("    bot-publisher                          # Normal mode");
    println!("    bot-publisher --port 5001              # Custom port");
    println!("    bot-publisher --plugins-dir ./plugins  # Custom plugin directory");
}

fn main() {
    let config = parse_args();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bot_publisher=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(bot_publisher::init_and_run_with_config(config)) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
