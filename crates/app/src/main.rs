mod headless;

use std::process;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

fn init_logging(level: LevelFilter) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(level))
        .init();
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let parsed = match headless::parse_args(&args) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("{err}");
            headless::print_help();
            process::exit(2);
        }
    };
    if parsed.help {
        headless::print_help();
        return;
    }

    init_logging(parsed.log_level);
    tracing::info!("meshflow starting");

    let report = match headless::run(&parsed) {
        Ok(report) => report,
        Err(err) => {
            tracing::error!("{err}");
            process::exit(1);
        }
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            tracing::error!("failed to encode report: {err}");
            process::exit(1);
        }
    }
    tracing::info!("meshflow: completed");
}
