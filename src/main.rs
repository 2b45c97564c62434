mod config;
mod display;
mod render;
mod scheduler;
mod sensor;
mod shutdown;
mod telemetry;

use std::sync::{Arc, RwLock};

use config::{ConfigWatcher, DisplayConfig, DisplayKind, SharedConfig};
use display::{Display, LogDisplay, SharedDisplay, TerminalDisplay};
use render::RenderLoop;
use scheduler::RepeatingScheduler;
use sensor::{IioSensor, SensorSampler};
use shutdown::{Cleanup, ShutdownCoordinator, SignalKind, Trigger};
use telemetry::SystemTelemetry;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!(
        "oledmon {}
A status daemon for small monochrome displays

USAGE:
    oledmon [OPTIONS]

OPTIONS:
    -h, --help       Print this help message
    -v, --version    Print version information

ENVIRONMENT:
    RUST_LOG         Set log level (error, warn, info, debug, trace)
    OLEDMON_CONFIG   Use this config file instead of the default

CONFIG:
    ~/.config/oledmon/config.toml

EXAMPLES:
    oledmon                    Run with default config
    RUST_LOG=debug oledmon     Run with debug logging",
        VERSION
    );
}

fn build_display(settings: &DisplayConfig) -> Box<dyn Display> {
    match settings.kind {
        DisplayKind::Terminal => Box::new(TerminalDisplay::stdout(settings.width, settings.height)),
        DisplayKind::Log => Box::new(LogDisplay::new(settings.width, settings.height)),
    }
}

fn main() {
    // Handle CLI arguments
    let args: Vec<String> = std::env::args().skip(1).collect();

    if !args.is_empty() {
        // Only the first argument is processed (flags don't combine)
        match args[0].as_str() {
            "-h" | "--help" => {
                print_help();
                return;
            }
            "-v" | "--version" => {
                println!("oledmon {}", VERSION);
                return;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[0]);
                eprintln!("Try 'oledmon --help' for more information.");
                std::process::exit(1);
            }
        }
    }

    // Logs go to stderr so they never interleave with the terminal panel.
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    logger
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {:>5} {}] {}",
                chrono::Utc::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )?;
            buf.flush()
        })
        .init();

    log::info!("Starting oledmon v{}", VERSION);

    let config_path = config::get_config_path();
    let config = config::load_config(&config_path);
    let shared: SharedConfig = Arc::new(RwLock::new(config.clone()));

    let display = SharedDisplay::new(build_display(&config.display));

    let (publisher, slot) = sensor::reading_slot();
    let mut sampler = SensorSampler::new(Box::new(IioSensor::new(&config.sensor.device)), publisher);
    let sensor_scheduler = Arc::new(RepeatingScheduler::new("sensor"));
    if let Err(e) = sensor_scheduler.start(config.sensor.interval(), move || sampler.tick()) {
        log::error!("Failed to start sensor scheduler: {}", e);
        std::process::exit(1);
    }
    log::info!(
        "Sampling {:?} every {:?}",
        config.sensor.device,
        config.sensor.interval()
    );

    let cleanup = Cleanup::new()
        .step("stop sensor scheduler", {
            let scheduler = Arc::clone(&sensor_scheduler);
            move || {
                if scheduler.is_running() {
                    scheduler.stop();
                }
                log::info!(
                    "Scheduler '{}' ran {} time(s)",
                    scheduler.name(),
                    scheduler.fired()
                );
                Ok(())
            }
        })
        .step("blank display", {
            let display = display.clone();
            move || display.blank().map_err(Into::into)
        });
    let coordinator = Arc::new(ShutdownCoordinator::new(cleanup));

    let listener = match coordinator.listen(&SignalKind::ALL) {
        Ok(listener) => Some(listener),
        Err(e) => {
            log::warn!("Failed to install signal handlers: {}", e);
            None
        }
    };

    let mut render = RenderLoop::new(display, SystemTelemetry::new(), slot, Arc::clone(&shared));
    match ConfigWatcher::new(Arc::clone(&shared), &config_path) {
        Ok(watcher) => render = render.with_watcher(watcher),
        Err(e) => log::warn!("Config hot reload disabled: {}", e),
    }

    if let Err(e) = render.run(&coordinator) {
        log::error!("{}", e);
        coordinator.trigger(Trigger::RenderFailure);
    }

    // The loop only stops on a signal; its cleanup and exit run on the
    // listener thread.
    if let Some(listener) = listener {
        listener.close();
    }
}
