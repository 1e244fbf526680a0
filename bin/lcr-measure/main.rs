use chrono::Utc;
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn, LevelFilter};
use rusty_lcr::{
    load_config, AppConfig, LcrClient, MeasurementRecord, Quantity, RecordLog,
};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

/// IM3536 measurement runner
#[derive(Parser, Debug)]
#[command(name = "lcr-measure")]
#[command(about = "Configure an IM3536 LCR meter and record measurements", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Quantities to measure, e.g. `-i Z -i PHASE`
    #[arg(short, long = "item", value_name = "QUANTITY")]
    items: Vec<Quantity>,

    /// Number of measurements, 0 runs until Ctrl+C
    #[arg(short = 'n', long)]
    count: Option<u32>,

    /// Directory for the measurement record log
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.log_level.clone());
    initialize_logging(&log_level);

    if let Some(count) = args.count {
        config.measurement.count = count;
    }
    if let Some(ref output) = args.output {
        config.logging.record_measurements = true;
        config.logging.output_path = output.display().to_string();
    }

    let quantities = if args.items.is_empty() {
        config
            .measurement
            .items
            .iter()
            .map(|name| name.parse::<Quantity>())
            .collect::<Result<Vec<_>, _>>()?
    } else {
        args.items.clone()
    };

    log_startup_info(&config, &quantities);

    let mut client = LcrClient::builder()
        .address(&config.instrument.host_ip)
        .port(config.instrument.port)
        .config(config.instrument.connection_config())
        .verify_policy(config.verify.policy())
        .build()?;

    client.initialize(&config.instrument.session_options())?;
    client.apply_settings(&config.settings)?;
    info!("Instrument settings applied");

    let shutdown_flag = setup_shutdown_handler()?;
    let mut records = if config.logging.record_measurements {
        let path = create_record_path(&config.logging.output_path);
        info!("Recording measurements to {}", path.display());
        Some(RecordLog::new(
            path,
            16,
            config.logging.final_format_json,
        ))
    } else {
        None
    };

    let result = run_measurements(&mut client, &config, &quantities, &shutdown_flag, &mut records);

    if let Some(mut records) = records {
        records.finalize()?;
    }

    match result {
        Ok(taken) => {
            if shutdown_flag.load(Ordering::SeqCst) {
                info!("Stopped by user after {taken} measurement(s)");
            } else {
                info!("Completed {taken} measurement(s)");
            }
            Ok(())
        }
        Err(e) => {
            error!("Measurement failed: {e}");
            Err(e.into())
        }
    }
}

fn run_measurements(
    client: &mut LcrClient,
    config: &AppConfig,
    quantities: &[Quantity],
    shutdown_flag: &AtomicBool,
    records: &mut Option<RecordLog<MeasurementRecord>>,
) -> Result<u32, rusty_lcr::LcrError> {
    let count = config.measurement.count;
    let interval = Duration::from_millis(config.measurement.interval_ms);
    let mut sequence = 0;

    while count == 0 || sequence < count {
        if shutdown_flag.load(Ordering::SeqCst) {
            break;
        }

        let values = client.perform_measurement(quantities.iter().copied())?;

        let mut line: Vec<(Quantity, f64)> = values.iter().collect();
        line.sort_by_key(|(q, _)| q.sort_key());
        let summary: Vec<String> = line
            .iter()
            .map(|(q, v)| format!("{}={:.6e}", q.token(), v))
            .collect();
        info!("#{sequence}: {}", summary.join(" "));

        if let Some(records) = records.as_mut() {
            records.add(MeasurementRecord::new(sequence, values))?;
        }

        sequence += 1;
        if !interval.is_zero() && (count == 0 || sequence < count) {
            thread::sleep(interval);
        }
    }

    Ok(sequence)
}

fn log_startup_info(config: &AppConfig, quantities: &[Quantity]) {
    info!("=== IM3536 Measurement ===");
    info!(
        "Instrument: {}:{}",
        config.instrument.host_ip, config.instrument.port
    );
    info!(
        "Frequency: {} Hz, level mode {:?}, speed {:?}",
        config.settings.frequency, config.settings.level_mode, config.settings.speed
    );

    let names: Vec<&str> = quantities.iter().map(|q| q.name()).collect();
    info!("Quantities: {}", names.join(", "));

    if config.measurement.count == 0 {
        info!("Measuring until interrupted");
    } else {
        info!("Measurements: {}", config.measurement.count);
    }
}

/// Set up Ctrl+C to stop the loop between measurements
fn setup_shutdown_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown_flag.clone();

    ctrlc::set_handler(move || {
        warn!("Ctrl+C received, stopping after the current measurement");
        handler_flag.store(true, Ordering::SeqCst);
    })?;

    Ok(shutdown_flag)
}

fn initialize_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

fn create_record_path(output_dir: &str) -> PathBuf {
    let filename = format!("lcr_{}.jsonl", Utc::now().format("%Y%m%d_%H%M%S"));
    PathBuf::from(output_dir).join(filename)
}
