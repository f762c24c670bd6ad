mod ui;

use std::fs::File;
use std::time::{Duration, Instant};

use tonebox_audio::{CpalBackend, CpalMicrophone, NullBackend, SynthBackend};
use tonebox_core::midi::MidirTransport;
use tonebox_core::Performance;
use ui::{App, RatatuiBackend};

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("tonebox")
        .join("tonebox.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/tonebox.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("tonebox: cannot create log file: {}", e);
            return;
        }
    };

    if WriteLogger::init(log_level, Config::default(), log_file).is_err() {
        eprintln!("tonebox: logger already initialized");
        return;
    }

    log::info!("tonebox starting (log level: {:?})", log_level);
}

fn build_performance() -> Result<Performance, tonebox_core::PerformanceError> {
    let settings = tonebox_core::config::Config::load().settings()?;

    let backend: Box<dyn SynthBackend> = if std::env::var("TONEBOX_NO_AUDIO").is_ok() {
        log::info!("audio disabled by TONEBOX_NO_AUDIO");
        Box::new(NullBackend::new())
    } else {
        Box::new(CpalBackend::new())
    };
    let transport = MidirTransport::new(settings.midi.client_name.clone());

    Performance::new(settings, backend, Box::new(transport), Box::new(CpalMicrophone::new()))
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let perf = match build_performance() {
        Ok(perf) => perf,
        Err(e) => {
            log::error!("startup failed: {}", e);
            eprintln!("tonebox: {}", e);
            std::process::exit(1);
        }
    };
    let mut app = App::new(perf);

    let mut backend = RatatuiBackend::new()?;
    backend.start()?;

    let result = run(&mut backend, &mut app);

    app.perf.shutdown();
    backend.stop()?;
    result
}

fn run(backend: &mut RatatuiBackend, app: &mut App) -> std::io::Result<()> {
    loop {
        backend.draw(|frame| ui::view::render(frame, app))?;

        if let Some(key) = backend.poll_key(Duration::from_millis(16))? {
            if let Some(cmd) = ui::command_for(key) {
                if !app.apply(cmd) {
                    return Ok(());
                }
            }
        }

        let report = app.perf.tick(Instant::now());
        if !report.takes_completed.is_empty() {
            app.clamp_selection();
        }
    }
}
