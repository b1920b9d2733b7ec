use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::LocalSet;

use handcart::args::Args;
use handcart::camera::{print_cameras, CameraSource};
use handcart::catalog::ProductCatalog;
use handcart::config::AppConfig;
use handcart::detector::{hand_detector, object_detector};
use handcart::gesture::GestureEstimator;
use handcart::output::{LogSink, RenderSink, WindowOutput};
use handcart::perception::PerceptionAdapter;
use handcart::sampler::SharedSource;
use handcart::session::{Session, SessionCommand, SessionOptions};

const UI_PUMP_PERIOD: Duration = Duration::from_millis(33);

fn init_tracing(default_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    if args.list {
        return print_cameras();
    }

    let mut config = AppConfig::load(&args.config)?;
    if let Some(index) = args.cam_index {
        config.camera.index = index;
    }
    if let Some(path) = &args.catalog {
        config.catalog_path = path.clone();
    }
    config.camera.mirror |= args.mirror;

    let catalog = ProductCatalog::load(&config.catalog_path)
        .with_context(|| format!("Failed to load catalog {}", config.catalog_path))?;

    let adapter = PerceptionAdapter::new(
        hand_detector(&config.models.hand_landmarks, config.models.hand_presence_threshold)?,
        object_detector(&config.models.object_detection, config.models.object_score_threshold)?,
        Box::new(GestureEstimator::default()),
        config.gesture.min_confidence,
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = LocalSet::new().block_on(&runtime, run(args.headless, config, catalog, adapter));
    // A pending stdin read would otherwise block runtime drop.
    runtime.shutdown_background();
    result
}

async fn run(headless: bool, config: AppConfig, catalog: ProductCatalog, adapter: PerceptionAdapter) -> Result<()> {
    let camera = Rc::new(RefCell::new(CameraSource::new(&config.camera)));
    let source: SharedSource = camera.clone();
    let (commands, rx) = mpsc::unbounded_channel();

    let sink: Box<dyn RenderSink> = if headless {
        spawn_stdin_commands(commands);
        Box::new(LogSink)
    } else {
        let window = Rc::new(RefCell::new(WindowOutput::new(
            "Handcart",
            config.camera.width as usize,
            config.camera.height as usize,
        )?));
        spawn_window_pump(window.clone(), commands);
        Box::new(window)
    };

    let mut session = Session::new(SessionOptions::from(&config), catalog, source, adapter, sink);
    session.start()?;

    if let Some(name) = camera.borrow().name() {
        tracing::info!(camera = %name, "Opened camera");
    }
    if headless {
        println!("{}", "Commands: start | restart | quit".cyan());
    } else {
        println!("{}", "Controls: [S] Start  [R] Restart after checkout  [Esc] Quit".cyan());
    }
    println!("Point at a product to add it to the cart. Show a victory or thumbs-up sign to check out.");

    session.run(rx).await;
    Ok(())
}

/// Keeps the window responsive and forwards key presses.
fn spawn_window_pump(window: Rc<RefCell<WindowOutput>>, commands: mpsc::UnboundedSender<SessionCommand>) {
    tokio::task::spawn_local(async move {
        let mut interval = tokio::time::interval(UI_PUMP_PERIOD);
        loop {
            interval.tick().await;
            if !window.borrow().is_open() {
                let _ = commands.send(SessionCommand::Stop);
                return;
            }
            let pending = window.borrow_mut().poll_commands();
            for command in pending {
                if commands.send(command).is_err() || command == SessionCommand::Stop {
                    return;
                }
            }
        }
    });
}

fn spawn_stdin_commands(commands: mpsc::UnboundedSender<SessionCommand>) {
    tokio::task::spawn_local(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let command = match lines.next_line().await {
                Ok(Some(line)) => match line.trim() {
                    "start" | "s" => SessionCommand::Start,
                    "restart" | "r" => SessionCommand::Restart,
                    "quit" | "q" | "exit" => SessionCommand::Stop,
                    "" => continue,
                    other => {
                        tracing::warn!(input = other, "Unknown command");
                        continue;
                    }
                },
                Ok(None) => SessionCommand::Stop,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    SessionCommand::Stop
                }
            };
            if commands.send(command).is_err() || command == SessionCommand::Stop {
                return;
            }
        }
    });
}
