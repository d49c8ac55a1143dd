mod actions;
mod app;
mod ui;

use actions::ShellListener;
use anyhow::Result;
use app::AppController;
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use lotradio::audio::StreamEngineFactory;
use lotradio::platform::{DefaultDeviceMonitor, GrantingFocusService, NetworkKeepAlive};
use lotradio::{Collaborators, ControllerHandle, StreamTarget};
use ratatui::{backend::CrosstermBackend, Terminal};
use rodio::OutputStream;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[command(name = "lotradio", version, about = "Listen to The Lot Radio from your terminal")]
struct Args {
    /// Stream bitrate in kbps
    #[arg(long, value_enum, default_value_t = StreamTarget::Kbps128)]
    bitrate: StreamTarget,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Start without playing
    #[arg(long)]
    paused: bool,
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    // Audio output must outlive every engine
    let (_stream, stream_handle) = OutputStream::try_default()?;

    let parts = Collaborators {
        engines: Box::new(StreamEngineFactory::new(stream_handle)?),
        focus: Box::new(GrantingFocusService::new()),
        wake: Box::new(NetworkKeepAlive::new("lotradio_lock")),
        route_monitor: Box::new(DefaultDeviceMonitor::new()),
    };
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (handle, controller_task) =
        ControllerHandle::spawn(args.bitrate, parts, Some(Box::new(ShellListener::new(event_tx))));
    info!("Playback controller started for {}", args.bitrate);

    if !args.paused {
        handle.play();
    }

    // Set up panic handler to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic);
    }));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app_controller = AppController::new(args.bitrate, handle.clone(), event_rx);

    // Run the main loop
    let res = run_app(&mut terminal, &mut app_controller).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // Tear down without notifying; the shell is already gone
    handle.shutdown();
    let _ = controller_task.await;

    res
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app_controller: &mut AppController,
) -> Result<()> {
    loop {
        app_controller.drain_events();

        // Render UI
        terminal.draw(|f| ui::render_ui(f, &app_controller.ui_app))?;

        // Handle input with shorter timeout for better responsiveness
        if event::poll(Duration::from_millis(50))? {
            match event::read() {
                Ok(Event::Key(key)) => {
                    if app_controller.handle_key_event(key.code).await? {
                        break; // Quit was requested
                    }
                }
                Ok(_) => {}  // Resize and other events redraw on the next frame
                Err(_) => {} // Ignore read errors
            }
        }

        // Small delay to prevent high CPU usage but keep responsive
        sleep(Duration::from_millis(16)).await;

        if app_controller.should_quit() {
            break;
        }
    }

    Ok(())
}
