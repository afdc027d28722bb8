// src/main.rs

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;

use camshot_core::config::AppConfig;
use camshot_core::memo_controller::MemoController;

/// memo [IMAGE] [CONFIG.json]
fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    let image = match args.get(1) {
        Some(path) => std::fs::read(path)?,
        None => Vec::new(),
    };
    let config = match args.get(2) {
        Some(path) => AppConfig::load_from_disk(path)?,
        None => AppConfig::default(),
    };
    config.validate()?;

    let runtime = tokio::runtime::Runtime::new()?;
    let mut memo = MemoController::new(&config, image, runtime.handle().clone())?;

    println!("Press [R] Record/Stop | [P] Play/Stop | [W] Refresh waveforms | [Q] Quit");

    enable_raw_mode()?;
    let result = run(&mut memo);
    disable_raw_mode()?;

    drop(memo);
    runtime.shutdown_timeout(Duration::from_secs(2));
    println!("\nExiting.");
    result
}

fn run(memo: &mut MemoController) -> Result<(), anyhow::Error> {
    // 20 FPS
    let frame = Duration::from_millis(50);
    memo.run_tick()?;

    loop {
        if event::poll(frame)? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind == KeyEventKind::Press {
                    if ev.code == KeyCode::Char('c')
                        && ev.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        break;
                    }
                    if memo.should_quit(ev.code) {
                        break;
                    }
                    memo.handle_key(ev.code);
                }
            }
        }
        memo.run_tick()?;
    }
    Ok(())
}
