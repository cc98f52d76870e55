use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{select, unbounded, Receiver};
use log::{error, info};
use myy_audio::core::{ControlFlags, PlayerConfig, TransportState};
use myy_audio::player::{AudioOutput, PlaybackManager};
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;

/// `status` 命令输出的 JSON
#[derive(Serialize)]
struct Status {
    state: TransportState,
    controls: ControlFlags,
    position: f64,
    length: f64,
    volume: f32,
    file: Option<PathBuf>,
}

struct Args {
    config: Option<PathBuf>,
    file: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args { config: None, file: None };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or_else(|| anyhow!("--config 需要一个路径"))?;
                args.config = Some(PathBuf::from(path));
            }
            _ => args.file = Some(PathBuf::from(arg)),
        }
    }
    Ok(args)
}

/// 在独立线程读取标准输入，逐行送入通道
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("读取标准输入失败: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn print_controls(manager: &PlaybackManager) {
    let controls = manager.controls();
    println!(
        "[controls] play={} stop={}",
        if controls.play_enabled { "on" } else { "off" },
        if controls.stop_enabled { "on" } else { "off" }
    );
}

fn print_help() {
    println!("命令: open <文件> | play | stop | seek <秒> | volume <0-1> | status | formats | quit");
}

/// 处理一条命令，返回 false 表示退出
fn handle_command(manager: &mut PlaybackManager, line: &str) -> bool {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "open" => match manager.open_file(rest) {
            Ok(info) => {
                println!(
                    "[open] {} ({} Hz, {} 声道, {:.2} 秒)",
                    info.path.display(),
                    info.sample_rate,
                    info.channels,
                    info.length
                );
                print_controls(manager);
            }
            Err(e) => println!("[error] {}", e),
        },
        "play" => manager.play(),
        "stop" => manager.stop(),
        "seek" => match rest.parse::<f64>() {
            Ok(seconds) => manager.seek(seconds),
            Err(_) => println!("[error] 无效的位置: {}", rest),
        },
        "volume" => match rest.parse::<f32>() {
            Ok(volume) => manager.set_volume(volume),
            Err(_) => println!("[error] 无效的音量: {}", rest),
        },
        "status" => {
            let status = Status {
                state: manager.state(),
                controls: manager.controls(),
                position: manager.position(),
                length: manager.length(),
                volume: manager.volume(),
                file: manager.current_file(),
            };
            match serde_json::to_string(&status) {
                Ok(json) => println!("{}", json),
                Err(e) => println!("[error] {}", e),
            }
        }
        "formats" => println!("{}", manager.formats().wildcard_extensions()),
        "help" => print_help(),
        "quit" | "exit" => return false,
        other => {
            println!("[error] 未知命令: {}", other);
            print_help();
        }
    }
    true
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        // symphonia 探测格式时日志较多
        .filter_module("symphonia", log::LevelFilter::Warn)
        .init();

    info!("🎵 MYY Audio 启动");

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => PlayerConfig::default(),
    };

    let mut manager = PlaybackManager::new();
    manager.set_volume(config.volume);
    manager.on_state_changed(|state| println!("[state] {}", state.as_str()));

    let mut output = AudioOutput::new(&config, manager.audio_callback())?;
    output.start()?;

    if let Some(file) = &args.file {
        if let Err(e) = manager.open_file(file) {
            println!("[error] {}", e);
        }
    }

    print_help();
    print_controls(&manager);

    let commands = spawn_stdin_reader();
    let changes = manager.change_events().clone();

    let mut running = true;
    while running {
        select! {
            recv(commands) -> line => match line {
                Ok(line) => {
                    let before = manager.state();
                    running = handle_command(&mut manager, &line);
                    if running && manager.state() != before {
                        print_controls(&manager);
                    }
                }
                // 标准输入已关闭
                Err(_) => running = false,
            },
            recv(changes) -> _ => {
                manager.handle_transport_change();
                print_controls(&manager);
            }
        }
    }

    manager.stop();
    output.stop();
    info!("👋 MYY Audio 退出");

    Ok(())
}
