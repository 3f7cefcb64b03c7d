//! Thin interactive front-end for the real-time synthesis session
//!
//! Starts the audio session with the sine stand-in engine and forwards
//! parameter updates typed on stdin (`<parameter-index> <value>`) to the
//! audio thread.

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
fn main() -> anyhow::Result<()> {
    use std::io::BufRead;
    use std::path::Path;

    use artivox_core::audio::Session;
    use artivox_core::config::{load_config, ProgramConfig};
    use artivox_core::engine::SineEngine;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "artivox.yaml".to_string());
    let config: ProgramConfig = load_config(Path::new(&config_path));
    for (index, param) in config.dynamic_params.iter().enumerate() {
        println!("{:3}  {}", index, param.name);
    }

    let mut session = Session::new(config, SineEngine::factory());
    session.start()?;
    println!("sample rate: {} Hz", session.sample_rate());
    println!("enter `<parameter-index> <value>`, or `quit` to exit");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        let mut fields = line.split_whitespace();
        let index = fields.next().and_then(|s| s.parse::<u32>().ok());
        let value = fields.next().and_then(|s| s.parse::<f32>().ok());
        match (index, value) {
            (Some(index), Some(value)) => {
                if !session.send_parameter(index, value) {
                    log::warn!("parameter queue full, update dropped");
                }
            }
            _ => println!("expected `<parameter-index> <value>`"),
        }
    }

    session.stop();
    Ok(())
}

#[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
fn main() {
    eprintln!("the interactive front-end requires Linux with the jack-backend feature");
}
