//! Example: Operator Console for a Test Call
//!
//! Drives a simulated support call from the terminal against a running backend
//! (`CALLSIM__BACKEND__BASE_URL`, default http://localhost:5001/api) using the
//! default microphone and speakers.

use anyhow::Context;
use callsim_core::{CallSimConfig, SessionController, TranscriptCursor};
use callsim_voice::{default_devices, MicrophoneCapture};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const HELP: &str = "\
commands:
  start            start a test call
  greet            play the greeting (when autoplay is off)
  rec / stop       record a reply / finish and send it
  cancel           discard the current recording
  say <text>       send a typed reply
  resolved         end the call as resolved
  unresolved       end the call as not resolved
  retry            start over after an error
  devices          list input devices
  quit             close the session";

fn render(controller: &SessionController, cursor: &mut TranscriptCursor) {
    let call_id = controller.session().call_id();
    for entry in cursor.unseen(call_id, controller.transcript()) {
        println!("  [{}] {}: {}", entry.at.format("%H:%M:%S"), entry.speaker, entry.text);
    }

    let view = controller.view();
    println!("── {} ──", view.status);
    if let (Some(error), Some(hint)) = (&view.error, view.error_hint) {
        println!("⚠️  {}\n   {}", error, hint);
    }
    if view.end_call_suggested {
        println!("💡 The assistant is wrapping up: end the call with `resolved` or `unresolved`.");
    }
    if let Some(outcome) = view.outcome {
        println!("Final Status: {}", outcome.label());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CallSimConfig::load().context("loading configuration")?;
    info!("📞 CallSim test console (backend: {})", config.backend.base_url);

    let devices = default_devices(&config.audio, &config.backend)?;
    let mut controller = SessionController::from_config(&config, devices)?;
    let mut cursor = TranscriptCursor::new();

    println!("{}", HELP);
    render(&controller, &mut cursor);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let result = match command {
            "" => continue,
            "start" => controller.start().await,
            "greet" => controller.play_greeting().await,
            "rec" => controller.begin_recording().await,
            "stop" => controller.stop_recording().await,
            "cancel" => controller.cancel_recording(),
            "say" => controller.submit_text(rest).await,
            "resolved" => controller.end_call(true).await,
            "unresolved" => controller.end_call(false).await,
            "retry" => controller.retry().await,
            "devices" => {
                for name in MicrophoneCapture::list_input_devices()? {
                    println!("  🎤 {}", name);
                }
                continue;
            }
            "quit" | "exit" => {
                controller.close();
                break;
            }
            _ => {
                println!("{}", HELP);
                continue;
            }
        };
        if let Err(e) = result {
            println!("⚠️  {}", e);
        }
        render(&controller, &mut cursor);
    }

    // Releases the microphone if ctrl-c arrived mid-recording.
    controller.close();
    info!("👋 session closed");
    Ok(())
}
