use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use fable_core::backend::NarrationBackend;
use fable_core::events::SessionEvent;
use fable_core::i18n::Catalog;
use fable_engine::{
    EngineError, LoopOutcome, ModeState, Scenario, SessionConfig, SessionLoop, TtsClient, GENRES,
};
use fable_llm::{
    LmStudioBackend, OllamaBackend, RetryConfig, RoutedBackend, DEFAULT_MODEL,
};
use fable_telemetry::{init_telemetry, TelemetryConfig};

/// Terminal AI dungeon master backed by local Ollama or LM Studio models.
#[derive(Parser, Debug)]
#[command(name = "fable", version, about)]
struct Cli {
    /// Model to use; skips the interactive picker.
    #[arg(long)]
    model: Option<String>,

    /// UI language tag (en, zh-CN).
    #[arg(long, default_value = "en")]
    lang: String,

    /// Default save file for /save and /load without an argument.
    #[arg(long, default_value = "saves/adventure.txt")]
    save: PathBuf,

    /// Context budget in characters.
    #[arg(long, default_value_t = 10_000)]
    budget: usize,

    /// Retries per generation request.
    #[arg(long, default_value_t = 2)]
    retries: u32,

    #[arg(long, default_value = "http://localhost:11434")]
    ollama_url: String,

    #[arg(long, default_value = "http://localhost:11435")]
    lm_studio_url: String,

    #[arg(long, default_value = "http://localhost:7851/api/tts-generate")]
    alltalk_url: String,

    /// Disable narration audio.
    #[arg(long)]
    no_tts: bool,
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    let telemetry = init_telemetry(TelemetryConfig::default());
    let catalog = Arc::new(Catalog::new(&args.lang));

    let router = RoutedBackend::new(
        Arc::new(OllamaBackend::new(&args.ollama_url)),
        Arc::new(LmStudioBackend::new(&args.lm_studio_url)),
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    println!("{}", catalog.t("ui.game_title"));

    let model = match &args.model {
        Some(model) => model.clone(),
        None => pick_model(&router, &catalog, &mut lines).await,
    };
    println!("{}", catalog.tf("ui.using_model", &[("model", &model)]));

    let scenario = pick_scenario(&catalog, &mut lines).await;

    let config = SessionConfig {
        budget_chars: args.budget,
        retry: RetryConfig {
            max_retries: args.retries,
            ..RetryConfig::default()
        },
        default_save_path: args.save.clone(),
        autosave_path: args
            .save
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join("autosave.txt"),
        ..SessionConfig::default()
    };

    let mut session = SessionLoop::new(router, ModeState::new(model), config);
    if let Some(requests) = telemetry.requests() {
        session = session.with_request_log(requests.clone());
    }
    if !args.no_tts {
        session = session.with_tts(TtsClient::new(&args.alltalk_url));
    }

    let events = session.subscribe();
    let renderer = tokio::spawn(render_events(events, catalog.clone()));

    if let Err(e) = session.start(&scenario) {
        eprintln!(
            "{}",
            catalog.tf("ui.fatal_error", &[("error", &e.to_string())])
        );
        return;
    }
    println!();
    println!("{}", catalog.t("ui.adventure_begins"));
    println!(
        "{}: {}",
        catalog.t("ui.dungeon_master"),
        scenario.opening()
    );
    println!("{}", catalog.t("ui.type_help"));

    loop {
        print!("\n{}", catalog.t("ui.prompt"));
        flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let result = session.handle_line(&line, &cancel).await;
        watcher.abort();

        match result {
            Ok(LoopOutcome::Continue) => {}
            Ok(LoopOutcome::Exit) => break,
            Err(e) if e.is_fatal() => {
                eprintln!(
                    "{}",
                    catalog.tf("ui.fatal_error", &[("error", &e.to_string())])
                );
                break;
            }
            // Cancellation is already reported through the event stream.
            Err(EngineError::Cancelled) => {}
            Err(e) => report_error(&catalog, &e),
        }
    }

    // Give the renderer a moment to drain, then shut it down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    renderer.abort();
    println!("{}", catalog.t("ui.exiting"));
}

fn report_error(catalog: &Catalog, error: &EngineError) {
    let message = match error {
        EngineError::UnknownCommand(name) => {
            catalog.tf("ui.unknown_command", &[("command", &format!("/{name}"))])
        }
        EngineError::UnknownModel(model) => catalog.tf("ui.unknown_model", &[("model", model)]),
        EngineError::Store(e) => catalog.tf("ui.persistence_failed", &[("error", &e.to_string())]),
        EngineError::Backend(e) => {
            catalog.tf("ui.generation_failed", &[("error", &e.to_string())])
        }
        other => catalog.tf("ui.generation_failed", &[("error", &other.to_string())]),
    };
    println!("{message}");
}

async fn pick_model(
    router: &RoutedBackend,
    catalog: &Catalog,
    lines: &mut Lines<BufReader<Stdin>>,
) -> String {
    let models = match router.list_models().await {
        Ok(models) => models,
        Err(e) => {
            tracing::warn!(error = %e, "model discovery failed");
            Vec::new()
        }
    };
    if models.is_empty() {
        println!("{}", catalog.t("ui.no_models_found"));
        return DEFAULT_MODEL.to_string();
    }

    println!("{}", catalog.t("ui.available_models"));
    for (i, model) in models.iter().enumerate() {
        println!("  {}. {model}", i + 1);
    }
    println!("{}", catalog.t("ui.select_model"));
    loop {
        print!("{}", catalog.t("ui.enter_choice"));
        flush();
        let choice = read_trimmed(lines).await;
        if choice.is_empty() {
            return DEFAULT_MODEL.to_string();
        }
        if let Ok(n) = choice.parse::<usize>() {
            if n >= 1 && n <= models.len() {
                return models[n - 1].clone();
            }
        }
        println!("{}", catalog.t("ui.invalid_choice"));
    }
}

async fn pick_scenario(catalog: &Catalog, lines: &mut Lines<BufReader<Stdin>>) -> Scenario {
    println!();
    println!("{}", catalog.t("ui.choose_genre"));
    for (i, genre) in GENRES.iter().enumerate() {
        println!("  {}. {} - {}", i + 1, genre.name, genre.description);
    }
    let genre = loop {
        print!("{}", catalog.t("ui.enter_choice"));
        flush();
        let choice = read_trimmed(lines).await;
        if let Ok(n) = choice.parse::<usize>() {
            if n >= 1 && n <= GENRES.len() {
                break &GENRES[n - 1];
            }
        }
        println!("{}", catalog.t("ui.invalid_choice"));
    };

    println!();
    println!("{}", catalog.t("ui.choose_role"));
    for (i, (role, _)) in genre.roles.iter().enumerate() {
        println!("  {}. {role}", i + 1);
    }
    let role_index = loop {
        print!("{}", catalog.t("ui.enter_choice"));
        flush();
        let choice = read_trimmed(lines).await;
        if choice.eq_ignore_ascii_case("r") {
            break rand::thread_rng().gen_range(0..genre.roles.len());
        }
        if let Ok(n) = choice.parse::<usize>() {
            if n >= 1 && n <= genre.roles.len() {
                break n - 1;
            }
        }
        println!("{}", catalog.t("ui.invalid_choice"));
    };

    print!("{}", catalog.t("ui.enter_character_name"));
    flush();
    let mut name = read_trimmed(lines).await;
    if name.is_empty() {
        name = catalog.t("ui.default_character_name");
    }

    Scenario::new(genre, role_index, name)
}

async fn read_trimmed(lines: &mut Lines<BufReader<Stdin>>) -> String {
    match lines.next_line().await {
        Ok(Some(line)) => line.trim().to_string(),
        _ => String::new(),
    }
}

async fn render_events(mut rx: broadcast::Receiver<SessionEvent>, catalog: Arc<Catalog>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            SessionEvent::GenerationStart { .. } => {
                print!("\n{}: ", catalog.t("ui.dungeon_master"));
                flush();
            }
            SessionEvent::NarrationDelta { delta, .. } => {
                print!("{delta}");
                flush();
            }
            SessionEvent::TurnComplete { .. } => println!(),
            SessionEvent::GenerationCancelled { .. } => {
                println!("\n{}", catalog.t("ui.interrupted"));
            }
            SessionEvent::CensorToggled { censored, .. } => {
                let key = if censored { "ui.censor_on" } else { "ui.censor_off" };
                println!("{}", catalog.t(key));
            }
            SessionEvent::ModelChanged { model, .. } => {
                println!("{}", catalog.tf("ui.model_changed", &[("model", &model)]));
            }
            SessionEvent::AvailableModels { models, .. } => {
                println!("{}", catalog.t("ui.available_models"));
                for (i, model) in models.iter().enumerate() {
                    println!("  {}. {model}", i + 1);
                }
            }
            SessionEvent::HelpRequested { .. } => {
                println!("{}", catalog.t("ui.help"));
            }
            SessionEvent::StatusReport {
                model,
                censored,
                turns,
                chars,
                created_at,
                ..
            } => {
                println!("{}", catalog.t("ui.status_header"));
                println!("{}", catalog.tf("ui.status_model", &[("model", &model)]));
                println!(
                    "{}",
                    catalog.tf("ui.status_started", &[("time", &created_at.to_rfc3339())])
                );
                let state = catalog.t(if censored { "ui.on" } else { "ui.off" });
                println!("{}", catalog.tf("ui.status_censored", &[("state", &state)]));
                println!(
                    "{}",
                    catalog.tf(
                        "ui.status_turns",
                        &[("turns", &turns.to_string()), ("chars", &chars.to_string())]
                    )
                );
            }
            SessionEvent::Saved { path, turns, .. } => {
                println!(
                    "{}",
                    catalog.tf(
                        "ui.saved",
                        &[("path", &path), ("turns", &turns.to_string())]
                    )
                );
            }
            SessionEvent::Loaded {
                path,
                turns,
                skipped,
                ..
            } => {
                println!(
                    "{}",
                    catalog.tf(
                        "ui.loaded",
                        &[
                            ("path", &path),
                            ("turns", &turns.to_string()),
                            ("skipped", &skipped.to_string()),
                        ]
                    )
                );
            }
            SessionEvent::Terminated { .. } => {}
        }
    }
}

fn flush() {
    let _ = std::io::stdout().flush();
}
