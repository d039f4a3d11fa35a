mod dom;
mod face;
mod hands;

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use face::{AgentCommand, AgentEvent};
use headless_chrome::Tab;
use tokio::sync::broadcast;

use anchor_ghost::types::DomMap;
use anchor_ghost::{SectionKeywordScorer, UndoManager, build_plan, execute_plan, map_fields};

#[derive(Parser)]
#[command(name = "anchor-ghost", about = "Clinical form-fill agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the local agent service and browser driver.
    Serve {
        /// Page to open on startup.
        #[arg(long)]
        url: Option<String>,
    },
    /// Ask a running agent for a fill plan and print it.
    Plan {
        /// Free-text note to place.
        #[arg(long)]
        note: String,
        /// Page URL to record on the plan.
        #[arg(long)]
        url: Option<String>,
        /// Base URL of the running agent.
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        agent: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve { url: None }) {
        Command::Serve { url } => serve(url).await,
        Command::Plan { note, url, agent } => request_plan(note, url, agent).await,
    }
}

async fn serve(start_url: Option<String>) -> Result<()> {
    eprintln!("[Agent] Starting form-fill agent...");

    // 1. Launch the panel first (so user sees something immediately)
    let (mut cmd_rx, event_tx, latest_map, port) = face::start_server().await;

    // 2. Launch browser in a blocking task (it can take a while)
    eprintln!("[Agent] Launching Chrome...");
    let session = tokio::task::spawn_blocking(hands::BrowserSession::launch)
        .await
        .map_err(|e| anyhow!("Browser launch panicked: {}", e))??;
    eprintln!("[Agent] Chrome launched successfully.");

    let start_url = start_url.unwrap_or_else(|| format!("http://127.0.0.1:{}/demo", port));
    {
        let tab = session.tab.clone();
        let title = tokio::task::spawn_blocking(move || -> Result<String> {
            tab.navigate_to(&start_url)?;
            tab.wait_for_element("body")?;
            dom::get_page_title(&tab)
        })
        .await
        .map_err(|e| anyhow!("Navigation panicked: {}", e))??;
        eprintln!("[Agent] Opened \"{}\"", title);
    }

    let mut undo = UndoManager::new();
    eprintln!("[Agent] Ready. Waiting for commands...");

    // 3. Drive map/fill/undo cycles from the panel
    while let Some(command) = cmd_rx.recv().await {
        eprintln!("[Agent] Received command: {:?}", command);
        let tab = session.tab.clone();
        handle_command(tab, command, &event_tx, &latest_map, &mut undo).await;
        let _ = event_tx.send(AgentEvent::Ready);
    }

    Ok(())
}

async fn handle_command(
    tab: Arc<Tab>,
    command: AgentCommand,
    events: &broadcast::Sender<AgentEvent>,
    latest_map: &Arc<Mutex<Option<DomMap>>>,
    undo: &mut UndoManager,
) {
    match command {
        AgentCommand::Map => {
            match capture_map(tab).await {
                Ok(map) => {
                    let _ = events.send(AgentEvent::Mapped {
                        url: map.url.clone(),
                        fields: map.fields.len(),
                    });
                    *latest_map.lock().unwrap() = Some(map);
                }
                Err(e) => {
                    eprintln!("[Agent] Map failed: {:#}", e);
                    let _ = events.send(AgentEvent::ActionError {
                        message: format!("{:#}", e),
                    });
                }
            };
        }
        AgentCommand::Fill { note } => {
            run_fill(tab, note, false, events, latest_map, undo).await;
        }
        AgentCommand::Preview { note } => {
            run_fill(tab, note, true, events, latest_map, undo).await;
        }
        AgentCommand::Undo => {
            if !undo.has_buffer() {
                let _ = events.send(AgentEvent::ActionError {
                    message: "nothing to undo".to_string(),
                });
                return;
            }
            let mut mgr = std::mem::take(undo);
            let (mgr, outcome) = tokio::task::spawn_blocking(move || {
                let mut writer = dom::TabWriter::new(tab);
                let outcome = mgr.restore(&mut writer);
                (mgr, outcome)
            })
            .await
            .unwrap();
            *undo = mgr;
            eprintln!(
                "[Agent] Undo: restored {}, failed {}",
                outcome.restored, outcome.failed
            );
            let _ = events.send(AgentEvent::Undone {
                restored: outcome.restored,
                failed: outcome.failed,
            });
        }
    }
}

async fn run_fill(
    tab: Arc<Tab>,
    note: String,
    preview: bool,
    events: &broadcast::Sender<AgentEvent>,
    latest_map: &Arc<Mutex<Option<DomMap>>>,
    undo: &mut UndoManager,
) {
    let map = match capture_map(tab.clone()).await {
        Ok(map) => map,
        Err(e) => {
            eprintln!("[Agent] Map failed: {:#}", e);
            let _ = events.send(AgentEvent::ActionError {
                message: format!("{:#}", e),
            });
            return;
        }
    };
    let _ = events.send(AgentEvent::Mapped {
        url: map.url.clone(),
        fields: map.fields.len(),
    });

    let plan = build_plan(&map.url, &map.fields, &note, &SectionKeywordScorer);
    *latest_map.lock().unwrap() = Some(map);
    eprintln!(
        "[Agent] Plan {}: {} steps (preview={})",
        plan.id,
        plan.steps.len(),
        preview
    );
    let _ = events.send(AgentEvent::Planned { plan: plan.clone() });

    // Execute in a blocking context so we don't stall tokio
    let outcome = tokio::task::spawn_blocking(move || {
        let mut writer = dom::TabWriter::new(tab);
        execute_plan(&mut writer, &plan, preview)
    })
    .await
    .unwrap();

    eprintln!(
        "[Agent] Executed: applied {}, failed {}",
        outcome.result.applied, outcome.result.failed
    );
    if let Some(buffer) = outcome.undo {
        undo.adopt(buffer);
    }
    let _ = events.send(AgentEvent::Executed {
        result: outcome.result,
    });
}

async fn capture_map(tab: Arc<Tab>) -> Result<DomMap> {
    tokio::task::spawn_blocking(move || -> Result<DomMap> {
        let doc = dom::capture_document(&tab)?;
        let fields = map_fields(&doc);
        Ok(DomMap {
            url: doc.url().to_string(),
            captured_at: chrono::Utc::now().to_rfc3339(),
            fields,
        })
    })
    .await
    .map_err(|e| anyhow!("Snapshot panicked: {}", e))?
}

/// Client mode: ask a running agent for a plan and print it.
async fn request_plan(note: String, url: Option<String>, agent: String) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let mut body = serde_json::json!({ "note": note });
    if let Some(url) = url {
        body["url"] = serde_json::json!(url);
    }

    let endpoint = format!("{}/actions/plan", agent.trim_end_matches('/'));
    let response = client.post(&endpoint).json(&body).send().await.map_err(|e| {
        if e.is_timeout() {
            anyhow!("agent at {} did not reply within 30s", endpoint)
        } else {
            anyhow!("request to {} failed: {}", endpoint, e)
        }
    })?;

    let status = response.status();
    let payload: serde_json::Value = response.json().await?;
    if !status.is_success() {
        bail!("agent returned {}: {}", status, payload);
    }
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
