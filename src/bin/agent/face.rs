use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use anchor_ghost::types::{DomMap, ExecutionResult, FillPlan, normalize_dom_map};
use anchor_ghost::{SectionKeywordScorer, build_plan};

/// Commands posted by the control panel, handled by the agent loop.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum AgentCommand {
    Map,
    Fill { note: String },
    Preview { note: String },
    Undo,
}

/// Events streamed to the control panel via SSE.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    Mapped { url: String, fields: usize },
    Planned { plan: FillPlan },
    Executed { result: ExecutionResult },
    Undone { restored: usize, failed: usize },
    ActionError { message: String },
    Ready,
}

impl AgentEvent {
    fn to_sse_event(&self) -> Event {
        match self {
            AgentEvent::Mapped { url, fields } => Event::default().event("mapped").data(format!(
                "{{\"url\":{},\"fields\":{}}}",
                serde_json::json!(url),
                fields
            )),
            AgentEvent::Planned { plan } => Event::default()
                .event("planned")
                .data(serde_json::to_string(plan).unwrap_or_else(|_| "{}".into())),
            AgentEvent::Executed { result } => Event::default()
                .event("executed")
                .data(serde_json::to_string(result).unwrap_or_else(|_| "{}".into())),
            AgentEvent::Undone { restored, failed } => Event::default()
                .event("undone")
                .data(format!("{{\"restored\":{},\"failed\":{}}}", restored, failed)),
            AgentEvent::ActionError { message } => Event::default()
                .event("action_error")
                .data(format!("{{\"message\":{}}}", serde_json::json!(message))),
            AgentEvent::Ready => Event::default().event("ready").data("{}"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cmd_tx: mpsc::Sender<AgentCommand>,
    pub event_tx: broadcast::Sender<AgentEvent>,
    pub latest_map: Arc<Mutex<Option<DomMap>>>,
}

#[derive(Deserialize)]
struct PlanRequest {
    note: String,
    url: Option<String>,
}

const DEFAULT_PORT: u16 = 8787;

/// Start the local agent service. Returns the command receiver, the event
/// sender, the shared latest-map store, and the bound port.
pub async fn start_server() -> (
    mpsc::Receiver<AgentCommand>,
    broadcast::Sender<AgentEvent>,
    Arc<Mutex<Option<DomMap>>>,
    u16,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<AgentCommand>(1);
    let (event_tx, _) = broadcast::channel::<AgentEvent>(64);
    let latest_map = Arc::new(Mutex::new(None));

    let state = Arc::new(AppState {
        cmd_tx,
        event_tx: event_tx.clone(),
        latest_map: latest_map.clone(),
    });

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/status", get(status_handler))
        .route("/dom", post(dom_handler))
        .route("/actions/plan", post(plan_handler))
        .route("/command", post(command_handler))
        .route("/events", get(sse_handler))
        .route("/demo", get(demo_handler))
        .route(
            "/favicon.ico",
            get(|| async { axum::http::StatusCode::NO_CONTENT }),
        ) // Silence 404
        .with_state(state);

    let base_port = std::env::var("ANCHOR_AGENT_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    // Try the configured port, fall back to the next nine if in use
    let mut listener = None;
    let mut port = base_port;
    for p in base_port..base_port + 10 {
        match tokio::net::TcpListener::bind(format!("127.0.0.1:{}", p)).await {
            Ok(l) => {
                listener = Some(l);
                port = p;
                break;
            }
            Err(_) => continue,
        }
    }
    let listener = listener.unwrap_or_else(|| {
        panic!(
            "Could not bind to any port {}-{}. Kill the old agent first.",
            base_port,
            base_port + 9
        )
    });

    eprintln!("[Face] Agent panel running at http://localhost:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (cmd_rx, event_tx, latest_map, port)
}

async fn index_handler() -> Html<&'static str> {
    eprintln!("[Face] GET /");
    Html(INDEX_HTML)
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let has_map = state.latest_map.lock().unwrap().is_some();
    Json(serde_json::json!({ "ok": true, "hasMap": has_map }))
}

async fn demo_handler() -> Html<&'static str> {
    eprintln!("[Face] GET /demo");
    Html(DEMO_HTML)
}

async fn dom_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    match normalize_dom_map(payload) {
        Ok(map) => {
            let fields = map.fields.len();
            eprintln!("[Face] POST /dom: {} fields from {}", fields, map.url);
            *state.latest_map.lock().unwrap() = Some(map);
            (
                StatusCode::OK,
                Json(serde_json::json!({ "ok": true, "fields": fields })),
            )
        }
        Err(e) => {
            eprintln!("[Face] POST /dom rejected: {:#}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("{:#}", e) })),
            )
        }
    }
}

async fn plan_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PlanRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let map = state.latest_map.lock().unwrap().clone();
    let Some(map) = map else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no field map captured yet, POST /dom first" })),
        );
    };
    let url = payload.url.unwrap_or_else(|| map.url.clone());
    let plan = build_plan(&url, &map.fields, &payload.note, &SectionKeywordScorer);
    eprintln!(
        "[Face] POST /actions/plan: {} steps for {}",
        plan.steps.len(),
        plan.url
    );
    (
        StatusCode::OK,
        Json(serde_json::to_value(&plan).unwrap_or_default()),
    )
}

async fn command_handler(
    State(state): State<Arc<AppState>>,
    Json(command): Json<AgentCommand>,
) -> &'static str {
    eprintln!("[Face] POST /command: {:?}", command);
    let _ = state.cmd_tx.send(command).await;
    "ok"
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream =
        BroadcastStream::new(rx).filter_map(|result: Result<AgentEvent, _>| match result {
            Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
            Err(_) => None,
        });
    Sse::new(stream)
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Anchor Ghost Agent</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
    height: 100vh;
    display: flex;
    flex-direction: column;
  }
  header {
    padding: 24px 32px;
    border-bottom: 1px solid #1a1a2e;
    display: flex;
    align-items: center;
    gap: 12px;
  }
  header h1 {
    font-size: 20px;
    font-weight: 600;
    color: #fff;
  }
  header .dot {
    width: 8px; height: 8px;
    border-radius: 50%;
    background: #22c55e;
    animation: pulse 2s infinite;
  }
  header .dot.busy { background: #f59e0b; }
  @keyframes pulse {
    0%, 100% { opacity: 1; }
    50% { opacity: 0.4; }
  }
  .main {
    flex: 1;
    display: flex;
    flex-direction: column;
    max-width: 800px;
    width: 100%;
    margin: 0 auto;
    padding: 24px 32px;
    gap: 16px;
    overflow: hidden;
  }
  #log {
    flex: 1;
    overflow-y: auto;
    display: flex;
    flex-direction: column;
    gap: 8px;
    padding-right: 8px;
  }
  #log::-webkit-scrollbar { width: 6px; }
  #log::-webkit-scrollbar-track { background: transparent; }
  #log::-webkit-scrollbar-thumb { background: #333; border-radius: 3px; }
  .entry {
    padding: 10px 14px;
    border-radius: 8px;
    font-size: 14px;
    line-height: 1.5;
    animation: fadeIn 0.2s ease;
  }
  @keyframes fadeIn { from { opacity: 0; transform: translateY(4px); } to { opacity: 1; } }
  .entry.user {
    background: #1a1a2e;
    border-left: 3px solid #6366f1;
  }
  .entry.step {
    background: #111118;
    border-left: 3px solid #3b82f6;
    font-family: 'Cascadia Code', 'Fira Code', monospace;
    font-size: 13px;
    white-space: pre-wrap;
  }
  .entry.error {
    background: #1a0a0a;
    border-left: 3px solid #ef4444;
    color: #fca5a5;
  }
  .entry.done {
    background: #0a1a0a;
    border-left: 3px solid #22c55e;
    color: #86efac;
  }
  .input-area {
    display: flex;
    gap: 8px;
  }
  #note {
    flex: 1;
    background: #111118;
    border: 1px solid #222;
    border-radius: 8px;
    padding: 12px 16px;
    color: #fff;
    font-size: 15px;
    outline: none;
    resize: vertical;
    min-height: 64px;
    transition: border-color 0.2s;
  }
  #note:focus { border-color: #6366f1; }
  #note::placeholder { color: #555; }
  .buttons { display: flex; gap: 8px; }
  button {
    background: #6366f1;
    color: #fff;
    border: none;
    border-radius: 8px;
    padding: 12px 24px;
    font-size: 15px;
    font-weight: 600;
    cursor: pointer;
    transition: background 0.2s;
  }
  button:hover { background: #4f46e5; }
  button.secondary { background: #26263a; }
  button.secondary:hover { background: #33334d; }
  button:disabled { background: #333; cursor: not-allowed; }
</style>
</head>
<body>
  <header>
    <div class="dot" id="status-dot"></div>
    <h1>Anchor Ghost Agent</h1>
  </header>
  <div class="main">
    <div id="log"></div>
    <textarea id="note" placeholder="Clinical note to place..."></textarea>
    <div class="buttons">
      <button class="secondary" onclick="send({action:'map'})">Map Fields</button>
      <button class="secondary" onclick="send({action:'preview', note: noteText()})">Preview</button>
      <button onclick="send({action:'fill', note: noteText()})">Fill</button>
      <button class="secondary" onclick="send({action:'undo'})">Undo</button>
    </div>
  </div>
<script>
  const log = document.getElementById('log');
  const dot = document.getElementById('status-dot');

  function noteText() {
    return document.getElementById('note').value;
  }

  function addEntry(cls, html) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.innerHTML = html;
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  }

  function esc(s) { return String(s).replace(/</g, '&lt;'); }

  async function send(cmd) {
    dot.className = 'dot busy';
    addEntry('user', '<strong>You:</strong> ' + esc(cmd.action));
    await fetch('/command', {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: JSON.stringify(cmd),
    });
  }

  const es = new EventSource('/events');

  es.addEventListener('mapped', e => {
    const d = JSON.parse(e.data);
    addEntry('step', 'Mapped ' + d.fields + ' fields on ' + esc(d.url));
  });

  es.addEventListener('planned', e => {
    const d = JSON.parse(e.data);
    addEntry('step', 'Plan ' + esc(d.id) + ': ' + d.steps.length + ' steps');
  });

  es.addEventListener('executed', e => {
    const d = JSON.parse(e.data);
    const cls = d.ok ? 'done' : 'error';
    addEntry(cls, 'Applied ' + d.applied + ', failed ' + d.failed +
      (d.undoToken ? ' (undo available)' : ''));
  });

  es.addEventListener('undone', e => {
    const d = JSON.parse(e.data);
    addEntry('done', 'Restored ' + d.restored + ' fields' +
      (d.failed ? ', ' + d.failed + ' failed' : ''));
  });

  es.addEventListener('action_error', e => {
    const d = JSON.parse(e.data);
    addEntry('error', '<strong>Error:</strong> ' + esc(d.message));
  });

  es.addEventListener('ready', () => {
    dot.className = 'dot';
  });

  addEntry('done', 'Agent ready. Map the page, then fill.');
</script>
</body>
</html>
"##;

const DEMO_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Intake Form (Demo)</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 640px; margin: 40px auto; color: #222; }
  label { display: block; margin-top: 16px; font-weight: 600; }
  input, textarea, select { width: 100%; padding: 8px; margin-top: 4px; font-size: 15px; }
  textarea { min-height: 120px; }
</style>
</head>
<body>
  <h1>Patient Intake (Demo)</h1>
  <form>
    <label for="patient-name">Patient Name</label>
    <input id="patient-name" name="patient-name" type="text" />

    <label for="dob">Date of Birth</label>
    <input id="dob" name="dob" type="text" placeholder="YYYY-MM-DD" />

    <label for="mrn">Medical Record Number</label>
    <input id="mrn" name="mrn" type="text" />

    <label for="insurer">Insurance Provider</label>
    <select id="insurer" name="insurer">
      <option value="">Select...</option>
      <option>Acme Health</option>
      <option>Nimbus Mutual</option>
    </select>

    <label for="notes">Progress Note</label>
    <textarea id="notes" name="notes"></textarea>

    <input type="hidden" id="visit-token" name="visit-token" value="secret" />
  </form>
</body>
</html>
"##;
