//! Example chat server backed by OpenRouter.
//!
//! Run with: cargo run -p chat-server-demo
//!
//! Then open http://localhost:3000 in your browser. Set `OPENROUTER_API_KEY`
//! or paste a key into the page.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};
use chatline_completion::{ModelOption, OpenRouterClient, available_models};
use chatline_core::{ChangeNotifier, ClientConfig};
use chatline_session::{DEFAULT_WATCH_PERIOD, SessionStore, Settings, storage::FileStorage};
use chatline_transport::{ChatBackend, websocket::create_chat_router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ClientConfig::from_env();

    let data_dir = std::env::var_os("CHATLINE_DATA_DIR")
        .map(Into::into)
        .or_else(FileStorage::default_location)
        .context("no data directory; set CHATLINE_DATA_DIR")?;
    let storage = Arc::new(FileStorage::open(&data_dir).context("opening data directory")?);
    tracing::info!(dir = %data_dir.display(), "storing sessions");

    let settings = Settings::new(storage.clone(), config.default_model.clone());
    if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
        settings.set_api_key(&key).context("saving API key")?;
    }

    let client = OpenRouterClient::new(config, Arc::new(settings.clone()))?;
    let store = SessionStore::new(storage, ChangeNotifier::new());
    // Other processes sharing the data directory
    let _watch = store.watch_external(DEFAULT_WATCH_PERIOD);
    let backend = ChatBackend::new(store, Arc::new(client), Arc::new(settings.clone()));

    // Build router
    let api = Router::new()
        .route("/api/models", get(models_handler))
        .route("/api/settings", get(get_settings).post(update_settings))
        .with_state(settings);

    let app = Router::new()
        .route("/", get(index_handler))
        .merge(api)
        .merge(create_chat_router(backend))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn models_handler() -> Json<&'static [ModelOption]> {
    Json(available_models())
}

#[derive(serde::Serialize)]
struct SettingsView {
    has_api_key: bool,
    selected_model: String,
}

#[derive(serde::Deserialize)]
struct SettingsUpdate {
    api_key: Option<String>,
    #[serde(default)]
    reset_api_key: bool,
    model: Option<String>,
}

async fn get_settings(State(settings): State<Settings>) -> Json<SettingsView> {
    Json(SettingsView {
        has_api_key: settings.has_api_key(),
        selected_model: settings.selected_model(),
    })
}

async fn update_settings(
    State(settings): State<Settings>,
    Json(update): Json<SettingsUpdate>,
) -> impl IntoResponse {
    let result = (|| {
        if update.reset_api_key {
            settings.reset_api_key()?;
        }
        if let Some(key) = update.api_key.as_deref() {
            settings.set_api_key(key)?;
        }
        if let Some(model) = update.model.as_deref() {
            settings.select_model(model)?;
        }
        Ok::<_, chatline_core::StorageError>(())
    })();

    match result {
        Ok(()) => (StatusCode::OK, get_settings(State(settings)).await).into_response(),
        Err(e) => {
            tracing::error!("Failed to update settings: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>chatline</title>
    <style>
        body { margin: 0; display: flex; height: 100vh; font-family: system-ui, sans-serif; }
        #sidebar { width: 260px; background: #f4f4f5; padding: 12px; overflow-y: auto; }
        #sidebar .session { padding: 8px; border-radius: 6px; cursor: pointer; display: flex; }
        #sidebar .session.active { background: #e4e4e7; }
        #sidebar .session span { flex: 1; }
        #main { flex: 1; display: flex; flex-direction: column; }
        #notice { display: none; padding: 8px 12px; background: #fee2e2; color: #991b1b; }
        #messages { flex: 1; overflow-y: auto; padding: 16px; }
        .msg { margin: 8px 0; white-space: pre-wrap; }
        .msg.user { text-align: right; }
        .msg small { color: #888; margin-left: 6px; }
        form { display: flex; gap: 8px; padding: 12px; border-top: 1px solid #ddd; }
        form input { flex: 1; }
    </style>
</head>
<body>
    <div id="sidebar">
        <button id="new">New chat</button>
        <select id="model"></select>
        <div id="sessions"></div>
    </div>
    <div id="main">
        <div id="notice"></div>
        <div id="messages"></div>
        <form id="composer">
            <input id="text" placeholder="Type a message..." autocomplete="off" />
            <button id="send">Send</button>
        </form>
    </div>

    <script>
        let ws;
        let current = null;

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);
            ws.onclose = () => setTimeout(connect, 2000);
            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                if (msg.type === 'sessions') renderSessions(msg.sessions);
                else if (msg.type === 'transcript') renderTranscript(msg);
                else if (msg.type === 'state') setBusy(msg.state === 'sending');
                else if (msg.type === 'notice') showNotice(msg.notice);
                else if (msg.type === 'session_selected') current = msg.session_id;
                else if (msg.type === 'error') console.warn(msg.message);
            };
        }

        function send(msg) {
            if (ws && ws.readyState === WebSocket.OPEN) ws.send(JSON.stringify(msg));
        }

        function renderSessions(sessions) {
            const list = document.getElementById('sessions');
            list.innerHTML = '';
            for (const s of sessions) {
                const row = document.createElement('div');
                row.className = 'session' + (s.active ? ' active' : '');
                const title = document.createElement('span');
                title.textContent = s.title;
                title.onclick = () => send({ type: 'select_session', session_id: s.id });
                const del = document.createElement('button');
                del.textContent = 'x';
                del.onclick = () => send({ type: 'delete_session', session_id: s.id });
                row.append(title, del);
                list.append(row);
            }
        }

        function renderTranscript(msg) {
            current = msg.session_id;
            const box = document.getElementById('messages');
            box.innerHTML = '';
            for (const m of msg.messages) {
                const div = document.createElement('div');
                div.className = 'msg ' + m.role;
                div.textContent = m.content;
                const time = document.createElement('small');
                time.textContent = m.timestamp;
                div.append(time);
                box.append(div);
            }
            box.scrollTop = box.scrollHeight;
        }

        function setBusy(busy) {
            document.getElementById('send').disabled = busy;
            document.getElementById('text').disabled = busy;
        }

        function showNotice(notice) {
            const el = document.getElementById('notice');
            el.textContent = notice.message;
            el.style.display = 'block';
            if (notice.kind === 'missing_credential') {
                const key = prompt('OpenRouter API key');
                if (key) {
                    fetch('/api/settings', {
                        method: 'POST',
                        headers: { 'Content-Type': 'application/json' },
                        body: JSON.stringify({ api_key: key }),
                    });
                }
            } else {
                setTimeout(() => {
                    el.style.display = 'none';
                    send({ type: 'dismiss_notice' });
                }, 5000);
            }
        }

        async function loadModels() {
            const [models, settings] = await Promise.all([
                fetch('/api/models').then((r) => r.json()),
                fetch('/api/settings').then((r) => r.json()),
            ]);
            const select = document.getElementById('model');
            for (const m of models) {
                const opt = new Option(m.name, m.id);
                opt.title = m.description;
                select.append(opt);
            }
            select.value = settings.selected_model;
            select.onchange = () => fetch('/api/settings', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ model: select.value }),
            });
        }

        document.getElementById('new').onclick = () => send({ type: 'new_session' });
        document.getElementById('composer').onsubmit = (e) => {
            e.preventDefault();
            const input = document.getElementById('text');
            if (!input.value.trim()) return;
            send({ type: 'send', session_id: current, text: input.value });
            input.value = '';
        };

        loadModels();
        connect();
    </script>
</body>
</html>
"#;
