use actix_cors::Cors;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult};
use actix_ws::Message;
use canvascore::{CanvasGraph, NodeType, Record};
use canvasruntime::{CanvasRuntime, ExecutorRegistry, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Application state shared across handlers
struct AppState {
    runtime: Arc<CanvasRuntime>,
}

/// Request body for a canvas run
#[derive(Debug, Deserialize)]
struct RunRequest {
    graph: CanvasGraph,
    #[serde(default)]
    input: Record,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn not_found(error: String) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse { error })
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "canvas"
    }))
}

/// List node types, their connection rules and whether an executor is registered
#[get("/api/node-types")]
async fn list_node_types(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.runtime.registry();

    let types: Vec<_> = NodeType::ALL
        .iter()
        .map(|node_type| {
            serde_json::json!({
                "type": node_type,
                "entry": node_type.is_entry(),
                "terminal": node_type.is_terminal(),
                "allowedTargets": node_type.allowed_targets(),
                "registered": registry.contains(*node_type),
                "description": registry.description(*node_type).unwrap_or_default(),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(types))
}

/// Validate a canvas without running it
#[post("/api/validate")]
async fn validate_canvas(
    data: web::Data<AppState>,
    graph: web::Json<CanvasGraph>,
) -> ActixResult<impl Responder> {
    let result = data.runtime.validate(&graph);
    Ok(HttpResponse::Ok().json(result))
}

/// Run a canvas and wait for it to finish.
///
/// Failed runs are still answered with 200; the report carries the status.
#[post("/api/canvases/{id}/runs")]
async fn run_canvas(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<RunRequest>,
) -> ActixResult<impl Responder> {
    let canvas_id = path.into_inner();
    let RunRequest { graph, input } = req.into_inner();

    info!("Running canvas: {}", canvas_id);

    let report = data.runtime.run(canvas_id.clone(), &graph, input).await;
    if report.succeeded() {
        info!("Canvas {} run {} completed", canvas_id, report.run_id());
    } else {
        warn!(
            "Canvas {} run {} failed: {}",
            canvas_id,
            report.run_id(),
            report.run.error.as_deref().unwrap_or_default()
        );
    }

    Ok(HttpResponse::Ok().json(report))
}

/// Recent runs of a canvas, newest first
#[get("/api/canvases/{id}/runs")]
async fn list_canvas_runs(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let runs = data.runtime.tracer().get_runs_by_canvas(&path).await;
    Ok(HttpResponse::Ok().json(runs))
}

#[get("/api/runs/{id}")]
async fn get_run(data: web::Data<AppState>, path: web::Path<Uuid>) -> ActixResult<impl Responder> {
    let run_id = path.into_inner();
    match data.runtime.tracer().get_run(run_id).await {
        Some(run) => Ok(HttpResponse::Ok().json(run)),
        None => Ok(not_found(format!("Run {} not found", run_id))),
    }
}

#[get("/api/runs/{id}/steps")]
async fn get_run_steps(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ActixResult<impl Responder> {
    let run_id = path.into_inner();
    let tracer = data.runtime.tracer();
    if tracer.get_run(run_id).await.is_none() {
        return Ok(not_found(format!("Run {} not found", run_id)));
    }
    Ok(HttpResponse::Ok().json(tracer.get_run_steps(run_id).await))
}

#[get("/api/runs/{id}/steps/{node}/output")]
async fn get_step_output(
    data: web::Data<AppState>,
    path: web::Path<(Uuid, String)>,
) -> ActixResult<impl Responder> {
    let (run_id, node_id) = path.into_inner();
    match data.runtime.tracer().get_step_output(run_id, &node_id).await {
        Some(output) => Ok(HttpResponse::Ok().json(output)),
        None => Ok(not_found(format!(
            "No output for step {} in run {}",
            node_id, run_id
        ))),
    }
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        // A slow client is dropped rather than fed a gapped stream
                        Err(e) => {
                            warn!("WebSocket event stream closed: {}", e);
                            break;
                        }
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(list_node_types)
        .service(validate_canvas)
        .service(run_canvas)
        .service(list_canvas_runs)
        .service(get_run)
        .service(get_run_steps)
        .service(get_step_output)
        .service(websocket_events);
}

fn build_runtime(config: RuntimeConfig) -> anyhow::Result<CanvasRuntime> {
    let mut registry = ExecutorRegistry::new();
    canvasnodes::register_all(&mut registry);
    Ok(CanvasRuntime::with_registry(Arc::new(registry), config)?)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("🚀 Starting Canvas Server");

    let config = RuntimeConfig::from_env();
    let runtime = build_runtime(config.clone())?;

    info!(
        "✅ Runtime initialized (tracer capacity {}, event buffer {})",
        config.tracer_capacity, config.event_buffer_size
    );

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(runtime),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(routes)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
