use crate::{
    Result,
    operations::{
        LogRequest,
        MintRequest,
        OperationId,
        OperationSnapshot,
        QueueStats,
    },
    queue::{
        TxQueue,
        chain_writer::ChainWriter,
    },
};
use actix_cors::Cors;
use actix_web::{
    App,
    HttpServer,
    dev::ServerHandle,
    error::{
        ErrorBadRequest,
        ErrorNotFound,
    },
    web,
};
use anyhow::Context;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::TcpListener,
    str::FromStr,
    thread::JoinHandle,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct EnqueuedDto {
    id: OperationId,
}

/// HTTP boundary for the browser front end: enqueue writes, poll status.
pub struct StatusApi {
    base_url: String,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl StatusApi {
    pub async fn new<C>(queue: TxQueue<C>, port: Option<u16>) -> Result<Self>
    where
        C: ChainWriter + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", port.unwrap_or(0)))
            .context("failed to bind HTTP listener for status API")?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!("status API listening on {}", base_url);

        let server_queue = queue.clone();
        let server = HttpServer::new(move || {
            let queue = server_queue.clone();

            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(queue))
                .route("/log", web::post().to(handle_enqueue_log::<C>))
                .route("/mint", web::post().to(handle_enqueue_mint::<C>))
                .route(
                    "/operation/{id}",
                    web::get().to(handle_operation_status::<C>),
                )
                .route("/stats", web::get().to(handle_stats::<C>))
        })
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            base_url,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Drop for StatusApi {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

async fn handle_enqueue_log<C>(
    queue: web::Data<TxQueue<C>>,
    request: web::Json<LogRequest>,
) -> actix_web::Result<web::Json<EnqueuedDto>>
where
    C: ChainWriter + Send + Sync + 'static,
{
    let id = queue
        .enqueue_log(request.into_inner())
        .map_err(ErrorBadRequest)?;
    Ok(web::Json(EnqueuedDto { id }))
}

async fn handle_enqueue_mint<C>(
    queue: web::Data<TxQueue<C>>,
    request: web::Json<MintRequest>,
) -> actix_web::Result<web::Json<EnqueuedDto>>
where
    C: ChainWriter + Send + Sync + 'static,
{
    let id = queue
        .enqueue_mint(request.into_inner())
        .map_err(ErrorBadRequest)?;
    Ok(web::Json(EnqueuedDto { id }))
}

async fn handle_operation_status<C>(
    queue: web::Data<TxQueue<C>>,
    id: web::Path<String>,
) -> actix_web::Result<web::Json<OperationSnapshot>>
where
    C: ChainWriter + Send + Sync + 'static,
{
    let id = OperationId::from_str(&id).map_err(ErrorBadRequest)?;
    let snapshot = queue
        .get_status(id)
        .ok_or_else(|| ErrorNotFound("operation not found"))?;
    Ok(web::Json(snapshot))
}

async fn handle_stats<C>(queue: web::Data<TxQueue<C>>) -> web::Json<QueueStats>
where
    C: ChainWriter + Send + Sync + 'static,
{
    web::Json(queue.get_stats())
}
