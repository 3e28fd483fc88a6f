//! JSON-RPC Server
//!
//! Serves JSON-RPC 2.0 over HTTP and WebSocket on one TCP port. The queue
//! subscription needs WebSocket.

use crate::handler::RpcHandler;
use crate::types::{
    JoinParams, LeaveParams, ListProfessorsParams, ProfessorParams, QueueParams,
    RegisterParams, StatsRequest, StatusParams,
};
use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::server::{
    PendingSubscriptionSink, Server, ServerHandle, SubscriptionMessage, SubscriptionSink,
};
use jsonrpsee::RpcModule;
use queueup_core::application::QueueSubscription;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{debug, info};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9630;

pub const SUBSCRIBE_METHOD: &str = "queue.subscribe.v1";
pub const SUBSCRIPTION_NOTIFICATION: &str = "queue.snapshot_changed";
pub const UNSUBSCRIBE_METHOD: &str = "queue.unsubscribe.v1";

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

macro_rules! register_method {
    ($module:expr, $handler:expr, $name:literal, $params:ty, $method:ident) => {{
        let handler = $handler.clone();
        $module
            .register_async_method($name, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: $params = params.parse()?;
                    handler.$method(req).await
                }
            })
            .map_err(|e| e.to_string())?;
    }};
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the bound address (useful with port 0) and the stop handle.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = build_module(&self.handler)?;

        info!(addr = %local_addr, "JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok((local_addr, handle))
    }
}

fn build_module(handler: &Arc<RpcHandler>) -> Result<RpcModule<()>, String> {
    let mut module = RpcModule::new(());

    // Queue
    register_method!(module, handler, "queue.join.v1", JoinParams, join);
    register_method!(module, handler, "queue.leave.v1", LeaveParams, leave);
    register_method!(module, handler, "queue.call_next.v1", QueueParams, call_next);
    register_method!(module, handler, "queue.clear.v1", QueueParams, clear);
    register_method!(module, handler, "queue.snapshot.v1", QueueParams, snapshot);
    register_method!(module, handler, "queue.status.v1", StatusParams, status);

    // Professors
    register_method!(module, handler, "professor.register.v1", RegisterParams, register);
    register_method!(module, handler, "professor.toggle.v1", ProfessorParams, toggle);
    register_method!(module, handler, "professor.end.v1", ProfessorParams, end);

    // Parameterless methods accept a missing params object
    let h = handler.clone();
    module
        .register_async_method("professor.list.v1", move |params, _, _| {
            let h = h.clone();
            async move {
                let req: ListProfessorsParams = params.parse::<Option<_>>()?.unwrap_or_default();
                h.list_professors(req).await
            }
        })
        .map_err(|e| e.to_string())?;

    let h = handler.clone();
    module
        .register_async_method("admin.stats.v1", move |params, _, _| {
            let h = h.clone();
            async move {
                let req: StatsRequest = params.parse::<Option<_>>()?.unwrap_or_default();
                h.stats(req).await
            }
        })
        .map_err(|e| e.to_string())?;

    let h = handler.clone();
    module
        .register_subscription(
            SUBSCRIBE_METHOD,
            SUBSCRIPTION_NOTIFICATION,
            UNSUBSCRIBE_METHOD,
            move |params, pending, _, _| {
                let h = h.clone();
                async move {
                    let req: QueueParams = match params.parse() {
                        Ok(req) => req,
                        Err(e) => {
                            pending.reject(e).await;
                            return Ok(());
                        }
                    };
                    let subscription = match h.subscribe(req).await {
                        Ok(subscription) => subscription,
                        Err(e) => {
                            pending.reject(e).await;
                            return Ok(());
                        }
                    };
                    forward_snapshots(pending, subscription).await
                }
            },
        )
        .map_err(|e| e.to_string())?;

    Ok(module)
}

/// Push the current snapshot, then every newer one, until either side goes away
async fn forward_snapshots(
    pending: PendingSubscriptionSink,
    subscription: QueueSubscription,
) -> SubscriptionResult {
    let sink: SubscriptionSink = pending.accept().await?;
    let professor_id = subscription.professor_id().to_string();
    debug!(professor_id = %professor_id, "Queue subscription opened");

    let mut snapshots = subscription.into_stream();
    loop {
        tokio::select! {
            _ = sink.closed() => break,
            next = snapshots.next() => match next {
                Some(snapshot) => {
                    let message = SubscriptionMessage::from_json(&*snapshot)?;
                    sink.send(message).await?;
                }
                None => break,
            },
        }
    }

    debug!(professor_id = %professor_id, "Queue subscription closed");
    Ok(())
}
