//! This module contains the Tessera evaluation web service
use std::sync::Arc;

use actix_web::{dev::ServerHandle, middleware::from_fn, web, App, HttpServer};
use tessera_common::action::BlockEvaluator;
use tokio::task::JoinHandle;
use tracing::info;

use crate::ServiceError;

mod middleware;
pub mod rpc;

/// Registers the service endpoints under `/{prefix}`.
pub fn routes(prefix: &str) -> impl FnOnce(&mut web::ServiceConfig) {
    let prefix = prefix.to_owned();
    move |cfg: &mut web::ServiceConfig| {
        cfg.service(
            web::resource(format!("/{prefix}/evaluation")).route(web::post().to(rpc::evaluation)),
        )
        .service(web::resource(format!("/{prefix}/health")).route(web::get().to(rpc::health)));
    }
}

/// Helper struct to build the evaluation HTTP server.
pub struct ServicesBuilder {
    prefix: String,
    port: u16,
    bind: String,
    /// Largest accepted request body in bytes.
    payload_limit: usize,
    evaluator: Arc<dyn BlockEvaluator>,
}

impl ServicesBuilder {
    pub fn new(evaluator: Arc<dyn BlockEvaluator>) -> Self {
        Self {
            prefix: "v1".to_owned(),
            port: 4343,
            bind: "0.0.0.0".to_owned(),
            payload_limit: 16 * 1024 * 1024,
            evaluator,
        }
    }

    /// Sets the URL prefix for the endpoints
    pub fn prefix(mut self, v: &str) -> Self {
        v.clone_into(&mut self.prefix);
        self
    }

    /// Sets the IP address for the server
    pub fn bind(mut self, v: &str) -> Self {
        v.clone_into(&mut self.bind);
        self
    }

    /// Sets the port for the server
    pub fn port(mut self, v: u16) -> Self {
        self.port = v;
        self
    }

    pub fn payload_limit(mut self, bytes: usize) -> Self {
        self.payload_limit = bytes;
        self
    }

    /// Starts the server. Returns a handle to stop it and the task driving it.
    pub fn run(self) -> Result<(ServerHandle, JoinHandle<Result<(), ServiceError>>), ServiceError> {
        info!(
            bind = %self.bind,
            port = self.port,
            prefix = %self.prefix,
            "Starting evaluation server"
        );
        let handler = web::Data::new(rpc::EvaluationHandler::new(self.evaluator));
        let json_config = web::JsonConfig::default().limit(self.payload_limit);
        let prefix = self.prefix;

        let server = HttpServer::new(move || {
            App::new()
                .wrap(from_fn(middleware::request_metrics_middleware))
                .app_data(handler.clone())
                .app_data(json_config.clone())
                .configure(routes(&prefix))
        })
        // evaluating a block can take a while, keep the connection open for the client
        .keep_alive(std::time::Duration::from_secs(60))
        .client_disconnect_timeout(std::time::Duration::from_secs(30))
        .bind((self.bind, self.port))
        .map_err(|err| ServiceError::Server(err.to_string()))?
        .run();
        let handle = server.handle();
        let task = tokio::spawn(async move {
            server
                .await
                .map_err(|err| ServiceError::Server(err.to_string()))
        });
        Ok((handle, task))
    }
}
