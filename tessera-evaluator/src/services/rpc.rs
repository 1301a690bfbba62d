//! HTTP handlers of the evaluation service.
use std::{sync::Arc, time::Instant};

use actix_web::{web, HttpResponse};
use metrics::counter;
use tessera_common::{
    action::BlockEvaluator,
    dto::{Health, RemoteEvaluationRequest, RemoteEvaluationResponse},
};
use tracing::{error, info, instrument};

use crate::ServiceError;

pub struct EvaluationHandler {
    evaluator: Arc<dyn BlockEvaluator>,
}

impl EvaluationHandler {
    pub fn new(evaluator: Arc<dyn BlockEvaluator>) -> Self {
        Self { evaluator }
    }

    #[instrument(skip_all, fields(block_index = request.pre_evaluation_block.index()))]
    async fn evaluate_block(
        &self,
        request: &RemoteEvaluationRequest,
    ) -> Result<RemoteEvaluationResponse, ServiceError> {
        let block = &request.pre_evaluation_block;
        let started = Instant::now();
        let evaluations = self.evaluator.evaluate(block).await?;
        info!(
            evaluations = evaluations.len(),
            duration_ms = started.elapsed().as_millis(),
            "Evaluated block"
        );
        counter!("evaluated_actions").increment(evaluations.len() as u64);
        Ok(RemoteEvaluationResponse::from(&evaluations[..]))
    }
}

pub async fn evaluation(
    body: web::Json<RemoteEvaluationRequest>,
    handler: web::Data<EvaluationHandler>,
) -> HttpResponse {
    match handler.evaluate_block(&body).await {
        Ok(response) => {
            counter!("block_evaluations", "outcome" => "ok").increment(1);
            HttpResponse::Ok().json(response)
        }
        Err(err) => {
            counter!("block_evaluations", "outcome" => "error").increment(1);
            error!(error = %err, "Error while evaluating block.");
            HttpResponse::InternalServerError().body(err.to_string())
        }
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(Health::new(env!("CARGO_PKG_VERSION")))
}
