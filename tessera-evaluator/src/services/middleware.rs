use std::time::Instant;

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};
use metrics::{counter, histogram};
use tracing::instrument;

/// Records request counts, failures and latency per endpoint.
#[instrument(skip_all, fields(endpoint))]
pub(super) async fn request_metrics_middleware<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, actix_web::Error>
where
    B: MessageBody + 'static,
{
    let start = Instant::now();
    let endpoint = req
        .match_pattern()
        .unwrap_or_else(|| req.path().to_owned());
    tracing::Span::current().record("endpoint", &endpoint);

    counter!("evaluation_requests", "endpoint" => endpoint.clone()).increment(1);

    let res = next.call(req).await;

    histogram!("evaluation_request_duration_seconds", "endpoint" => endpoint.clone())
        .record(start.elapsed().as_secs_f64());

    let status = match &res {
        Ok(srv_res) => srv_res.status(),
        Err(e) => e.as_response_error().status_code(),
    };
    if status.is_client_error() || status.is_server_error() {
        counter!(
            "evaluation_requests_failed",
            "endpoint" => endpoint,
            "status" => status.as_u16().to_string()
        )
        .increment(1);
    }

    res.map(ServiceResponse::map_into_boxed_body)
}
