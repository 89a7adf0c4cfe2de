use actix_web::{Responder, get, web};
use serde::Deserialize;

use crate::model::{self, AppState};
use crate::service::ContentionReport;

/// Upper bound on workers a single request may start
const MAX_WORKERS: usize = 1000;

#[derive(Debug, Deserialize)]
struct GetLockParam {
    workers: Option<usize>,
}

#[get("/getlock")]
pub async fn get_lock(data: web::Data<AppState>, params: web::Query<GetLockParam>) -> impl Responder {
    let workers = params
        .workers
        .unwrap_or(data.contention.default_workers())
        .min(MAX_WORKERS);

    tracing::info!(workers, "Starting lock contention demo");
    let report = data.contention.run(workers).await;

    model::Result::<ContentionReport>::http_success(report)
}
