use actix_web::{HttpResponse, Responder, get, http::StatusCode, web};
use keylock_core::{CallerContext, LockError};
use serde::Deserialize;

use crate::model::{self, AppState};
use crate::service::ReentrantReport;

#[derive(Debug, Deserialize)]
struct EchoParam {
    abc: String,
}

/// Runs the guarded service; each request is its own caller context
#[get("/{abc}/bcd")]
pub async fn guarded(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let abc = path.into_inner();
    tracing::info!(abc = %abc, "Received request");

    let context = CallerContext::new();
    match data.reentrant_service.method1(&context, &abc).await {
        Ok(report) => model::Result::<ReentrantReport>::http_success(report),
        Err(e) => lock_error_response(e),
    }
}

#[get("/{abc}/efg")]
pub async fn echo_path(path: web::Path<String>) -> impl Responder {
    tracing::info!(abc = %path.as_str(), "Received request");
    HttpResponse::Ok().body("ok")
}

#[get("/efg")]
pub async fn echo_query(params: web::Query<EchoParam>) -> impl Responder {
    tracing::info!(abc = %params.abc, "Received request");
    HttpResponse::Ok().body("ok")
}

fn lock_error_response(e: LockError) -> HttpResponse {
    let status = match &e {
        LockError::AcquisitionFailed { .. } | LockError::Cancelled { .. } => StatusCode::CONFLICT,
        LockError::KeyTooLong { .. } | LockError::InvalidKeySegment { .. } => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "Guarded call failed");
    } else {
        tracing::info!(error = %e, "Guarded call rejected");
    }
    model::Result::<()>::http_response(status, status.as_u16() as i32, e.to_string(), ())
}
