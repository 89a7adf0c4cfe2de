use actix_web::{Scope, web};

pub fn distribute_lock_routes() -> Scope {
    web::scope("/distributelock").service(super::distribute_lock::get_lock)
}

pub fn test_routes() -> Scope {
    web::scope("/test")
        .service(super::guarded::echo_query)
        .service(super::guarded::guarded)
        .service(super::guarded::echo_path)
}
