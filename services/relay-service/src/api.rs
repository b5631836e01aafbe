//! HTTP handlers: identity registration and lookup

use actix_web::{web, HttpResponse, Result as ActixResult};
use parley_core::Identity;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::AppState;

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health_check))
        .route("/version", web::get().to(version))
        .route("/login/{public_key}", web::get().to(login))
        .route("/connect/{id}", web::get().to(connect));
}

/// Fallback for unmatched routes
pub async fn not_found() -> ActixResult<HttpResponse, ServiceError> {
    Err(ServiceError::NotFound)
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

async fn version() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub id: Identity,
}

/// Register a public key and hand out a fresh identity
async fn login(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse, ServiceError> {
    let public_key = path.into_inner();
    let id = state.relay.identities().create(&public_key)?;
    info!("Registered identity {}", id);

    Ok(HttpResponse::Ok().json(LoginResponse { id }))
}

/// Connect response
#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub user: Identity,
    pub publickey: String,
}

/// Look up the public key registered for an identity
async fn connect(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse, ServiceError> {
    let user = Identity::parse(&path.into_inner()).map_err(|_| ServiceError::NotFound)?;

    match state.relay.identities().get_public_key(&user)? {
        Some(publickey) => Ok(HttpResponse::Ok().json(ConnectResponse { user, publickey })),
        None => {
            debug!("Lookup for unknown identity {}", user);
            Err(ServiceError::NotFound)
        }
    }
}
