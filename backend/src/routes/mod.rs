//! Route definitions for the supply ledger API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes; everything under `/api/v1` needs a bearer token
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/stock", stock_routes())
        .nest("/faults", fault_routes())
        .nest("/repair-transfers", repair_routes())
        .nest("/transfers", transfer_routes())
        .nest("/reports", report_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/receive", post(handlers::receive))
        .route("/consume", post(handlers::consume))
        .route("/accounts/:location_id/:product_id", get(handlers::get_account))
        .route("/locations/:location_id/summary", get(handlers::get_location_summary))
}

fn fault_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::report_damage))
        .route("/repair-report", post(handlers::report_for_repair))
        .route("/:fault_id", get(handlers::get_fault))
        .route("/:fault_id/accept-damage", post(handlers::accept_damage))
        .route("/:fault_id/reject-damage", post(handlers::reject_damage))
        .route("/:fault_id/repair-transfers", post(handlers::send_to_repair))
}

fn repair_routes() -> Router<AppState> {
    Router::new()
        .route("/:repair_id/accept", post(handlers::accept_repair_transfer))
        .route("/:repair_id/reject", post(handlers::reject_repair_transfer))
        .route("/:repair_id/complete", post(handlers::complete_repair))
        .route("/:repair_id/scrap", post(handlers::scrap_repaired))
}

fn transfer_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::propose_transfer))
        .route("/batch", post(handlers::resolve_batch))
        .route("/pending", get(handlers::list_pending))
        .route("/:proposal_id/resolve", post(handlers::resolve_transfer))
        .route("/:proposal_id/document", put(handlers::attach_document))
}

fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/faults", get(handlers::get_fault_summary))
        .route("/stock.csv", get(handlers::export_stock_csv))
}
