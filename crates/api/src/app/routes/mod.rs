use axum::{Router, routing::get};

pub mod admin;
pub mod cases;
pub mod companies;
pub mod custom_fields;
pub mod exchange;
pub mod groups;
pub mod leads;
pub mod opportunities;
pub mod people;
pub mod purchase_orders;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/companies", companies::router())
        .nest("/people", people::router())
        .nest("/leads", leads::router())
        .nest("/opportunities", opportunities::router())
        .nest("/purchase-orders", purchase_orders::router())
        .nest("/cases", cases::router())
        .nest("/security-groups", groups::router())
        .nest("/custom-fields", custom_fields::router())
        .nest("/exchange", exchange::router())
        .nest("/admin", admin::router())
}
