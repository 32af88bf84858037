use crate::handlers;
use axum::Router;
use centra_kernel::server::state::ApiState;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_scalar::{Scalar, Servable};

#[derive(OpenApi)]
#[openapi(info(title = "Centra attestation service", description = "License attestation and usage-enforcement API"))]
struct ApiDoc;

pub(crate) fn init(state: ApiState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(centra_kernel::server::router::system_router())
        .merge(attestation_router())
        .merge(license_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .split_for_parts();

    router.merge(Scalar::with_url("/api", api))
}

fn attestation_router<S>() -> OpenApiRouter<S>
where
    S: Send + Sync + Clone + 'static,
    centra_attestation::AttestationEngine: axum::extract::FromRef<S>,
{
    OpenApiRouter::<S>::new().routes(routes!(
        handlers::provision_handler,
        handlers::challenge_handler,
        handlers::assertion_handler,
    ))
}

fn license_router<S>() -> OpenApiRouter<S>
where
    S: Send + Sync + Clone + 'static,
    centra_licensing::LicenseStore: axum::extract::FromRef<S>,
{
    OpenApiRouter::<S>::new().routes(routes!(handlers::get_license_handler))
}
