//! # Server Configuration
//!
//! Application state, router and OpenAPI document for the governance service.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::access::AccessResolver;
use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::directory::HierarchyDirectory;
use crate::handlers::{self, access, approvals, credentials, directory, grants};
use crate::notify::Notifier;
use crate::platform::AdsPlatform;
use crate::repositories::{CredentialRepository, GrantStore, HistoryRepository, OAuthStateRepository};
use crate::telemetry::trace_id_middleware;
use crate::token_vault::TokenVault;
use crate::workflow::ApprovalWorkflow;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub vault: TokenVault,
    pub directory: HierarchyDirectory,
    pub grants: GrantStore,
    pub history: HistoryRepository,
    pub access: AccessResolver,
    pub workflow: ApprovalWorkflow,
}

impl AppState {
    /// Wires the governance components over one database and one platform client.
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        crypto_key: CryptoKey,
        platform: Arc<dyn AdsPlatform>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let vault = TokenVault::new(
            CredentialRepository::new(db.clone()),
            OAuthStateRepository::new(db.clone()),
            platform.clone(),
            crypto_key,
            config.token_vault.clone(),
        );
        let directory = HierarchyDirectory::new(platform, vault.clone(), config.directory.clone());
        let grants = GrantStore::new(db.clone(), notifier.clone());
        let workflow = ApprovalWorkflow::new(db.clone(), notifier);
        let access = AccessResolver::new(grants.clone(), vault.clone(), workflow.clone());

        Self {
            history: HistoryRepository::new(db.clone()),
            config,
            db,
            vault,
            directory,
            grants,
            access,
            workflow,
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/credentials/connect", post(credentials::connect))
        .route("/credentials/callback", post(credentials::callback))
        .route("/credentials/{principal_id}", get(credentials::get_credential))
        .route(
            "/credentials/{principal_id}/refresh",
            post(credentials::refresh_credential),
        )
        .route(
            "/credentials/{principal_id}/disconnect",
            post(credentials::disconnect_credential),
        )
        .route(
            "/credentials/{principal_id}/primary",
            post(credentials::set_primary_credential),
        )
        .route(
            "/directory/{principal_id}/accounts",
            get(directory::list_accounts),
        )
        .route(
            "/directory/{principal_id}/accounts/{account_id}",
            get(directory::describe_account),
        )
        .route("/grants", post(grants::create_grant).get(grants::list_grants))
        .route(
            "/grants/{advertiser_account_id}/revoke",
            post(grants::revoke_grants),
        )
        .route(
            "/grants/{advertiser_account_id}/history",
            get(grants::grant_history),
        )
        .route("/access/authorize", post(access::authorize))
        .route(
            "/campaigns/{campaign_id}/release-check",
            post(access::release_check),
        )
        .route(
            "/approvals",
            post(approvals::submit_approval).get(approvals::pending_approvals),
        )
        .route("/approvals/{approval_id}", get(approvals::get_approval))
        .route(
            "/approvals/{approval_id}/history",
            get(approvals::approval_history),
        )
        .route(
            "/approvals/{approval_id}/approve",
            post(approvals::approve_step),
        )
        .route("/approvals/{approval_id}/reject", post(approvals::reject_step))
        .route_layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(trace_id_middleware))
}

/// Serves the application until `shutdown` fires, then drains in-flight requests.
pub async fn run_server(
    config: Arc<AppConfig>,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Registers the operator bearer scheme referenced by `security(("bearer_auth" = []))`.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::credentials::connect,
        crate::handlers::credentials::callback,
        crate::handlers::credentials::get_credential,
        crate::handlers::credentials::refresh_credential,
        crate::handlers::credentials::disconnect_credential,
        crate::handlers::credentials::set_primary_credential,
        crate::handlers::directory::list_accounts,
        crate::handlers::directory::describe_account,
        crate::handlers::grants::create_grant,
        crate::handlers::grants::list_grants,
        crate::handlers::grants::revoke_grants,
        crate::handlers::grants::grant_history,
        crate::handlers::access::authorize,
        crate::handlers::access::release_check,
        crate::handlers::approvals::submit_approval,
        crate::handlers::approvals::pending_approvals,
        crate::handlers::approvals::get_approval,
        crate::handlers::approvals::approval_history,
        crate::handlers::approvals::approve_step,
        crate::handlers::approvals::reject_step,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::error::ApiError,
            crate::handlers::credentials::ConnectRequest,
            crate::handlers::credentials::ConnectResponse,
            crate::handlers::credentials::CallbackRequest,
            crate::token_vault::CredentialSummary,
            crate::models::linked_credential::PrincipalKind,
            crate::platform::AdvertiserAccount,
            crate::handlers::directory::AccountsResponse,
            crate::models::permission_grant::Capability,
            crate::models::permission_grant::CapabilitySet,
            crate::models::grant_history::GrantAction,
            crate::handlers::grants::GrantRequest,
            crate::handlers::grants::GrantResponse,
            crate::handlers::grants::GrantsResponse,
            crate::handlers::grants::RevokeResponse,
            crate::handlers::grants::GrantHistoryEntry,
            crate::access::CredentialSource,
            crate::access::DenialReason,
            crate::handlers::access::AuthorizeRequest,
            crate::handlers::access::AuthorizeResponse,
            crate::handlers::access::GrantedAccess,
            crate::handlers::access::ReleaseCheckRequest,
            crate::handlers::access::ReleaseCheckResponse,
            crate::models::approval_step::ApproverRole,
            crate::models::campaign_approval::ApprovalStatus,
            crate::models::approval_history::ApprovalAction,
            crate::workflow::StepView,
            crate::workflow::ApprovalView,
            crate::handlers::approvals::SubmitRequest,
            crate::handlers::approvals::PendingResponse,
            crate::handlers::approvals::DecisionRequest,
            crate::handlers::approvals::ApprovalHistoryEntry,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "credentials", description = "Token Vault: linked platform credentials"),
        (name = "directory", description = "Advertiser account hierarchy"),
        (name = "grants", description = "Permission grants and their ledger"),
        (name = "access", description = "Access and release decisions"),
        (name = "approvals", description = "Campaign approval workflow"),
    ),
    info(
        title = "Adgate API",
        description = "Advertising-account access control and campaign governance",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
