use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quizfire Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::session_by_join_code,
        crate::routes::sessions::session_summary,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::SessionCreated,
            crate::dto::session::SessionDetails,
            crate::dto::session::ParticipantSummary,
            crate::dto::question::HostQuestionView,
            crate::dto::question::ParticipantQuestionView,
            crate::dto::ws::ClientCommand,
            crate::dto::ws::CommandReply,
            crate::dto::ws::ServerEvent,
            crate::services::summary::SessionReport,
            crate::error::ErrorCode,
            crate::state::machine::SessionPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Live session lifecycle"),
        (name = "gateway", description = "WebSocket command and broadcast channel"),
    )
)]
pub struct ApiDoc;
