use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Turn Clock Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::timers::create_timer,
        crate::routes::timers::get_timer,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dao::models::TimerKind,
            crate::dto::health::HealthResponse,
            crate::dto::timer::CreateTimerRequest,
            crate::dto::timer::SeatInput,
            crate::dto::timer::SeatOrderInput,
            crate::dto::timer::TimerSnapshot,
            crate::dto::timer::SeatSnapshot,
            crate::dto::ws::TimerInboundMessage,
            crate::dto::ws::TimerOutboundMessage,
            crate::dto::ws::CommandAck,
            crate::dto::ws::ErrorPayload,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "timers", description = "Timer creation and inspection"),
        (name = "ws", description = "WebSocket operations for timer clients"),
    )
)]
pub struct ApiDoc;
