/// Access-level evaluation and caller identity extraction.
pub mod access;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Room broadcast message generation.
pub mod room_events;
/// Storage connection supervisor.
pub mod storage_supervisor;
/// Core timer command orchestration.
pub mod timer_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
