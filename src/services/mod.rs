/// OAuth handshake with the external music service.
pub mod auth_service;
/// OpenAPI document assembly.
pub mod documentation;
/// Health check responses.
pub mod health_service;
/// WebSocket lifecycle and event dispatch.
pub mod socket_service;
/// Stale room cleanup task.
pub mod sweeper;
