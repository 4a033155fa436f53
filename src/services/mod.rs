/// Fan-out of committed updates to websocket watchers and the pub/sub bridge.
pub mod broadcast_events;
/// Clock control operations (start, pause, reset, end).
pub mod clock_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Cross-process update mirroring over Redis pub/sub.
pub mod fanout_service;
/// Health check service.
pub mod health_service;
/// Per-second decrement loops for running clocks.
pub mod scheduler;
/// Read-through snapshot assembly for matches, clocks, events and stats.
pub mod snapshot_service;
/// Storage reconnection and degraded mode supervision.
pub mod storage_supervisor;
/// WebSocket connection, heartbeat and message handling service.
pub mod websocket_service;
