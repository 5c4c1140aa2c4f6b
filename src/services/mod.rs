//! Service layer: command handlers, broadcast fan-out, and background tasks.

pub mod allocator;
pub mod answer_service;
pub mod documentation;
pub mod events;
pub mod health_service;
pub mod participant_service;
pub mod session_service;
pub mod summary;
pub mod supervisor;
pub mod websocket_service;
