//! Story viewer playback engine.
//!
//! A synchronous core ([`session::Session`] and the components it composes)
//! that turns input and media events into [`effect::Effect`]s, plus a tokio
//! [`runtime`] that carries those effects out against a [`service::StoryService`].

pub mod burst;
pub mod clock;
pub mod config;
pub mod effect;
pub mod error;
pub mod gesture;
pub mod preload;
pub mod readiness;
pub mod realtime;
pub mod recorder;
pub mod runtime;
pub mod service;
pub mod session;
pub mod story;

pub use config::ViewerConfig;
pub use error::{EngineError, ServiceError};
pub use runtime::{spawn_session, Command, HostEvent, Services, SessionHandle};
pub use session::{OverlayKind, Session, ViewSession};
pub use story::{MediaType, StoryCollection, StoryItem};
