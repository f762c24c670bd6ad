//! # tonebox-core
//!
//! The performance controller behind the `tonebox` binary: voices, routing,
//! note dispatch, MIDI input and recording, independent of any UI.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tonebox_core::config::Config;
//! use tonebox_core::midi::MidirTransport;
//! use tonebox_core::Performance;
//! use tonebox_audio::{CpalBackend, CpalMicrophone};
//!
//! let settings = Config::load().settings()?;
//! let transport = MidirTransport::new(settings.midi.client_name.clone());
//! let mut perf = Performance::new(
//!     settings,
//!     Box::new(CpalBackend::new()),
//!     Box::new(transport),
//!     Box::new(CpalMicrophone::new()),
//! )?;
//!
//! perf.play_note("C4".parse()?)?;   // first note starts the engine
//! perf.tick(std::time::Instant::now()); // drain MIDI, hot-plug and finished takes
//! perf.shutdown();
//! ```
//!
//! ## Module Overview
//!
//! - [`registry`]: one voice per instrument and drum, built once
//! - [`router`]: shared filter, effect send and capture tap; control mapping
//! - [`dispatch`]: engine activation, drum tables, note routing
//! - [`midi`]: device discovery, hot-plug, the bound input
//! - [`recording`]: instrument/voice capture and the take list
//! - [`state`]: performance state with change notification
//! - [`performance`]: owns all of the above; one handler per event
//! - [`config`]: embedded defaults merged with the user's config.toml

pub mod config;
pub mod dispatch;
pub mod error;
pub mod midi;
pub mod performance;
pub mod recording;
pub mod registry;
pub mod router;
pub mod state;

pub use error::{PerformanceError, PerformanceResult};
pub use performance::{Performance, PerformanceStatus, TickReport};
