//! Render PlantUML diagrams through a local engine or a remote PlantUML
//! server.
//!
//! The two backends implement one capability contract ([`Backend`]) with
//! different failure modes: the local one spawns an engine process per
//! render call, the remote one GETs encoded diagram URLs from a PlantUML
//! server. [`batch::run`] drives many renders concurrently while reporting
//! results strictly in input order.
//!
//! ```no_run
//! use plantuml_render::{Config, RenderFormat, backend::factory, batch};
//!
//! # fn main() -> Result<(), plantuml_render::BackendError> {
//! let backend = factory::create(&Config::default())?;
//! let sources = vec![String::from("@startuml\nA -> B\n@enduml")];
//! let report = batch::render_batch(
//!     backend.as_ref(),
//!     RenderFormat::Text,
//!     &sources,
//!     4,
//!     |index, _source, outcome| println!("{index}: ok={}", outcome.is_ok()),
//! );
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod batch;
pub mod config;
pub mod encoder;
pub mod errors;

pub use backend::{Backend, RenderFormat, RenderOutcome, RenderOutput};
pub use batch::{BatchReport, render_batch};
pub use config::{Config, LocalConfig, OFFICIAL_SERVER_URL, RemoteConfig};
pub use errors::BackendError;
