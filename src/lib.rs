//! # satcore
//!
//! Execution core for an onboard computer: a deterministic, tick-driven
//! cyclic executive that runs a fixed roster of Apps from a Task List, and a
//! telecommand path that routes command packets to registered handlers.
//!
//! ## Features
//!
//! - **Cyclic scheduling**: Task Lists of (tick offset, block) pairs, fired in
//!   declaration order every cycle
//! - **Blocks**: single Apps, round-robin rotators, combiners and pre-built
//!   command packets
//! - **Command dispatch**: two-level results (framework status plus driver code)
//!   with a bounded command history
//! - **Structured events**: scheduler and dispatcher emit events, never telemetry
//! - **Bounded memory**: fixed-capacity tables sized at compile time
//!
//! ## Quick Start
//!
//! ```rust
//! use satcore::{App, AppResult, Block, BlockId, OnboardExecutive, TaskList};
//!
//! struct Blink(u32);
//!
//! impl App for Blink {
//!     fn name(&self) -> &str { "blink" }
//!     fn init(&mut self) -> AppResult { Ok(()) }
//!     fn update(&mut self) -> AppResult { self.0 += 1; Ok(()) }
//! }
//!
//! let mut exec = OnboardExecutive::new();
//! let app = exec.register_app(Box::new(Blink(0))).unwrap();
//! exec.define_block(BlockId(1), Block::Single(app)).unwrap();
//! exec.start().unwrap();
//!
//! exec.load_task_list(TaskList::from_entries(10, &[(0, BlockId(1))]).unwrap()).unwrap();
//! let report = exec.tick().unwrap();
//! assert_eq!(report.blocks_fired, 1);
//! ```
//!
//! ## Architecture
//!
//! - [`app`] - App contract and registry
//! - [`block`] - Block Command Table
//! - [`task_list`] - Task Lists and mode ids
//! - [`scheduler`] - the cyclic scheduler
//! - [`command`] - command registry and dispatcher
//! - [`executive`] - owner of all of the above
//! - [`services`] - driver-backed Apps and command handlers
//! - [`telemetry`] - execution events and telemetry frames

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

extern crate alloc;

pub mod app;
pub mod block;
pub mod command;
pub mod config;
pub mod error;
pub mod executive;
pub mod protocol;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod task_list;
pub mod telemetry;

pub use app::{App, AppId, AppRegistry, FnApp, InitPolicy};
pub use block::{Block, BlockCommandTable, BlockId, Combiner, Rotator};
pub use command::{CommandDispatcher, CommandHandler, CommandRegistry};
pub use config::ExecutiveConfig;
pub use error::{AppError, AppResult, ConfigError, ExecutiveError, ProtocolError, RegistrationError};
pub use executive::OnboardExecutive;
pub use protocol::{CommandAck, CommandId, CommandPacket, CommandResult, CommandSource, ExecStatus};
pub use scheduler::{CyclicScheduler, TickReport};
pub use task_list::{ModeId, TaskList};
pub use telemetry::{EventSink, ExecEvent, TelemetryFrame};
