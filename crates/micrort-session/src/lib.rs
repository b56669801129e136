//! Micro-device sessions.
//!
//! A [`Session`] compiles the device runtime against a memory layout, opens a
//! [`Channel`] to the device (in-process or through a debug server), and
//! brackets device work with the runtime's enter/exit hooks. Operator
//! libraries are built and loaded independently with [`create_micro_mod`].
//!
//! ```no_run
//! use micrort_compile::{get_device_funcs, DefaultConfigParams};
//! use micrort_session::{create_micro_mod, Session, SourceModule};
//!
//! # fn main() -> Result<(), micrort_session::SessionError> {
//! let config = get_device_funcs("host")?.default_config(&DefaultConfigParams::default())?;
//! let session = Session::new(&config)?;
//! session.with(|_sess| {
//!     let module = SourceModule::new("add", "int add(int a, int b) { return a + b; }\n");
//!     let micro_mod = create_micro_mod(&module, &config)?;
//!     println!("loaded {}", micro_mod.artifact());
//!     Ok::<_, micrort_session::SessionError>(())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod error;
pub mod module;
pub mod session;

pub use channel::{Channel, ChannelOpener, ChannelParams, DefaultChannelOpener};
pub use error::{Result, SessionError};
pub use module::{
    create_micro_mod, create_micro_mod_with, IntermediateModule, MicroModule, ModuleLoader,
    ObjectModuleLoader, SourceModule,
};
pub use session::{Session, SessionBuilder, SessionGuard, SessionState};
