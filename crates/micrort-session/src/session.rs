//! Session lifecycle.
//!
//! Construction runs strictly in order: host check, backend lookup, layout
//! resolution, runtime compilation, transport resolution, channel open. A
//! session then moves between `ChannelOpen`, `Entered` and `Exited` until it
//! is closed or dropped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use micrort_compile::{
    runtime, CompileOptions, CrossCompiler, DeviceBackend, DeviceRegistry, LibType,
    ObjectArtifact,
};
use micrort_targets::{DeviceConfig, HostInfo, Transport};
use tempfile::TempDir;
use uuid::Uuid;

use crate::channel::{Channel, ChannelOpener, ChannelParams, DefaultChannelOpener};
use crate::error::{Result, SessionError};
use crate::module::{build_with, IntermediateModule, MicroModule, ObjectModuleLoader};

/// File name of the compiled runtime inside the session's private directory.
pub const RUNTIME_OBJ_NAME: &str = "micrort_runtime.obj";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    CompilingRuntime,
    ChannelOpen,
    Entered,
    Exited,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::CompilingRuntime => "compiling-runtime",
            SessionState::ChannelOpen => "channel-open",
            SessionState::Entered => "entered",
            SessionState::Exited => "exited",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A channel that is closed when dropped unless it was closed explicitly.
#[derive(Debug)]
struct OwnedChannel {
    inner: Box<dyn Channel>,
    closed: bool,
}

impl OwnedChannel {
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }
}

impl Drop for OwnedChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close channel: {e}");
        }
    }
}

/// Configures how a [`Session`] resolves its collaborators.
#[derive(Debug, Default)]
pub struct SessionBuilder {
    registry: Option<DeviceRegistry>,
    opener: Option<Box<dyn ChannelOpener>>,
    host: Option<HostInfo>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve backends from `registry` instead of the process-wide one.
    pub fn registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Open channels with `opener` instead of the default transports.
    pub fn channel_opener(mut self, opener: impl ChannelOpener + 'static) -> Self {
        self.opener = Some(Box::new(opener));
        self
    }

    /// Treat the host as `host` instead of the running machine.
    pub fn host(mut self, host: HostInfo) -> Self {
        self.host = Some(host);
        self
    }

    /// Build a session for `config`.
    pub fn build(self, config: &DeviceConfig) -> Result<Session> {
        let id = Uuid::new_v4();
        let mut state = SessionState::Uninitialized;
        log::debug!("session {id}: {state}");

        let host = self.host.unwrap_or_else(HostInfo::current);
        check_host(&host)?;

        let registry = self.registry.unwrap_or_else(DeviceRegistry::global);
        let backend = registry.get(&config.device_id)?;

        let config = config.clone();
        let regions = config.mem_layout.require_all()?;
        config.word_size_bytes()?;

        state = advance(id, state, SessionState::CompilingRuntime);
        let workdir = tempfile::Builder::new().prefix("micrort-session-").tempdir()?;
        let src_path = runtime::write_runtime_source(workdir.path())?;
        let obj_path = workdir.path().join(RUNTIME_OBJ_NAME);
        backend.compile(
            &obj_path,
            &src_path,
            LibType::Runtime,
            &CompileOptions::from_config(&config),
        )?;
        let runtime = ObjectArtifact::from_path(&obj_path)?;
        log::info!("session {id}: runtime compiled for '{}': {runtime}", config.device_id);

        let transport = config.transport()?;
        let (server_addr, server_port) = transport.endpoint();
        let params = ChannelParams {
            comms_method: transport.method(),
            runtime_obj_path: obj_path,
            toolchain_prefix: config.toolchain_prefix.clone(),
            regions,
            word_size: config.word_size,
            thumb_mode: config.thumb_mode,
            server_addr: server_addr.to_string(),
            server_port,
        };

        let opener = self
            .opener
            .unwrap_or_else(|| Box::new(DefaultChannelOpener));
        let channel = OwnedChannel {
            inner: opener.open(&params)?,
            closed: false,
        };
        state = advance(id, state, SessionState::ChannelOpen);

        Ok(Session {
            id,
            config,
            backend,
            transport,
            runtime,
            channel: RefCell::new(channel),
            state: Cell::new(state),
            _workdir: workdir,
        })
    }
}

/// One device session: a compiled runtime plus the channel running it.
///
/// Not shareable across threads. Enter it with [`Session::enter`] or
/// [`Session::with`]; the channel is closed when the session is dropped.
pub struct Session {
    id: Uuid,
    config: DeviceConfig,
    backend: Arc<dyn DeviceBackend>,
    transport: Transport,
    runtime: ObjectArtifact,
    // Declared before the work directory so the channel is closed before the
    // runtime artifact is deleted.
    channel: RefCell<OwnedChannel>,
    state: Cell<SessionState>,
    _workdir: TempDir,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("device_id", &self.config.device_id)
            .field("transport", &self.transport)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Session {
    /// Build a session with the process-wide registry and default transports.
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        SessionBuilder::new().build(config)
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// The configuration this session was built from.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The compiled runtime image.
    pub fn runtime_artifact(&self) -> &ObjectArtifact {
        &self.runtime
    }

    pub fn runtime_obj_path(&self) -> &Path {
        &self.runtime.path
    }

    /// Enter the execution context.
    ///
    /// The returned guard exits the context when dropped. Entering a session
    /// that is already entered fails with [`SessionError::Reentrancy`].
    pub fn enter(&self) -> Result<SessionGuard<'_>> {
        match self.state.get() {
            SessionState::Entered => return Err(SessionError::Reentrancy),
            SessionState::ChannelOpen | SessionState::Exited => {}
            other => {
                return Err(SessionError::Channel {
                    detail: format!("cannot enter a session in state {other}"),
                })
            }
        }
        self.channel.borrow_mut().inner.enter()?;
        self.set_state(SessionState::Entered);
        Ok(SessionGuard { session: self })
    }

    /// Exit the execution context if it is entered. Otherwise does nothing.
    pub fn exit(&self) -> Result<()> {
        if self.state.get() != SessionState::Entered {
            return Ok(());
        }
        // The context is considered left even if the exit hook fails.
        self.set_state(SessionState::Exited);
        self.channel.borrow_mut().inner.exit()
    }

    /// Run `body` inside the execution context.
    ///
    /// The exit hook runs exactly once however `body` ends, including by
    /// panic. An error from `body` takes precedence over an exit error.
    pub fn with<T, E, F>(&self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Session) -> std::result::Result<T, E>,
        E: From<SessionError>,
    {
        let guard = self.enter()?;
        let result = body(self);
        let exited = guard.exit();
        let value = result?;
        exited?;
        Ok(value)
    }

    /// A cross compiler reusing this session's backend and layout.
    pub fn cross_compiler(&self, lib_type: LibType) -> CrossCompiler {
        CrossCompiler::new(self.backend.clone(), &self.config, lib_type)
    }

    /// Build and load an operator module with this session's backend.
    pub fn create_micro_mod(&self, module: &dyn IntermediateModule) -> Result<MicroModule> {
        build_with(
            &self.cross_compiler(LibType::Operator),
            module,
            &ObjectModuleLoader,
        )
    }

    /// Exit if needed and close the channel, reporting any error.
    pub fn close(self) -> Result<()> {
        let exited = self.exit();
        let closed = self.channel.borrow_mut().close();
        self.set_state(SessionState::Closed);
        exited?;
        closed
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.replace(next);
        log::debug!("session {}: {prev} -> {next}", self.id);
    }
}

/// Scope guard for an entered session. Dropping it runs the exit hook.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    session: &'a Session,
}

impl SessionGuard<'_> {
    /// Exit now and report the exit hook's result.
    pub fn exit(self) -> Result<()> {
        // Drop sees the session already exited and does nothing.
        self.session.exit()
    }
}

impl std::ops::Deref for SessionGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.session.exit() {
            log::warn!("session {}: exit hook failed: {e}", self.session.id);
        }
    }
}

fn check_host(host: &HostInfo) -> Result<()> {
    if !host.is_linux() {
        return Err(SessionError::UnsupportedHost {
            detail: format!("only Linux hosts are supported, found '{}'", host.os),
        });
    }
    if !host.is_64bit() {
        return Err(SessionError::UnsupportedHost {
            detail: format!(
                "only 64-bit hosts are supported, found {}-bit",
                host.pointer_width
            ),
        });
    }
    Ok(())
}

fn advance(id: Uuid, prev: SessionState, next: SessionState) -> SessionState {
    log::debug!("session {id}: {prev} -> {next}");
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_gate() {
        assert!(check_host(&HostInfo::new("linux", 64)).is_ok());
        assert!(matches!(
            check_host(&HostInfo::new("linux", 32)),
            Err(SessionError::UnsupportedHost { .. })
        ));
        let err = check_host(&HostInfo::new("windows", 64)).unwrap_err();
        assert!(err.to_string().contains("windows"));
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::ChannelOpen.to_string(), "channel-open");
        assert_eq!(SessionState::Entered.to_string(), "entered");
    }
}
