use std::sync::Arc;

use tracing::{debug, warn};

use vcuda_protocol::{CudaStatus, Reply, RoutineId, WireBuffer};

use crate::error::{DispatchError, RoutineError};
use crate::routines::{self, RoutineContext, RoutineFn};
use crate::runtime::NativeRuntime;
use crate::session::Session;

/// Routes `(routine id, payload)` requests to their handlers.
pub struct Dispatcher {
    runtime: Arc<dyn NativeRuntime>,
}

impl Dispatcher {
    pub fn new(runtime: Arc<dyn NativeRuntime>) -> Self {
        Self { runtime }
    }

    /// The handler for each routine.
    pub fn handler(routine: RoutineId) -> RoutineFn {
        match routine {
            RoutineId::RegisterModule => routines::register_module,
            RoutineId::UnregisterModule => routines::unregister_module,
            RoutineId::RegisterFunction => routines::register_function,
            RoutineId::RegisterVariable => routines::register_variable,
            RoutineId::RegisterSharedVariable => routines::register_shared_variable,
            RoutineId::RegisterShared => routines::register_shared,
            RoutineId::RegisterTexture => routines::register_texture,
        }
    }

    /// Handle one request for `session`.
    ///
    /// Handle, duplicate and runtime failures come back as a failed [`Reply`].
    /// An `Err` means the request stream is corrupt and the session should end.
    pub fn dispatch(
        &self,
        session: &Session,
        routine_id: u32,
        payload: &[u8],
    ) -> Result<Reply, DispatchError> {
        let routine =
            RoutineId::try_from(routine_id).map_err(DispatchError::UnknownRoutine)?;
        let handler = Self::handler(routine);

        let mut registry = session.registry();
        let mut ctx = RoutineContext {
            session_id: session.session_id,
            registry: &mut *registry,
            runtime: self.runtime.as_ref(),
        };
        let mut input = WireBuffer::new(payload);

        match handler(&mut ctx, &mut input) {
            Ok(output) => Ok(Reply::success(output)),
            Err(RoutineError::Malformed(source)) => Err(DispatchError::Malformed { routine, source }),
            Err(e) => {
                let status = e.status().unwrap_or(CudaStatus::UNKNOWN);
                debug!(
                    session_id = session.session_id,
                    %routine,
                    %status,
                    "routine failed: {}", e
                );
                Ok(Reply::failure(status))
            }
        }
    }

    /// Unregister every module `session` still holds. Returns how many were
    /// released; failures are logged and the module is left in place.
    pub fn release_session(&self, session: &Session) -> usize {
        let mut registry = session.registry();
        let handles = registry.module_handles();
        if handles.is_empty() {
            return 0;
        }

        let mut ctx = RoutineContext {
            session_id: session.session_id,
            registry: &mut *registry,
            runtime: self.runtime.as_ref(),
        };
        let mut released = 0;
        for handle in &handles {
            match routines::release_module(&mut ctx, handle) {
                Ok(()) => released += 1,
                Err(e) => warn!(
                    session_id = session.session_id,
                    module = %handle,
                    "failed to release module: {}", e
                ),
            }
        }
        released
    }
}
