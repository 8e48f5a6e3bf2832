//! Chaining into the process panic hook.

use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, Once};

use crate::Session;

type Hook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// The hook that was active before [`install_panic_hook`].
///
/// Dropping the guard leaves the pov hook installed; call
/// [`PanicHookGuard::restore`] to put the previous one back.
pub struct PanicHookGuard {
    previous: Arc<Hook>,
}

/// Install a panic hook that reports the panic through `session` and then
/// hands over to whatever hook was installed before.
pub fn install_panic_hook(session: &'static Session) -> PanicHookGuard {
    let previous: Arc<Hook> = Arc::new(panic::take_hook());
    let chained = Arc::clone(&previous);
    panic::set_hook(Box::new(move |info| {
        session.report_panic(info);
        chained(info);
    }));
    tracing::debug!("pov panic hook installed");
    PanicHookGuard { previous }
}

impl PanicHookGuard {
    /// Reinstate the hook that was active before installation.
    ///
    /// Any hook installed on top of the pov hook in the meantime is dropped
    /// as well.
    pub fn restore(self) {
        // Dropping the pov hook releases its clone of `previous`.
        drop(panic::take_hook());
        match Arc::try_unwrap(self.previous) {
            Ok(hook) => panic::set_hook(hook),
            Err(shared) => panic::set_hook(Box::new(move |info| shared(info))),
        }
        tracing::debug!("pov panic hook removed");
    }
}

impl core::fmt::Debug for PanicHookGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PanicHookGuard").finish_non_exhaustive()
    }
}

/// Set up the global session and, unless keep-native-exception-hook is set,
/// chain its panic hook. Calling it again only returns the session.
pub fn init() -> &'static Session {
    static HOOK: Once = Once::new();

    let session = Session::global();
    if !session.keeps_native_panic_hook() {
        HOOK.call_once(|| {
            let _guard = install_panic_hook(session);
        });
    }
    session
}
