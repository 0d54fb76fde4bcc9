use std::sync::atomic::{AtomicBool, Ordering};

/// Set on the first SIGINT/SIGTERM. Handed to the scheduler, which stops
/// polling once it is raised; a fire already under way runs to completion.
pub static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Install the handlers. A second signal falls through to the default
/// disposition and terminates the process.
pub fn install_signal_handlers() {
    #[cfg(unix)]
    {
        let handler = on_unix_signal as *const () as libc::sighandler_t;
        // Safety: the handler only stores to an atomic and resets its disposition.
        unsafe {
            libc::signal(libc::SIGINT, handler);
            libc::signal(libc::SIGTERM, handler);
        }
    }

    #[cfg(windows)]
    {
        // Safety: registers a handler that only stores to an atomic.
        unsafe {
            windows_sys::Win32::System::Console::SetConsoleCtrlHandler(Some(on_console_event), 1);
        }
    }
}

#[cfg(unix)]
extern "C" fn on_unix_signal(sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
    }
}

#[cfg(windows)]
unsafe extern "system" fn on_console_event(ctrl_type: u32) -> i32 {
    // CTRL_C_EVENT, CTRL_BREAK_EVENT, CTRL_CLOSE_EVENT
    if ctrl_type > 2 {
        return 0;
    }
    SHUTDOWN.store(true, Ordering::SeqCst);
    windows_sys::Win32::System::Console::SetConsoleCtrlHandler(Some(on_console_event), 0);
    1
}
