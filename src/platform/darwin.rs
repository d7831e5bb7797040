//! System notification bus (macOS `notify(3)`)
//!
//! All registrations share one file descriptor (`NOTIFY_REUSE`). notifyd
//! writes the 32-bit token of each fired registration to that descriptor in
//! network byte order; a reader thread decodes tokens back to names and hands
//! them to the delivery sink. When the last registration is cancelled the
//! library closes the descriptor and the next registration opens a fresh one
//! with a new reader. Each reader carries the generation it was spawned for,
//! so a reader left blocked on a closed descriptor whose number was reused
//! hands over at most one token and exits.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::mem::ManuallyDrop;
use std::os::unix::io::FromRawFd;
use std::sync::Arc;
use std::thread;

use libc::{c_char, c_int};
use log::{debug, error, trace, warn};
use parking_lot::Mutex;

use crate::notify::bridge::DeliverySink;
use crate::notify::error::{NotifyError, NotifyResult};
use crate::platform::{NotifyPlatform, NotifyStatus, ObservationHandle};

const NOTIFY_REUSE: c_int = 0x0000_0001;

extern "C" {
    fn notify_post(name: *const c_char) -> u32;
    fn notify_register_file_descriptor(
        name: *const c_char,
        notify_fd: *mut c_int,
        flags: c_int,
        out_token: *mut c_int,
    ) -> u32;
    fn notify_cancel(token: c_int) -> u32;
    fn notify_suspend(token: c_int) -> u32;
    fn notify_resume(token: c_int) -> u32;
    fn notify_set_state(token: c_int, state64: u64) -> u32;
    fn notify_get_state(token: c_int, state64: *mut u64) -> u32;
}

#[derive(Default)]
struct DarwinState {
    fd: Option<c_int>,
    generation: u64,
    tokens: HashMap<c_int, String>,
    sink: Option<DeliverySink>,
}

pub struct DarwinPlatform {
    shared: Arc<Mutex<DarwinState>>,
}

fn check(operation: &str, code: u32) -> NotifyResult<()> {
    let status = NotifyStatus::from_code(code);
    if status.is_ok() {
        Ok(())
    } else {
        Err(NotifyError::platform(operation, status))
    }
}

fn c_name(operation: &str, name: &str) -> NotifyResult<CString> {
    CString::new(name).map_err(|_| NotifyError::platform(operation, NotifyStatus::InvalidName))
}

impl DarwinPlatform {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(DarwinState::default())),
        }
    }

    fn spawn_reader(&self, fd: c_int, generation: u64) -> NotifyResult<()> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("sysnotify-notifyd".to_string())
            .spawn(move || Self::read_tokens(fd, generation, shared))
            .map(|_| ())
            .map_err(|e| NotifyError::Dispatcher(format!("Failed to spawn notify reader: {}", e)))
    }

    fn read_tokens(fd: c_int, generation: u64, shared: Arc<Mutex<DarwinState>>) {
        // The descriptor belongs to libnotify; never close it from here.
        let mut file = ManuallyDrop::new(unsafe { File::from_raw_fd(fd) });
        let mut buf = [0u8; 4];

        loop {
            if let Err(e) = file.read_exact(&mut buf) {
                debug!("notify descriptor {} closed: {}", fd, e);
                break;
            }
            let token = c_int::from_be_bytes(buf);

            let (target, stale) = {
                let state = shared.lock();
                if state.fd != Some(fd) {
                    break;
                }
                let target = match (state.tokens.get(&token), state.sink.as_ref()) {
                    (Some(name), Some(sink)) => Some((name.clone(), sink.clone())),
                    _ => None,
                };
                (target, state.generation != generation)
            };

            match target {
                Some((name, sink)) => {
                    if !sink.deliver(&name) {
                        warn!("Delivery sink closed; dropping '{}'", name);
                    }
                }
                None => trace!("Ignoring delivery for unknown token {}", token),
            }

            // The descriptor number now belongs to a newer reader
            if stale {
                debug!("Reader generation {} retired on reused descriptor {}", generation, fd);
                break;
            }
        }
    }
}

impl Default for DarwinPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyPlatform for DarwinPlatform {
    fn attach(&self, sink: DeliverySink) {
        self.shared.lock().sink = Some(sink);
    }

    fn register(&self, name: &str) -> NotifyResult<ObservationHandle> {
        let c_name = c_name("register", name)?;
        let mut state = self.shared.lock();

        let (mut fd, flags) = match state.fd {
            Some(fd) => (fd, NOTIFY_REUSE),
            None => (-1, 0),
        };
        let mut token: c_int = -1;
        let code = unsafe { notify_register_file_descriptor(c_name.as_ptr(), &mut fd, flags, &mut token) };
        check("register", code)?;

        if state.fd.is_none() {
            state.fd = Some(fd);
            state.generation += 1;
            self.spawn_reader(fd, state.generation)?;
        }
        state.tokens.insert(token, name.to_string());
        debug!("Registered '{}' with notifyd as token {}", name, token);
        Ok(ObservationHandle::new(token, name))
    }

    fn unregister(&self, handle: ObservationHandle) -> NotifyResult<()> {
        let mut state = self.shared.lock();
        let code = unsafe { notify_cancel(handle.token()) };
        state.tokens.remove(&handle.token());
        if state.tokens.is_empty() {
            state.fd = None;
        }
        check("unregister", code)
    }

    fn suspend(&self, handle: &ObservationHandle) -> NotifyResult<()> {
        check("suspend", unsafe { notify_suspend(handle.token()) })
    }

    fn resume(&self, handle: &ObservationHandle) -> NotifyResult<()> {
        check("resume", unsafe { notify_resume(handle.token()) })
    }

    fn post(&self, name: &str) -> NotifyStatus {
        match CString::new(name) {
            Ok(c_name) => NotifyStatus::from_code(unsafe { notify_post(c_name.as_ptr()) }),
            Err(_) => NotifyStatus::InvalidName,
        }
    }

    fn set_state(&self, handle: &ObservationHandle, value: i64) -> NotifyResult<()> {
        check("set_state", unsafe { notify_set_state(handle.token(), value as u64) })
    }

    fn get_state(&self, handle: &ObservationHandle) -> NotifyResult<i64> {
        let mut value: u64 = 0;
        check("get_state", unsafe { notify_get_state(handle.token(), &mut value) })?;
        Ok(value as i64)
    }

    fn platform_name(&self) -> &str {
        "notifyd"
    }
}

impl Drop for DarwinPlatform {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        for (token, name) in state.tokens.drain() {
            let status = NotifyStatus::from_code(unsafe { notify_cancel(token) });
            if !status.is_ok() {
                error!("Failed to cancel '{}' (token {}): {}", name, token, status);
            }
        }
        state.fd = None;
        state.sink = None;
    }
}
