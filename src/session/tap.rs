//! Interception session using macOS CGEventTap
//!
//! The tap is installed at the HID level as an active (non listen-only) tap
//! for flags-changed and key-down events. It runs on a dedicated thread with
//! its own CFRunLoop; the tap, its run loop source and the composer all live
//! on that thread for the whole enabled lifetime.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::base::TCFType;
use core_foundation::mach_port::{CFMachPort, CFMachPortRef};
use core_foundation::runloop::{
    kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopSource,
    CFRunLoopSourceInvalidate,
};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventTapProxy, CGEventType, EventField,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::sys::CGEventRef;
use foreign_types::ForeignType;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::SessionError;
use crate::events::SessionEvent;
use crate::remap::{
    Composer, EventKind, InputEvent, KeyCode, SubstituteKey, SynthesisError, TapProxy,
};

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
    fn CGEventTapIsEnabled(tap: CFMachPortRef) -> bool;
    fn CGEventGetTimestamp(event: CGEventRef) -> u64;
}

/// Owner of the global event tap
///
/// `enable()` installs the tap on a new thread and returns once it is live;
/// `disable()` tears it down. The composer exists only while enabled.
pub struct Session {
    event_tx: mpsc::Sender<SessionEvent>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Create a disabled session reporting to `event_tx`
    pub fn new(event_tx: mpsc::Sender<SessionEvent>, poll_interval: Duration) -> Self {
        Self {
            event_tx,
            poll_interval,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Install and enable the event tap.
    ///
    /// Blocks until the session thread has either armed the tap or failed
    /// to. Any error here means the daemon has nothing to do.
    pub fn enable(&mut self) -> Result<(), SessionError> {
        if self.worker.is_some() {
            return Err(SessionError::AlreadyEnabled);
        }

        self.running.store(true, Ordering::SeqCst);

        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);
        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;

        let spawned = thread::Builder::new()
            .name("tap-session".to_string())
            .spawn(move || {
                debug!("session thread started");
                run_session(event_tx, &running, poll_interval, ready_tx);
                running.store(false, Ordering::SeqCst);
                debug!("session thread stopped");
            });

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(SessionError::ThreadSpawn(e.to_string()));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                info!("interception session enabled");
                Ok(())
            }
            Ok(Err(e)) => {
                join_worker(worker);
                Err(e)
            }
            Err(_) => {
                join_worker(worker);
                Err(SessionError::WorkerExited)
            }
        }
    }

    /// Remove the event tap. Does nothing when already disabled.
    pub fn disable(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.running.store(false, Ordering::SeqCst);
        join_worker(worker);

        info!("interception session disabled");
    }

    /// Whether the tap is installed and its thread is pumping events
    pub fn is_enabled(&self) -> bool {
        self.worker.is_some() && self.running.load(Ordering::SeqCst)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disable();
    }
}

fn join_worker(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        error!("session thread panicked");
    }
}

/// Body of the session thread
fn run_session(
    event_tx: mpsc::Sender<SessionEvent>,
    running: &Arc<AtomicBool>,
    poll_interval: Duration,
    ready_tx: SyncSender<Result<(), SessionError>>,
) {
    let armed = match ArmedTap::install(event_tx.clone(), Arc::clone(running)) {
        Ok(armed) => armed,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    let outcome = armed.pump(running, poll_interval);
    drop(armed);

    if let Err(e) = outcome {
        error!(%e, "interception session lost");
        if event_tx.blocking_send(SessionEvent::Failed(e)).is_err() {
            warn!("supervisor gone, session failure not reported");
        }
    }
}

/// State reachable from the tap callback
struct Dispatch {
    composer: Composer,
    port: Option<CFMachPort>,
    fatal: Option<SessionError>,
}

/// A created, registered and enabled tap. Dropping it removes the tap.
struct ArmedTap {
    tap: CGEventTap<'static>,
    source: CFRunLoopSource,
    run_loop: CFRunLoop,
    dispatch: Rc<RefCell<Dispatch>>,
}

impl ArmedTap {
    fn install(
        event_tx: mpsc::Sender<SessionEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<Self, SessionError> {
        let dispatch = Rc::new(RefCell::new(Dispatch {
            composer: Composer::new(),
            port: None,
            fatal: None,
        }));

        let callback_dispatch = Rc::clone(&dispatch);

        // Runs on every key press on the machine - must be fast and non-blocking
        let callback = move |proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
                             -> Option<CGEvent> {
            on_event(&callback_dispatch, &event_tx, &running, proxy, event_type, event)
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::HID,
            CGEventTapPlacement::TailAppendEventTap,
            CGEventTapOptions::Default,
            vec![CGEventType::FlagsChanged, CGEventType::KeyDown],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap - is Accessibility permission granted?");
            SessionError::TapCreation
        })?;

        let source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| SessionError::RunLoopSource)?;

        let run_loop = CFRunLoop::get_current();
        unsafe {
            run_loop.add_source(&source, kCFRunLoopCommonModes);
        }

        dispatch.borrow_mut().port = Some(tap.mach_port.clone());
        tap.enable();

        info!("event tap created and enabled");

        Ok(Self {
            tap,
            source,
            run_loop,
            dispatch,
        })
    }

    /// Deliver events until the session is disabled or the tap is lost
    fn pump(&self, running: &AtomicBool, slice: Duration) -> Result<(), SessionError> {
        while running.load(Ordering::SeqCst) {
            unsafe {
                CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, slice, true);
            }
        }

        match self.dispatch.borrow_mut().fatal.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ArmedTap {
    fn drop(&mut self) {
        unsafe {
            CGEventTapEnable(self.tap.mach_port.as_concrete_TypeRef(), false);
            self.run_loop.remove_source(&self.source, kCFRunLoopCommonModes);
            CFRunLoopSourceInvalidate(self.source.as_concrete_TypeRef());
        }
        self.dispatch.borrow_mut().port = None;

        info!("event tap removed");
    }
}

/// Handle one delivered event and hand it back to the system unchanged
fn on_event(
    dispatch: &RefCell<Dispatch>,
    event_tx: &mpsc::Sender<SessionEvent>,
    running: &AtomicBool,
    proxy: CGEventTapProxy,
    event_type: CGEventType,
    event: &CGEvent,
) -> Option<CGEvent> {
    if let Ok(mut dispatch) = dispatch.try_borrow_mut() {
        let input = classify(event_type, event);
        let Dispatch {
            composer,
            port,
            fatal,
        } = &mut *dispatch;

        let mut tap_proxy = EventProxy {
            proxy,
            port: port.as_ref(),
            event_tx,
        };

        if let Err(e) = composer.handle(&input, &mut tap_proxy) {
            *fatal = Some(e);
            running.store(false, Ordering::SeqCst);
        }
    }
    Some(event.clone())
}

/// Translate a raw tap event into the composer's view of it
fn classify(event_type: CGEventType, event: &CGEvent) -> InputEvent {
    match event_type {
        // Disable notifications carry no usable timestamp
        CGEventType::TapDisabledByTimeout => InputEvent::invalidated(Duration::ZERO),
        CGEventType::TapDisabledByUserInput => {
            // Secure input; the system turns the tap back on by itself
            warn!("event tap disabled by user input");
            InputEvent::new(EventKind::Other, Duration::ZERO)
        }
        CGEventType::FlagsChanged => InputEvent::flags_changed(
            keycode_of(event),
            event.get_flags().bits(),
            timestamp_of(event),
        ),
        CGEventType::KeyDown => InputEvent::key_down(keycode_of(event), timestamp_of(event)),
        _ => InputEvent::new(EventKind::Other, timestamp_of(event)),
    }
}

fn keycode_of(event: &CGEvent) -> KeyCode {
    event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as KeyCode
}

/// When the event was generated, in nanoseconds since boot
fn timestamp_of(event: &CGEvent) -> Duration {
    Duration::from_nanos(unsafe { CGEventGetTimestamp(event.as_ptr()) })
}

/// The tap proxy of the event being handled, plus what recovery needs
struct EventProxy<'a> {
    proxy: CGEventTapProxy,
    port: Option<&'a CFMachPort>,
    event_tx: &'a mpsc::Sender<SessionEvent>,
}

impl TapProxy for EventProxy<'_> {
    fn synthesize(&mut self, key: SubstituteKey) -> Result<(), SynthesisError> {
        let keycode = key.keycode();
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| SynthesisError::Source)?;

        let keydown = CGEvent::new_keyboard_event(source.clone(), keycode, true)
            .map_err(|_| SynthesisError::Event(keycode))?;
        let keyup = CGEvent::new_keyboard_event(source, keycode, false)
            .map_err(|_| SynthesisError::Event(keycode))?;

        keydown.set_flags(CGEventFlags::CGEventFlagNonCoalesced);
        keyup.set_flags(CGEventFlags::CGEventFlagNonCoalesced);

        keydown.post_from_tap(self.proxy);
        keyup.post_from_tap(self.proxy);

        Ok(())
    }

    fn rearm(&mut self) -> Result<(), SessionError> {
        let port = self.port.ok_or(SessionError::TapMissing)?;

        let enabled = unsafe {
            CGEventTapEnable(port.as_concrete_TypeRef(), true);
            CGEventTapIsEnabled(port.as_concrete_TypeRef())
        };
        if !enabled {
            return Err(SessionError::RearmFailed);
        }

        // Never block inside the tap callback
        if self.event_tx.try_send(SessionEvent::Recovered).is_err() {
            warn!("recovery notification dropped");
        }

        Ok(())
    }
}
