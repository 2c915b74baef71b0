//! Sound-server event monitor for the `pactl` backend
//!
//! A long-lived `pactl subscribe` child reports terse lines such as
//! `Event 'change' on sink #53`. A reader thread turns them into
//! [`AudioEvent`]s: sink additions and removals become device-list changes,
//! sink changes are re-queried and diffed against a cache to tell renames
//! from volume moves, and server changes are checked for a new default sink.

use super::pulse_backend::{Pactl, SinkInfo};
use super::registry::Registry;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use volguard_core::domain::audio::{AudioError, AudioEvent, DeviceId, EventKind, Result, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    New,
    Change,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facility {
    Sink,
    Server,
    Other,
}

/// One parsed `pactl subscribe` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerEvent {
    pub change: Change,
    pub facility: Facility,
    pub index: u32,
}

/// Parse `Event '<change>' on <facility> #<index>`
pub fn parse_event_line(line: &str) -> Option<ServerEvent> {
    let rest = line.trim().strip_prefix("Event '")?;
    let (change, rest) = rest.split_once('\'')?;
    let rest = rest.trim_start().strip_prefix("on ")?;
    let (facility, index) = rest.rsplit_once(" #")?;

    let change = match change {
        "new" => Change::New,
        "change" => Change::Change,
        "remove" => Change::Remove,
        _ => return None,
    };
    let facility = match facility.trim() {
        "sink" => Facility::Sink,
        "server" => Facility::Server,
        _ => Facility::Other,
    };

    Some(ServerEvent {
        change,
        facility,
        index: index.trim().parse().ok()?,
    })
}

/// Events implied by a sink moving from `old` to `new`
///
/// A changed description is a rename. Any changed channel reports the master
/// control plus each channel that moved.
pub fn diff_sink(old: &SinkInfo, new: &SinkInfo) -> Vec<AudioEvent> {
    let mut events = Vec::new();
    let device = DeviceId::new(new.name.clone());

    if old.description != new.description {
        events.push(AudioEvent::NameChanged {
            device: new.device_info(),
        });
    }

    let moved: Vec<u32> = if old.channels.len() == new.channels.len() {
        old.channels
            .iter()
            .zip(&new.channels)
            .enumerate()
            .filter(|(_, (before, after))| before != after)
            .map(|(i, _)| i as u32 + 1)
            .collect()
    } else {
        (1..=new.channels.len() as u32).collect()
    };

    if !moved.is_empty() {
        for channel in std::iter::once(0).chain(moved) {
            events.push(AudioEvent::VolumeChanged {
                device: device.clone(),
                channel,
                scope: Scope::Output,
            });
        }
    }

    events
}

/// Cached server state the reader thread diffs against
struct Tracker {
    pactl: Pactl,
    registry: Arc<Registry>,
    sinks: HashMap<u32, SinkInfo>,
    default_sink: Option<String>,
}

impl Tracker {
    fn on_event(&mut self, event: ServerEvent) {
        match (event.facility, event.change) {
            (Facility::Sink, Change::New | Change::Remove) => {
                self.refresh_sinks();
                self.registry.dispatch(AudioEvent::DeviceListChanged);
            }
            (Facility::Sink, Change::Change) => self.on_sink_changed(event.index),
            (Facility::Server, _) => self.on_server_changed(),
            (Facility::Other, _) => {}
        }
    }

    /// Catch up after events may have been missed: report every sink that
    /// changed meanwhile, the device list and the default sink
    fn resync(&mut self) {
        let sinks = match self.pactl.sinks() {
            Ok(sinks) => sinks,
            Err(e) => {
                warn!(error = %e, "Failed to resync sink list");
                return;
            }
        };

        let mut events = Vec::new();
        for sink in &sinks {
            if let Some(old) = self.sinks.get(&sink.index) {
                events.extend(diff_sink(old, sink));
            }
        }
        self.sinks = sinks.into_iter().map(|s| (s.index, s)).collect();

        self.registry.dispatch(AudioEvent::DeviceListChanged);
        for event in events {
            self.registry.dispatch(event);
        }
        self.on_server_changed();
    }

    fn refresh_sinks(&mut self) {
        match self.pactl.sinks() {
            Ok(sinks) => self.sinks = sinks.into_iter().map(|s| (s.index, s)).collect(),
            Err(e) => warn!(error = %e, "Failed to refresh sink list"),
        }
    }

    fn on_sink_changed(&mut self, index: u32) {
        let sink = match self.pactl.sinks() {
            Ok(sinks) => sinks.into_iter().find(|s| s.index == index),
            Err(e) => {
                warn!(index, error = %e, "Failed to query changed sink");
                return;
            }
        };
        let Some(sink) = sink else {
            debug!(index, "Changed sink already gone");
            return;
        };

        let events = match self.sinks.get(&index) {
            Some(old) => diff_sink(old, &sink),
            None => Vec::new(),
        };
        self.sinks.insert(index, sink);

        for event in events {
            self.registry.dispatch(event);
        }
    }

    fn on_server_changed(&mut self) {
        if !self.registry.wants(EventKind::DefaultOutputDeviceChanged) {
            return;
        }
        match self.pactl.default_sink_name() {
            Ok(name) if name != self.default_sink => {
                debug!(default = ?name, "Default sink changed");
                self.default_sink = name;
                self.registry.dispatch(AudioEvent::DefaultOutputChanged);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to read default sink"),
        }
    }
}

/// Delay before the first restart of a dead `pactl subscribe`
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Upper bound for the restart delay
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// A child that lived this long is considered healthy again
const HEALTHY_RUN: Duration = Duration::from_secs(60);

fn spawn_subscribe(pactl: &Pactl) -> Result<(Child, ChildStdout)> {
    let mut child = pactl
        .command()
        .arg("subscribe")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| AudioError::Backend(format!("Failed to start pactl subscribe: {}", e)))?;

    match child.stdout.take() {
        Some(stdout) => Ok((child, stdout)),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(AudioError::Backend("pactl subscribe has no stdout".to_string()))
        }
    }
}

#[derive(Default)]
struct MonitorState {
    child: Mutex<Option<Child>>,
    stopping: AtomicBool,
}

impl MonitorState {
    fn child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `child` over for killing on drop; false if already stopping
    fn adopt(&self, mut child: Child) -> bool {
        let mut slot = self.child();
        if self.stopping.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            return false;
        }
        *slot = Some(child);
        true
    }

    fn reap(&self) {
        let child = self.child().take();
        if let Some(mut child) = child {
            let _ = child.wait();
        }
    }
}

/// Keeps a `pactl subscribe` child running, restarting it with backoff when
/// the sound server goes away; the child is killed on drop
pub struct Monitor {
    state: Arc<MonitorState>,
}

impl Monitor {
    pub fn spawn(
        pactl: Pactl,
        registry: Arc<Registry>,
        sinks: Vec<SinkInfo>,
        default_sink: Option<String>,
    ) -> Result<Self> {
        let (child, stdout) = spawn_subscribe(&pactl)?;
        let state = Arc::new(MonitorState::default());
        state.adopt(child);

        let mut tracker = Tracker {
            pactl,
            registry,
            sinks: sinks.into_iter().map(|s| (s.index, s)).collect(),
            default_sink,
        };

        let thread_state = Arc::clone(&state);
        thread::Builder::new()
            .name("pactl-subscribe".to_string())
            .spawn(move || supervise(&mut tracker, &thread_state, stdout))
            .map_err(|e| AudioError::Backend(format!("Failed to spawn monitor thread: {}", e)))?;

        Ok(Self { state })
    }
}

fn read_events(tracker: &mut Tracker, stdout: ChildStdout) {
    for line in BufReader::new(stdout).lines() {
        match line {
            Ok(line) => {
                if let Some(event) = parse_event_line(&line) {
                    tracker.on_event(event);
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read pactl subscribe output");
                break;
            }
        }
    }
}

fn supervise(tracker: &mut Tracker, state: &MonitorState, stdout: ChildStdout) {
    let mut stdout = Some(stdout);
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if let Some(stdout) = stdout.take() {
            let started = Instant::now();
            read_events(tracker, stdout);
            state.reap();
            if started.elapsed() >= HEALTHY_RUN {
                backoff = INITIAL_BACKOFF;
            }
        }

        if state.stopping.load(Ordering::SeqCst) {
            debug!("Monitor stopped");
            return;
        }

        warn!(
            retry_in_ms = backoff.as_millis() as u64,
            "pactl subscribe exited, devices are unprotected until it restarts"
        );
        thread::sleep(backoff);
        backoff = (backoff * 2).min(MAX_BACKOFF);

        match spawn_subscribe(&tracker.pactl) {
            Ok((child, out)) => {
                if !state.adopt(child) {
                    return;
                }
                info!("pactl subscribe restarted");
                tracker.resync();
                stdout = Some(out);
            }
            Err(e) => error!(error = %e, "Failed to restart pactl subscribe"),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.state.stopping.store(true, Ordering::SeqCst);
        let child = self.state.child().take();
        if let Some(mut child) = child {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
