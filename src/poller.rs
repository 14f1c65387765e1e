extern crate chrono;
extern crate std;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config;
use crate::helper;
use crate::render;
use crate::result;
use crate::widget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Arrivals,
    LineStatus,
}

#[derive(Debug)]
pub enum Event {
    Tick(Trigger),
    Notification(helper::Notification),
    Reconfigure(config::Config),
    Shutdown,
}

/// Timer periods in milliseconds, shared with the timer threads so a new config
/// takes effect on their next reschedule.
#[derive(Clone)]
pub struct Intervals {
    arrivals_ms: Arc<AtomicU64>,
    line_status_ms: Arc<AtomicU64>,
}

impl Intervals {
    pub fn new(config: &config::Config) -> Intervals {
        let intervals = Intervals{
            arrivals_ms: Arc::new(AtomicU64::new(0)),
            line_status_ms: Arc::new(AtomicU64::new(0)),
        };
        intervals.update(config);
        return intervals;
    }

    pub fn update(&self, config: &config::Config) {
        self.arrivals_ms.store(config.update_interval.as_millis() as u64, Ordering::SeqCst);
        self.line_status_ms.store(config.status_update_interval.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn get(&self, trigger: Trigger) -> std::time::Duration {
        let ms = match trigger {
            Trigger::Arrivals => self.arrivals_ms.load(Ordering::SeqCst),
            Trigger::LineStatus => self.line_status_ms.load(Ordering::SeqCst),
        };
        return std::time::Duration::from_millis(ms);
    }
}

/// Fires once straight away, then sleeps for the current interval after each tick.
/// Stops when the event loop hangs up.
pub fn spawn_timer(
    trigger: Trigger,
    intervals: Intervals,
    events: std::sync::mpsc::Sender<Event>) -> result::TubeTimesResult<std::thread::JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name(format!("tubetimes-{:?}-timer", trigger).to_lowercase())
        .spawn(move || {
            loop {
                if events.send(Event::Tick(trigger)).is_err() {
                    debug!("{:?} timer stopping", trigger);
                    return;
                }
                std::thread::sleep(intervals.get(trigger));
            }
        })?;
    return Ok(handle);
}

pub struct Poller<C: helper::Collaborator> {
    widget: widget::TubeTimes,
    collaborator: C,
    renderer: Box<dyn render::Renderer>,
    intervals: Intervals,
    state_file: Option<std::path::PathBuf>,
    one_shot: bool,
}

impl<C: helper::Collaborator> Poller<C> {
    pub fn new(
        widget: widget::TubeTimes,
        collaborator: C,
        renderer: Box<dyn render::Renderer>,
        intervals: Intervals) -> Poller<C> {
        return Poller{
            widget: widget,
            collaborator: collaborator,
            renderer: renderer,
            intervals: intervals,
            state_file: None,
            one_shot: false,
        };
    }

    pub fn with_state_file(mut self, state_file: Option<std::path::PathBuf>) -> Poller<C> {
        self.state_file = state_file;
        return self;
    }

    /// Stop after the first arrivals render.
    pub fn with_one_shot(mut self, one_shot: bool) -> Poller<C> {
        self.one_shot = one_shot;
        return self;
    }

    pub fn widget(&self) -> &widget::TubeTimes {
        return &self.widget;
    }

    pub fn run(&mut self, events: std::sync::mpsc::Receiver<Event>) {
        for event in events.iter() {
            if !self.handle(event) {
                break;
            }
        }
        info!("Event loop finished");
    }

    /// Returns false once the loop should stop.
    pub fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Tick(Trigger::Arrivals) => {
                self.collaborator.request(helper::Request::Arrivals(
                    self.widget.arrivals_url().to_string()));
            },
            Event::Tick(Trigger::LineStatus) => {
                self.collaborator.request(helper::Request::LineStatus(
                    self.widget.status_url().to_string()));
            },
            Event::Notification(notification) => {
                let is_arrivals = match notification {
                    helper::Notification::ArrivalsResult{..} => true,
                    _ => false,
                };

                let outcome = self.widget.on_notification(notification);
                if outcome == widget::Outcome::Stale {
                    return true;
                }

                self.persist();
                if outcome == widget::Outcome::Refresh {
                    self.render();
                    if is_arrivals && self.one_shot {
                        return false;
                    }
                }
            },
            Event::Reconfigure(config) => {
                self.widget.reconfigure(config);
                self.intervals.update(self.widget.config());
                info!("Reconfigured: {:?}", self.widget.config());
                self.collaborator.request(helper::Request::Arrivals(
                    self.widget.arrivals_url().to_string()));
                self.collaborator.request(helper::Request::LineStatus(
                    self.widget.status_url().to_string()));
            },
            Event::Shutdown => {
                return false;
            },
        }

        return true;
    }

    fn render(&mut self) {
        let data = self.widget.display_data(chrono::Utc::now());
        if let Err(err) = self.renderer.render(&data) {
            error!("Error rendering: {:?}", err);
        }
    }

    fn persist(&self) {
        if let Some(ref state_file) = self.state_file {
            if let Err(err) = widget::save_state(state_file, self.widget.state()) {
                warn!("Couldn't save state: {:?}", err);
            }
        }
    }
}
