// Performs the HTTP work on the widget's behalf. Every request is fire-and-forget:
// it runs on its own thread and the result comes back as an Event on the loop's
// channel, echoing the URL it was asked for. Failed fetches send nothing.
extern crate std;

use crate::poller;
use crate::tfl;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Arrivals(String),
    LineStatus(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ArrivalsResult {
        url: String,
        result: Option<Vec<tfl::ArrivalPrediction>>,
    },
    LineStatusResult {
        service_url: String,
        snapshot: tfl::LineStatusSnapshot,
    },
}

pub trait Collaborator {
    fn request(&self, request: Request);
}

pub struct FetchHelper {
    events: std::sync::mpsc::Sender<poller::Event>,
    fetch_fn: tfl::FetchFn,
}

impl FetchHelper {
    pub fn new(events: std::sync::mpsc::Sender<poller::Event>, fetch_fn: tfl::FetchFn) -> FetchHelper {
        return FetchHelper{
            events: events,
            fetch_fn: fetch_fn,
        };
    }
}

impl Collaborator for FetchHelper {
    fn request(&self, request: Request) {
        let events = self.events.clone();
        let fetch_fn = self.fetch_fn;

        let spawned = std::thread::Builder::new()
            .name("tubetimes-fetch".to_string())
            .spawn(move || {
                if let Some(notification) = handle_request(&request, fetch_fn) {
                    if events.send(poller::Event::Notification(notification)).is_err() {
                        debug!("Event loop gone, dropping result for {:?}", request);
                    }
                }
            });

        if let Err(err) = spawned {
            error!("Couldn't start fetch thread: {}", err);
        }
    }
}

pub fn handle_request(request: &Request, fetch_fn: tfl::FetchFn) -> Option<Notification> {
    match request {
        Request::Arrivals(url) => {
            debug!("Fetching arrivals from {}", url);
            match tfl::fetch_arrivals(url, fetch_fn) {
                Ok(result) => {
                    return Some(Notification::ArrivalsResult{
                        url: url.clone(),
                        result: result,
                    });
                },
                Err(err) => {
                    error!("Error fetching arrivals: {:?}", err);
                    return None;
                },
            }
        },
        Request::LineStatus(url) => {
            debug!("Fetching line status from {}", url);
            match tfl::fetch_line_status(url, fetch_fn) {
                Ok(snapshot) => {
                    return Some(Notification::LineStatusResult{
                        service_url: url.clone(),
                        snapshot: snapshot,
                    });
                },
                Err(err) => {
                    error!("Error fetching line status: {:?}", err);
                    return None;
                },
            }
        },
    }
}
