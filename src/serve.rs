extern crate chrono;
extern crate pretty_bytes;
extern crate querystring;
extern crate serde_json;
extern crate std;
extern crate tiny_http;

use crate::config;
use crate::poller;
use crate::render;
use crate::result;

pub const VERSION: Option<&'static str> = option_env!("TUBETIMES_VERSION");

type Response = tiny_http::Response<std::io::Cursor<Vec<u8>>>;

pub struct DebugServer {
    view: render::SharedView,
    events: std::sync::mpsc::Sender<poller::Event>,
    log_dir: std::path::PathBuf,
}

impl DebugServer {
    pub fn new(
        view: render::SharedView,
        events: std::sync::mpsc::Sender<poller::Event>,
        log_dir: std::path::PathBuf) -> DebugServer {
        return DebugServer{
            view: view,
            events: events,
            log_dir: log_dir,
        };
    }

    pub fn run(&self, port: u16) -> result::TubeTimesResult<()> {
        let server = tiny_http::Server::http(("0.0.0.0", port))
            .map_err(|err| result::make_error(&format!("Couldn't bind port {}: {}", port, err)))?;

        info!("Running debug HTTP server on port {}", port);
        for mut request in server.incoming_requests() {
            let response = self.route(&mut request);
            if let Err(err) = request.respond(response) {
                warn!("Error responding: {}", err);
            }
        }
        return Ok(());
    }

    fn route(&self, request: &mut tiny_http::Request) -> Response {
        let url = request.url().to_string();
        let path = url.split('?').next().unwrap_or("");
        let method = request.method().clone();

        let response = match (&method, path) {
            (&tiny_http::Method::Get, "/") => self.main_page(),
            (&tiny_http::Method::Get, "/display.json") => self.display_json(),
            (&tiny_http::Method::Get, "/dumplog") => self.dump_log(&url),
            (&tiny_http::Method::Put, "/config") => self.update_config(request),
            (_, _) => Ok(not_found()),
        };

        match response {
            Ok(response) => return response,
            Err(err) => {
                warn!("Error serving {}: {:?}", url, err);
                return tiny_http::Response::from_string(format!("{}", err)).with_status_code(500);
            },
        }
    }

    fn main_page(&self) -> result::TubeTimesResult<Response> {
        let mut body = format!("<html><body><h1>Tube Times Debug Server</h1><div>Version {}</div>",
                               VERSION.unwrap_or("[unknown]"));

        body.push_str("<div><h2>Current view</h2>");
        match self.view.latest() {
            Some(data) => body.push_str(&render::render_html(&data, chrono::Utc::now())),
            None => body.push_str("<p>Nothing rendered yet</p>"),
        }
        body.push_str("</div>");

        body.push_str("<div><h2>Log files</h2><ul>");
        for entry in std::fs::read_dir(&self.log_dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if filename.ends_with(".log") {
                body.push_str(&format!("<li><a href='/dumplog?log={}'>{}</a> [{}]</li>",
                                       filename, filename,
                                       pretty_bytes::converter::convert(entry.metadata()?.len() as f64)));
            }
        }
        body.push_str("</ul></div>");

        body.push_str("</body></html>");

        return Ok(with_content_type(tiny_http::Response::from_string(body), "text/html; charset=utf-8"));
    }

    fn display_json(&self) -> result::TubeTimesResult<Response> {
        match self.view.latest() {
            None => return Ok(not_found()),
            Some(data) => {
                let body = serde_json::to_string(&data)?;
                return Ok(with_content_type(tiny_http::Response::from_string(body), "application/json"));
            },
        }
    }

    fn dump_log(&self, url: &str) -> result::TubeTimesResult<Response> {
        match which_log(url) {
            None => return Ok(not_found()),
            Some(filename) => {
                let contents = std::fs::read_to_string(self.log_dir.join(filename))?;
                return Ok(with_content_type(tiny_http::Response::from_string(contents), "text/plain; charset=utf-8"));
            },
        }
    }

    fn update_config(&self, request: &mut tiny_http::Request) -> result::TubeTimesResult<Response> {
        let mut body = String::new();
        request.as_reader().read_to_string(&mut body)?;

        let config = match config::config_from_str(&body) {
            Ok(config) => config,
            Err(err) => {
                return Ok(tiny_http::Response::from_string(format!("{:?}", err)).with_status_code(400));
            },
        };

        self.events.send(poller::Event::Reconfigure(config))
            .map_err(|_| result::make_error("event loop is gone"))?;
        return Ok(tiny_http::Response::from_string("ok"));
    }
}

fn not_found() -> Response {
    return with_content_type(
        tiny_http::Response::from_string("<h1>404</h1><p>Not found!<p>"),
        "text/html; charset=utf-8")
        .with_status_code(404);
}

fn with_content_type(response: Response, content_type: &str) -> Response {
    match tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        Ok(header) => return response.with_header(header),
        Err(_) => return response,
    }
}

// Only bare "*.log" names: nothing outside the log directory.
fn which_log(url: &str) -> Option<String> {
    let query = url.splitn(2, '?').nth(1)?;

    let params = querystring::querify(query);

    for (k, v) in params {
        if k == "log" && v.ends_with(".log") && !v.contains('/') && !v.contains('\\') && !v.starts_with('.') {
            return Some(v.to_string());
        }
    }

    return None;
}
