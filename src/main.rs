extern crate anyhow;
extern crate chrono;
extern crate chrono_tz;
extern crate flexi_logger;
extern crate getopts;
#[macro_use]
extern crate log;
extern crate reqwest;
#[macro_use]
extern crate serde_derive;

mod config;
mod format;
mod helper;
mod poller;
mod render;
mod result;
mod serve;
mod tfl;
mod widget;

fn options() -> getopts::Options {
    let mut opts = getopts::Options::new();
    opts.optopt("c", "config", "JSON config file.", "FILENAME");
    opts.optopt("", "title", "Label shown above the arrivals.", "TITLE");
    opts.optopt("l", "line", "TfL line id(s), comma separated.", "LINE");
    opts.optopt("s", "stop", "TfL stop point id.", "STOP");
    opts.optopt("d", "direction", "all, inbound or outbound.", "DIRECTION");
    opts.optopt("n", "limit", "Maximum arrivals to show.", "N");
    opts.optopt("", "state-file", "Where to keep the last known data across restarts.", "FILENAME");
    opts.optopt("p", "serve", "Run the debug HTTP server on this port.", "PORT");
    opts.optopt("", "log-dir", "Directory for log files.", "DIR");
    opts.optopt("", "log-level", "Log spec, e.g. info or debug.", "LEVEL");
    opts.optflag("o", "one-shot", "Exit after the first arrivals are shown.");
    opts.optflag("q", "quiet", "Don't print the view to stdout.");
    opts.optflag("h", "help", "Print this help.");
    return opts;
}

fn build_config(matches: &getopts::Matches) -> result::TubeTimesResult<config::Config> {
    let mut config = match matches.opt_str("config") {
        Some(path) => config::config_from_file(path)?,
        None => config::Config::default(),
    };

    if let Some(title) = matches.opt_str("title") {
        config.title = title;
    }
    if let Some(line) = matches.opt_str("line") {
        config.line_id = line;
    }
    if let Some(stop) = matches.opt_str("stop") {
        config.stop_point_id = stop;
    }
    if let Some(direction) = matches.opt_str("direction") {
        config.direction = direction.parse()?;
    }
    if let Some(limit) = matches.opt_str("limit") {
        config.limit = Some(limit.trim().parse::<i64>()?);
    }

    return Ok(config);
}

fn initial_state(state_file: Option<&std::path::PathBuf>) -> widget::DisplayState {
    let state_file = match state_file {
        Some(state_file) => state_file,
        None => return widget::DisplayState::default(),
    };

    match widget::load_state(state_file) {
        Ok(Some(state)) => {
            info!("Restored state from {:?}", state_file);
            return state;
        },
        Ok(None) => return widget::DisplayState::default(),
        Err(err) => {
            warn!("Ignoring unreadable state file: {:?}", err);
            return widget::DisplayState::default();
        },
    }
}

fn run() -> result::TubeTimesResult<()> {
    let args: Vec<String> = std::env::args().collect();
    let opts = options();
    let matches = opts.parse(&args[1..])?;

    if matches.opt_present("help") {
        print!("{}", opts.usage(&format!("Usage: {} [options]", args[0])));
        return Ok(());
    }

    let log_dir = std::path::PathBuf::from(matches.opt_str("log-dir").unwrap_or("./".to_string()));
    let log_spec = matches.opt_str("log-level").unwrap_or("info".to_string());
    let _logger = flexi_logger::Logger::try_with_env_or_str(&log_spec)?
        .log_to_file(flexi_logger::FileSpec::default().directory(log_dir.clone()))
        .duplicate_to_stderr(flexi_logger::Duplicate::Warn)
        .start()?;

    let result = run_with_logging(&matches, log_dir);
    if let Err(ref err) = result {
        error!("{:?}", err);
    }
    return result;
}

fn run_with_logging(matches: &getopts::Matches, log_dir: std::path::PathBuf) -> result::TubeTimesResult<()> {
    let config = build_config(matches)?;
    let one_shot = matches.opt_present("one-shot");
    let state_file = matches.opt_str("state-file").map(std::path::PathBuf::from);

    info!("Running. version={} one-shot={} config={:?}",
          serve::VERSION.unwrap_or("[unknown]"), one_shot, config);

    let widget = widget::TubeTimes::with_state(config, initial_state(state_file.as_ref()));
    let (events_tx, events_rx) = std::sync::mpsc::channel();

    let mut renderers: Vec<Box<dyn render::Renderer>> = vec![];
    if !matches.opt_present("quiet") {
        renderers.push(Box::new(render::ConsoleRenderer{}));
    }

    if let Some(port) = matches.opt_str("serve") {
        let port: u16 = port.trim().parse()?;
        let view = render::SharedView::default();
        renderers.push(Box::new(view.clone()));

        let server = serve::DebugServer::new(view, events_tx.clone(), log_dir.clone());
        std::thread::Builder::new()
            .name("tubetimes-debug-server".to_string())
            .spawn(move || {
                if let Err(err) = server.run(port) {
                    error!("Debug server stopped: {:?}", err);
                }
            })?;
    }

    let intervals = poller::Intervals::new(widget.config());
    let fetch_helper = helper::FetchHelper::new(events_tx.clone(), tfl::real_fetch);
    let mut event_loop = poller::Poller::new(
        widget, fetch_helper, Box::new(render::FanOut::new(renderers)), intervals.clone())
        .with_state_file(state_file)
        .with_one_shot(one_shot);

    poller::spawn_timer(poller::Trigger::Arrivals, intervals.clone(), events_tx.clone())?;
    poller::spawn_timer(poller::Trigger::LineStatus, intervals, events_tx)?;

    event_loop.run(events_rx);
    info!("Exiting. loaded={}", event_loop.widget().state().loaded);
    return Ok(());
}

fn main() {
    match run() {
        Ok(()) => {},
        Err(err) => {
            eprintln!("{:?}", err);
            std::process::exit(1);
        },
    }
}
