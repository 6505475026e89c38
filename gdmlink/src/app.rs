//! The polling loop: owns the transport, the session and the recovery policy and applies
//! operator commands between protocol steps.
use std::path::PathBuf;
use std::time::Duration;

use gdmlink_protocol::ProtocolError;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;

use crate::discovery::Discover;
use crate::publish::Publisher;
use crate::recovery::Recovery;
use crate::session::Session;
use crate::transport::{SerialParams, Transport};
use crate::{DecodedMeasurement, Error, Mode, Timing};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Render {
    Text,
    Json,
    Quiet,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Fixed device path. Probes the usual serial ports if not set.
    pub device: Option<String>,
    pub params: SerialParams,
    /// Pause after each cycle
    pub interval: Duration,
    /// Continuity threshold in ohms, replacing the one configured on the meter
    pub threshold: Option<i64>,
    pub output: Option<PathBuf>,
    pub render: Render,
    pub timing: Timing,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: None,
            params: SerialParams::default(),
            interval: Duration::from_millis(100),
            threshold: None,
            output: None,
            render: Render::Text,
            timing: Timing::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Override(Mode),
    TogglePause,
    Quit,
}

impl Command {
    /// Map an operator key press.
    pub fn from_key(key: char) -> Option<Command> {
        let cmd = match key {
            'r' => Command::Override(Mode::Resistance),
            'v' => Command::Override(Mode::VoltDc),
            'c' => Command::Override(Mode::Continuity),
            'd' => Command::Override(Mode::Diode),
            'u' => Command::Override(Mode::Capacitance),
            'f' => Command::Override(Mode::Frequency),
            'p' => Command::TogglePause,
            'q' => Command::Quit,
            _ => return None,
        };
        Some(cmd)
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    Stepped,
    Measured(DecodedMeasurement),
    Aborted(Error),
    Reacquired,
    ReacquireFailed,
    Paused,
}

pub struct App {
    config: Config,
    session: Session,
    recovery: Recovery,
    transport: Option<Box<dyn Transport>>,
    discover: Box<dyn Discover>,
    publisher: Option<Publisher>,
    paused: bool,
}

impl App {
    pub fn new(config: Config, discover: Box<dyn Discover>) -> Self {
        let session = Session::new(&config.timing).with_threshold(config.threshold);
        let recovery = Recovery::new(config.timing.backoff);
        let publisher = config.output.as_ref().map(Publisher::new);
        App {
            config,
            session,
            recovery,
            transport: None,
            discover,
            publisher,
            paused: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Perform one unit of work: a single protocol step, or a reacquisition of the meter.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.paused {
            return TickOutcome::Paused;
        }
        let open = self.transport.as_ref().map_or(false, |x| x.is_open());
        if !open || self.recovery.should_reacquire() {
            return match self.recovery.reacquire(&mut self.transport, self.discover.as_mut()).await {
                Ok(()) => {
                    self.session.reset();
                    TickOutcome::Reacquired
                }
                Err(_) => TickOutcome::ReacquireFailed,
            };
        }
        let transport = match self.transport.as_mut() {
            Some(x) => x,
            None => return TickOutcome::ReacquireFailed,
        };
        match self.session.step(transport.as_mut()).await {
            Ok(Some(measurement)) => {
                self.recovery.record_success();
                self.publish(&measurement);
                TickOutcome::Measured(measurement)
            }
            Ok(None) => TickOutcome::Stepped,
            Err(err) => {
                self.handle_error(&err);
                TickOutcome::Aborted(err)
            }
        }
    }

    fn publish(&self, measurement: &DecodedMeasurement) {
        if let Some(publisher) = &self.publisher {
            match publisher.publish(measurement) {
                Ok(true) => {}
                Ok(false) => log::debug!("{} not consumed yet", publisher.path().display()),
                Err(err) => log::warn!("{}", err),
            }
        }
    }

    fn handle_error(&mut self, err: &Error) {
        match err {
            Error::Protocol(ProtocolError::Timeout) => {
                log::debug!("Timeout in cycle");
                self.recovery.record_failure();
            }
            Error::Protocol(ProtocolError::UnknownMode(token)) => {
                log::warn!("Meter reports unsupported function {:?}", token);
            }
            err if err.is_fatal() => {
                log::error!("Transport failed: {}", err);
                if let Some(mut transport) = self.transport.take() {
                    transport.close();
                }
                self.session.reset();
            }
            err => log::warn!("{}", err),
        }
    }

    /// Apply an operator command. Returns `false` once the loop should end.
    pub async fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Override(mode) => {
                if self.paused {
                    log::info!("Paused, ignoring switch to {}", mode.label());
                    return true;
                }
                if let Some(transport) = self.transport.as_mut() {
                    if let Err(err) = self.session.inject(transport.as_mut(), mode).await {
                        self.handle_error(&err);
                    }
                }
                true
            }
            Command::TogglePause => {
                self.paused = !self.paused;
                if self.paused {
                    log::info!("Paused");
                    self.release().await;
                } else {
                    log::info!("Resumed");
                    self.session.reset();
                }
                true
            }
            Command::Quit => {
                self.release().await;
                false
            }
        }
    }

    async fn release(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            if let Err(err) = self.session.release(transport.as_mut()).await {
                self.handle_error(&err);
            }
        }
    }

    /// Poll until a `Quit` command arrives or all command senders are gone.
    pub async fn run<F: FnMut(&DecodedMeasurement)>(&mut self, mut commands: UnboundedReceiver<Command>, mut sink: F) {
        loop {
            loop {
                match commands.try_recv() {
                    Ok(cmd) => {
                        if !self.handle(cmd).await {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.release().await;
                        return;
                    }
                }
            }
            match self.tick().await {
                TickOutcome::Measured(measurement) => {
                    sink(&measurement);
                    time::sleep(self.config.interval).await;
                }
                TickOutcome::Aborted(_) => time::sleep(self.config.interval).await,
                TickOutcome::Paused => match commands.recv().await {
                    Some(cmd) => {
                        if !self.handle(cmd).await {
                            return;
                        }
                    }
                    None => return,
                },
                TickOutcome::Stepped | TickOutcome::Reacquired | TickOutcome::ReacquireFailed => {}
            }
        }
    }
}

/// Format a measurement for the terminal. `None` if nothing is to be shown.
pub fn render(style: Render, measurement: &DecodedMeasurement) -> crate::Result<Option<String>> {
    let text = match style {
        Render::Text => format!("{}\n{}", measurement.display_value, measurement.status_line()),
        Render::Json => serde_json::to_string(measurement).map_err(Error::internal)?,
        Render::Quiet => return Ok(None),
    };
    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockLog, MockTransport};
    use async_trait::async_trait;
    use gdmlink_protocol::TransportError;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Clone)]
    struct Scripted {
        transports: Arc<Mutex<Vec<MockTransport>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl Scripted {
        fn new(transports: Vec<MockTransport>) -> Self {
            Scripted {
                transports: Arc::new(Mutex::new(transports)),
                calls: Default::default(),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Discover for Scripted {
        async fn discover(&mut self) -> crate::Result<Box<dyn Transport>> {
            *self.calls.lock().unwrap() += 1;
            let mut transports = self.transports.lock().unwrap();
            if transports.is_empty() {
                return Err(Error::transport(TransportError::NotFound("nothing".to_string())));
            }
            Ok(Box::new(transports.remove(0)))
        }
    }

    fn app(transport: MockTransport) -> (App, Scripted, MockLog) {
        let log = transport.log();
        let discover = Scripted::new(vec![transport]);
        let app = App::new(Config::default(), Box::new(discover.clone()));
        (app, discover, log)
    }

    async fn tick_until_measured(app: &mut App) -> DecodedMeasurement {
        loop {
            if let TickOutcome::Measured(x) = app.tick().await {
                return x;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reacquires_after_repeated_timeouts() {
        let (mut app, discover, log) = app(MockTransport::new("/dev/ttyUSB0"));
        assert!(matches!(app.tick().await, TickOutcome::Reacquired));
        assert_eq!(discover.calls(), 1);

        let mut timeouts = 0;
        loop {
            match app.tick().await {
                TickOutcome::Aborted(err) => {
                    assert!(err.is_timeout());
                    timeouts += 1;
                }
                TickOutcome::Stepped => {}
                TickOutcome::ReacquireFailed => break,
                x => panic!("unexpected {:?}", x),
            }
        }
        assert_eq!(timeouts, 6);
        assert_eq!(discover.calls(), 2);
        assert!(log.closed());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failures() {
        let transport = MockTransport::new("/dev/ttyUSB0")
            .silent()
            .silent()
            .reply("VOLT")
            .reply("+1.2346E+00")
            .reply("5");
        let (mut app, _, _) = app(transport);
        app.tick().await;
        let measurement = tick_until_measured(&mut app).await;
        assert_eq!(measurement.mode, Mode::VoltDc);
        assert_eq!(app.recovery.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_mode_is_no_failure() {
        let transport = MockTransport::new("/dev/ttyUSB0").reply("TEMP:RTD");
        let (mut app, _, _) = app(transport);
        app.tick().await;
        app.tick().await;
        let err = match app.tick().await {
            TickOutcome::Aborted(err) => err,
            x => panic!("unexpected {:?}", x),
        };
        assert!(matches!(err, Error::Protocol(ProtocolError::UnknownMode(_))));
        assert_eq!(app.recovery.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_drops_handle() {
        let (mut app, discover, log) = app(MockTransport::new("/dev/ttyUSB0").unplugged());
        assert!(matches!(app.tick().await, TickOutcome::Reacquired));
        // the stale input drain at the start of the cycle already hits the dead transport
        assert!(matches!(app.tick().await, TickOutcome::Aborted(ref err) if err.is_fatal()));
        assert!(log.closed());
        assert!(matches!(app.tick().await, TickOutcome::ReacquireFailed));
        assert_eq!(discover.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_transport_is_replaced() {
        let (mut app, discover, _) = app(MockTransport::new("/dev/ttyUSB0"));
        assert!(matches!(app.tick().await, TickOutcome::Reacquired));
        if let Some(transport) = app.transport.as_mut() {
            transport.close();
        }
        assert!(matches!(app.tick().await, TickOutcome::ReacquireFailed));
        assert_eq!(discover.calls(), 2);
        assert!(app.transport.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn quit_while_device_keeps_sending() {
        let transport = MockTransport::new("/dev/ttyUSB0").babbling(b"+1.0000E+00\r\n");
        let (mut app, _, log) = app(transport);
        let (tx, rx) = mpsc::unbounded_channel();
        let quit = async move {
            time::sleep(Duration::from_secs(2)).await;
            tx.send(Command::Quit).unwrap();
            // keep the channel open until the loop has returned
            tx
        };
        let run = app.run(rx, |_| panic!("no measurement expected"));
        let ret = time::timeout(Duration::from_secs(10), async { tokio::join!(run, quit) }).await;
        assert!(ret.is_ok());
        assert_eq!(log.written(), vec!["SYST:LOC"]);
    }

    #[tokio::test(start_paused = true)]
    async fn commands() {
        let transport = MockTransport::new("/dev/ttyUSB0").reply("+1.0000E+02");
        let (mut app, _, log) = app(transport);
        app.tick().await;

        assert!(app.handle(Command::Override(Mode::Resistance)).await);
        assert!(app.handle(Command::TogglePause).await);
        assert!(app.is_paused());
        assert!(matches!(app.tick().await, TickOutcome::Paused));
        assert!(app.handle(Command::TogglePause).await);
        assert!(!app.is_paused());
        assert!(!app.handle(Command::Quit).await);

        assert_eq!(log.written(), vec!["MEAS:RES?", "SYST:LOC", "SYST:LOC"]);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_measurements() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gdm.txt");
        let transport = MockTransport::new("/dev/ttyUSB0")
            .reply("DIOD")
            .reply("+5.1230E-01")
            .reply("1");
        let discover = Scripted::new(vec![transport]);
        let config = Config {
            output: Some(path.clone()),
            ..Default::default()
        };
        let mut app = App::new(config, Box::new(discover));
        app.tick().await;
        tick_until_measured(&mut app).await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0.5123 V\tDIODE");
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_quit() {
        let transport = MockTransport::new("/dev/ttyUSB0")
            .reply("FREQ")
            .reply("+5.0000E+01")
            .reply("1");
        let (mut app, _, log) = app(transport);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut seen = Vec::new();
        app.run(rx, |measurement| {
            seen.push(measurement.clone());
            tx.send(Command::Quit).unwrap();
        })
        .await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].mode, Mode::Frequency);
        assert_eq!(log.written().last().map(String::as_str), Some("SYST:LOC"));
    }

    #[test]
    fn keys() {
        assert_eq!(Command::from_key('r'), Some(Command::Override(Mode::Resistance)));
        assert_eq!(Command::from_key('u'), Some(Command::Override(Mode::Capacitance)));
        assert_eq!(Command::from_key('q'), Some(Command::Quit));
        assert_eq!(Command::from_key('x'), None);
    }

    #[test]
    fn render_formats() {
        let measurement = DecodedMeasurement {
            mode: Mode::Diode,
            display_value: "0.5123 V".to_string(),
            display_range_label: "None".to_string(),
            mode_label: "Diode".to_string(),
        };
        assert_eq!(
            render(Render::Text, &measurement).unwrap().unwrap(),
            "0.5123 V\nDiode, None"
        );
        let json = render(Render::Json, &measurement).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["display_value"], "0.5123 V");
        assert!(render(Render::Quiet, &measurement).unwrap().is_none());
    }
}
