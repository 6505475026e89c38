use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use clap::{crate_authors, crate_version, App as ClapApp, Arg, ArgMatches};
use env_logger::Env;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::runtime::Builder;
use tokio::sync::mpsc::{self, UnboundedSender};

use gdmlink::app::{render, App, Command, Config, Render};
use gdmlink::discovery::DeviceFinder;
use gdmlink::transport::{BaudRate, SerialParams};
use gdmlink::Error;

const SPEEDS: [&str; 5] = ["9600", "19200", "38400", "57600", "115200"];

fn main() {
    let matches = ClapApp::new("GDM-8341 link")
        .author(crate_authors!())
        .version(crate_version!())
        .about("Poll a GwInstek GDM-8341 multimeter and print its readings")
        .arg(
            Arg::with_name("port")
                .long("port")
                .short('p')
                .takes_value(true)
                .help("Device path of the meter. Probes /dev/ttyUSB0 to /dev/ttyUSB9 if omitted."),
        )
        .arg(
            Arg::with_name("speed")
                .long("speed")
                .short('s')
                .takes_value(true)
                .possible_values(SPEEDS)
                .default_value("115200")
                .help("Baud rate"),
        )
        .arg(
            Arg::with_name("interval")
                .long("interval")
                .short('t')
                .takes_value(true)
                .default_value("100")
                .help("Pause between measurements in milliseconds"),
        )
        .arg(
            Arg::with_name("threshold")
                .long("threshold")
                .takes_value(true)
                .help("Continuity threshold in ohms, overrides the meter setting"),
        )
        .arg(
            Arg::with_name("output")
                .long("output")
                .short('o')
                .takes_value(true)
                .help("Publish each reading to this file once the previous one was consumed"),
        )
        .arg(Arg::with_name("json").long("json").help("Print readings as JSON"))
        .arg(Arg::with_name("quiet").long("quiet").short('q').help("Do not print readings"))
        .arg(Arg::with_name("verbose").long("verbose").short('v').help("Log verbose output"))
        .get_matches();

    if matches.is_present("verbose") {
        env_logger::Builder::from_env(Env::default().default_filter_or("gdmlink=debug")).init();
    } else {
        env_logger::init();
    }

    let config = match parse_config(&matches) {
        Ok(config) => config,
        Err(err) => {
            println!("{}", err);
            exit(1);
        }
    };

    let rt = match Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            println!("Cannot start runtime: {}", err);
            exit(1);
        }
    };
    rt.block_on(async move {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_keys(tx.clone()));
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(Command::Quit);
            }
        });

        let style = config.render;
        let finder = DeviceFinder::new(config.device.clone(), config.params.clone(), config.timing.clone());
        let mut app = App::new(config, Box::new(finder));
        app.run(rx, |measurement| match render(style, measurement) {
            Ok(Some(text)) => println!("{}", text),
            Ok(None) => {}
            Err(err) => log::error!("{}", err),
        })
        .await;
        log::debug!("Application quitting.");
    });
    // stdin may still be blocked in a read
    rt.shutdown_timeout(Duration::from_millis(100));
}

fn parse_config(matches: &ArgMatches) -> gdmlink::Result<Config> {
    let speed = matches.value_of("speed").unwrap_or("115200");
    let params = SerialParams::new(BaudRate::from_str(speed)?);

    let interval = matches.value_of("interval").unwrap_or("100");
    let interval = interval
        .parse::<u64>()
        .map_err(|_| Error::argument(anyhow!("Cannot parse `{}` as interval in milliseconds.", interval)))?;

    let threshold = match matches.value_of("threshold") {
        Some(x) => Some(
            x.parse::<i64>()
                .map_err(|_| Error::argument(anyhow!("Cannot parse `{}` as threshold in ohms.", x)))?,
        ),
        None => None,
    };

    let render = if matches.is_present("quiet") {
        Render::Quiet
    } else if matches.is_present("json") {
        Render::Json
    } else {
        Render::Text
    };

    Ok(Config {
        device: matches.value_of("port").map(|x| x.to_string()),
        params,
        interval: Duration::from_millis(interval),
        threshold,
        output: matches.value_of("output").map(PathBuf::from),
        render,
        ..Default::default()
    })
}

/// Forward operator key presses. Input is line buffered, every character of a line counts.
async fn read_keys(tx: UnboundedSender<Command>) {
    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                log::error!("Cannot read from stdin: {}", err);
                break;
            }
        };
        for cmd in line.chars().filter_map(Command::from_key) {
            if tx.send(cmd).is_err() {
                return;
            }
        }
    }
}
