mod meter;
mod station;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use valve_core::valve::{MeterType, ResponseMailbox};

use meter::{FaultProfile, PROFILE_TAGS};
use station::{Options, Station};

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!(
            "Usage: valve-jig-emulator [--profile <{}>] [--meter <mechanical|ultrasonic>] \
             [--tick <ms>] [--fast] [--transcript <path>]",
            PROFILE_TAGS.join("|")
        );
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mailbox = ResponseMailbox::new();
    let mut station = Station::new(&mailbox, &options)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Valve jig emulator ready (profile={}). Type `help` for commands or `exit` to quit.",
        station.profile().tag()
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = station.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        if flag == "--fast" {
            options.fast = true;
            continue;
        }

        let value = match inline {
            Some(value) => value,
            None => args
                .next()
                .ok_or_else(|| format!("Expected value after {flag}"))?,
        };
        match flag.as_str() {
            "--profile" => options.profile = FaultProfile::from_tag(&value)?,
            "--meter" => options.meter = parse_meter(&value)?,
            "--tick" => {
                options.tick_ms = value
                    .parse()
                    .ok()
                    .filter(|tick: &u32| *tick > 0)
                    .ok_or_else(|| format!("Invalid tick `{value}`; expected milliseconds > 0"))?;
            }
            "--transcript" => options.transcript = Some(PathBuf::from(value)),
            _ => return Err(format!("Unknown option `{flag}`")),
        }
    }
    Ok(options)
}

fn parse_meter(value: &str) -> Result<MeterType, String> {
    [MeterType::Mechanical, MeterType::Ultrasonic]
        .into_iter()
        .find(|meter| value.eq_ignore_ascii_case(meter.as_str()))
        .ok_or_else(|| format!("Unknown meter `{value}`; expected mechanical or ultrasonic"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        parse_options(args.iter().map(ToString::to_string))
    }

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(parse(&[]), Ok(Options::default()));
    }

    #[test]
    fn accepts_separate_and_inline_values() {
        let options = parse(&[
            "--profile",
            "slow-close",
            "--meter=ultrasonic",
            "--tick",
            "5",
            "--fast",
            "--transcript=logs/run.log",
        ])
        .expect("valid options");

        assert_eq!(options.profile, FaultProfile::SlowClose);
        assert_eq!(options.meter, MeterType::Ultrasonic);
        assert_eq!(options.tick_ms, 5);
        assert!(options.fast);
        assert_eq!(options.transcript, Some(PathBuf::from("logs/run.log")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["--tick", "0"]).is_err());
        assert!(parse(&["--meter", "turbine"]).is_err());
        assert!(parse(&["--profile"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }
}
