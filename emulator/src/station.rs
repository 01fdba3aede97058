use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant as HostInstant};

use valve_core::console::{CommandError, JigControl, StatsSummary, execute};
use valve_core::stats::TestStats;
use valve_core::valve::{MeterType, ResponseMailbox, Session, TestLimits, TestResult, ValveTest};

use crate::meter::{FaultProfile, SimulatedMeter};

/// Speed-up applied by `--fast` to both the limits and the simulated meter.
pub const FAST_TIME_SCALE: u32 = 10;

const STATION_ID: u8 = 1;

/// Emulator start-up options.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Options {
    pub profile: FaultProfile,
    pub meter: MeterType,
    pub tick_ms: u32,
    pub fast: bool,
    pub transcript: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            profile: FaultProfile::Healthy,
            meter: MeterType::Mechanical,
            tick_ms: 10,
            fast: false,
            transcript: None,
        }
    }
}

/// One emulated test station: the real engine wired to a simulated meter.
pub struct Station<'m> {
    engine: ValveTest<'m, SimulatedMeter<'m>>,
    stats: TestStats,
    tick_ms: u32,
    started: HostInstant,
    transcript: Option<TranscriptLogger>,
}

impl<'m> Station<'m> {
    pub fn new(mailbox: &'m ResponseMailbox, options: &Options) -> io::Result<Self> {
        let scale = if options.fast { FAST_TIME_SCALE } else { 1 };
        let meter = SimulatedMeter::new(mailbox, options.profile, options.meter, scale);
        let limits = TestLimits::reference().scaled_down(scale);
        let transcript = match &options.transcript {
            Some(path) => Some(TranscriptLogger::new(path, options)?),
            None => None,
        };

        Ok(Self {
            engine: ValveTest::with_limits(meter, mailbox, limits),
            stats: TestStats::new(STATION_ID),
            tick_ms: options.tick_ms.max(1),
            started: HostInstant::now(),
            transcript,
        })
    }

    pub fn profile(&self) -> FaultProfile {
        self.engine.hal().profile()
    }

    /// Executes one console line and returns everything to print.
    ///
    /// Trace lines emitted while the command ran come first, followed by the
    /// command reply.
    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        self.log(TranscriptRole::Host, line)?;

        let reply = match execute(line, self) {
            Ok(reply) => reply.to_string(),
            Err(error) => error.to_string(),
        };

        let mut output = self.engine.hal_mut().drain_trace();
        output.push(reply);
        for entry in &output {
            self.log(TranscriptRole::Emulator, entry)?;
        }
        Ok(output)
    }

    fn log(&mut self, role: TranscriptRole, line: &str) -> io::Result<()> {
        let elapsed = self.started.elapsed();
        match self.transcript.as_mut() {
            Some(logger) => logger.append_line(elapsed, role, line),
            None => Ok(()),
        }
    }
}

impl JigControl for Station<'_> {
    fn session(&self) -> &Session {
        self.engine.session()
    }

    fn start_test(&mut self) {
        self.engine.start();
    }

    fn stop_test(&mut self) {
        self.engine.stop();
    }

    fn meter(&self) -> MeterType {
        self.engine.hal().meter()
    }

    fn select_meter(&mut self, meter: MeterType) {
        self.engine.hal_mut().set_meter(meter);
    }

    fn inject_response(&mut self, code: u16) {
        self.engine.on_response(code);
    }

    fn advance(&mut self, elapsed_ms: u32) -> Result<TestResult, CommandError> {
        let mut remaining = elapsed_ms;
        while remaining > 0 {
            let step = remaining.min(self.tick_ms);
            self.engine.hal_mut().advance(step);
            let was_running = self.engine.is_running();
            let result = self.engine.tick(step);
            if was_running && result.is_terminal() {
                let _ = self.stats.record_session(self.engine.session());
            }
            remaining -= step;
        }
        Ok(self.engine.result())
    }

    fn stats(&self) -> Option<StatsSummary> {
        Some(StatsSummary::from(&self.stats))
    }

    fn reset_stats(&mut self) -> Result<(), CommandError> {
        self.stats.reset();
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, options: &Options) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(options)?;
        Ok(logger)
    }

    fn write_header(&mut self, options: &Options) -> io::Result<()> {
        writeln!(
            self.writer,
            "# Valve jig emulator transcript (profile={} meter={} tick={}ms{})",
            options.profile.tag(),
            options.meter,
            options.tick_ms,
            if options.fast { " fast" } else { "" }
        )?;
        writeln!(
            self.writer,
            "# Timestamps are host milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}
