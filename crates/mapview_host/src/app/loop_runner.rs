use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::bootstrap::HostWiring;
use super::session::{HostSession, LineOutcome};

pub(crate) fn run(wiring: HostWiring) -> ExitCode {
    let HostWiring {
        mut session,
        tick_interval,
        startup_commands,
        read_stdin,
    } = wiring;
    let mut out = io::stdout();

    for line in &startup_commands {
        info!(command = line.as_str(), "startup_command");
        if apply_line(&mut session, line, &mut out) == LineOutcome::Quit {
            return ExitCode::SUCCESS;
        }
    }

    let mut input = if read_stdin {
        match spawn_stdin_reader() {
            Ok(receiver) => Some(receiver),
            Err(err) => {
                error!(error = %err, "startup_failed");
                return ExitCode::FAILURE;
            }
        }
    } else {
        None
    };

    let mut clock = TickClock::new(tick_interval, Instant::now());
    loop {
        if let Some(receiver) = &input {
            match drain_input(receiver, &mut session, &mut out) {
                InputState::Open => {}
                InputState::Closed => {
                    info!("stdin_closed");
                    input = None;
                }
                InputState::Quit => return ExitCode::SUCCESS,
            }
        }

        for line in session.tick() {
            write_line(&mut out, &line);
        }

        if input.is_none() && !session.is_busy() {
            break;
        }
        clock.wait_for_next_tick();
    }

    for line in session.shutdown() {
        write_line(&mut out, &line);
    }
    info!(rooms = session.registry().len(), "host_exit");
    ExitCode::SUCCESS
}

enum InputState {
    Open,
    Closed,
    Quit,
}

fn drain_input(
    receiver: &Receiver<String>,
    session: &mut HostSession,
    out: &mut impl Write,
) -> InputState {
    loop {
        match receiver.try_recv() {
            Ok(line) => {
                if apply_line(session, &line, out) == LineOutcome::Quit {
                    return InputState::Quit;
                }
            }
            Err(TryRecvError::Empty) => return InputState::Open,
            Err(TryRecvError::Disconnected) => return InputState::Closed,
        }
    }
}

fn apply_line(session: &mut HostSession, line: &str, out: &mut impl Write) -> LineOutcome {
    let (lines, outcome) = session.handle_line(line);
    for line in lines {
        write_line(out, &line);
    }
    outcome
}

fn write_line(out: &mut impl Write, line: &str) {
    if let Err(err) = writeln!(out, "{line}").and_then(|()| out.flush()) {
        warn!(error = %err, "stdout_write_failed");
    }
}

fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if sender.send(line).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "stdin_read_failed");
                        return;
                    }
                }
            }
        })?;
    Ok(receiver)
}

/// Fixed-rate pacing that drops missed ticks instead of bursting to catch up.
struct TickClock {
    interval: Option<Duration>,
    next_deadline: Instant,
}

impl TickClock {
    fn new(interval: Option<Duration>, now: Instant) -> Self {
        Self {
            interval,
            next_deadline: now + interval.unwrap_or_default(),
        }
    }

    fn wait_for_next_tick(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        let wait = self.next_deadline.saturating_duration_since(now);
        if !wait.is_zero() {
            thread::sleep(wait);
        }
        self.next_deadline = next_deadline(self.next_deadline, Instant::now(), interval);
    }
}

fn next_deadline(previous: Instant, now: Instant, interval: Duration) -> Instant {
    let scheduled = previous + interval;
    if scheduled < now {
        now + interval
    } else {
        scheduled
    }
}
