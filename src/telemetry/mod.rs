//! CNC controller telemetry: machine state model, status-line parser and
//! the websocket link that feeds it.
//!
//! ```text
//!  LinkTransport ──frames──▶ TelemetryLink ──lines──▶ parser::parse ──▶ MachineStatus::apply
//! ```

pub mod link;
pub mod parser;

use serde::Serialize;

/// Most axes a position payload may carry.
pub const MAX_AXES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MachineState {
    #[default]
    Offline,
    Idle,
    Run,
    Hold,
    Jog,
    Alarm,
    Door,
    Check,
    Home,
    Sleep,
}

impl MachineState {
    /// Decode the leading state token. Substates (`Hold:0`, `Door:1`) map
    /// to their base state; matching ignores case.
    pub fn from_token(token: &str) -> Option<Self> {
        let base = token.split(':').next().unwrap_or(token).trim();
        let table = [
            ("Idle", Self::Idle),
            ("Run", Self::Run),
            ("Hold", Self::Hold),
            ("Jog", Self::Jog),
            ("Alarm", Self::Alarm),
            ("Door", Self::Door),
            ("Check", Self::Check),
            ("Home", Self::Home),
            ("Sleep", Self::Sleep),
        ];
        table
            .iter()
            .find(|(name, _)| base.eq_ignore_ascii_case(name))
            .map(|&(_, s)| s)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Idle => "IDLE",
            Self::Run => "RUN",
            Self::Hold => "HOLD",
            Self::Jog => "JOG",
            Self::Alarm => "ALARM",
            Self::Door => "DOOR",
            Self::Check => "CHECK",
            Self::Home => "HOME",
            Self::Sleep => "SLEEP",
        }
    }
}

/// Up to [`MAX_AXES`] coordinates; `count` says how many are meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Position {
    axes: [f32; MAX_AXES],
    count: u8,
}

impl Position {
    /// `None` when `values` is empty or longer than [`MAX_AXES`].
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        if values.is_empty() || values.len() > MAX_AXES {
            return None;
        }
        let mut axes = [0.0; MAX_AXES];
        axes[..values.len()].copy_from_slice(values);
        Some(Self {
            axes,
            count: values.len() as u8,
        })
    }

    pub fn axis_count(&self) -> usize {
        usize::from(self.count)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.axes[..self.axis_count()]
    }

    /// Axis-wise `self - other`; axes missing from `other` count as zero.
    pub fn minus(&self, other: &Position) -> Position {
        let mut out = *self;
        for (a, b) in out.axes.iter_mut().zip(other.as_slice()) {
            *a -= b;
        }
        out
    }

    /// Axis-wise `self + other`; axes missing from `other` count as zero.
    pub fn plus(&self, other: &Position) -> Position {
        let mut out = *self;
        for (a, b) in out.axes.iter_mut().zip(other.as_slice()) {
            *a += b;
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Overrides {
    pub feed: u16,
    pub rapid: u16,
    pub spindle: u16,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            feed: 100,
            rapid: 100,
            spindle: 100,
        }
    }
}

/// Fields recognised on one status line. `None` means "not on this line".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusReport {
    pub state: Option<MachineState>,
    pub machine: Option<Position>,
    pub work: Option<Position>,
    pub offset: Option<Position>,
    pub feed_rate: Option<f32>,
    pub spindle_speed: Option<f32>,
    pub overrides: Option<Overrides>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTransition {
    Started,
    Finished { duration_ms: u64 },
}

/// Live machine state, updated only through [`MachineStatus::apply`] and
/// the link's connect/disconnect hooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MachineStatus {
    pub state: MachineState,
    pub machine: Position,
    pub work: Position,
    /// Work coordinate offset, once one has been seen this session.
    pub offset: Option<Position>,
    pub feed_rate: f32,
    pub spindle_speed: f32,
    pub overrides: Overrides,
    pub job_running: bool,
    pub job_started_ms: Option<u64>,
    pub last_report_ms: Option<u64>,
}

impl MachineStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one report. Fields absent from the report keep their value.
    pub fn apply(&mut self, report: &StatusReport, now_ms: u64) -> Option<JobTransition> {
        if let Some(offset) = report.offset {
            self.offset = Some(offset);
        }

        match (report.machine, report.work) {
            (Some(m), Some(w)) => {
                self.machine = m;
                self.work = w;
            }
            (Some(m), None) => {
                self.machine = m;
                self.work = self.offset.map_or(m, |o| m.minus(&o));
            }
            (None, Some(w)) => {
                self.work = w;
                if let Some(o) = self.offset {
                    self.machine = w.plus(&o);
                }
            }
            (None, None) => {
                if let Some(o) = report.offset {
                    self.work = self.machine.minus(&o);
                }
            }
        }

        if let Some(f) = report.feed_rate {
            self.feed_rate = f;
        }
        if let Some(s) = report.spindle_speed {
            self.spindle_speed = s;
        }
        if let Some(ov) = report.overrides {
            self.overrides = ov;
        }
        self.last_report_ms = Some(now_ms);

        match report.state {
            Some(s) => self.set_state(s, now_ms),
            None => None,
        }
    }

    /// Transport came up; real state arrives with the first report.
    /// Starts a new session, so no work offset is known yet.
    pub fn mark_connected(&mut self, now_ms: u64) -> Option<JobTransition> {
        self.offset = None;
        self.set_state(MachineState::Idle, now_ms)
    }

    pub fn mark_offline(&mut self, now_ms: u64) -> Option<JobTransition> {
        self.offset = None;
        self.set_state(MachineState::Offline, now_ms)
    }

    pub fn job_elapsed_ms(&self, now_ms: u64) -> Option<u64> {
        if !self.job_running {
            return None;
        }
        self.job_started_ms.map(|t| now_ms.saturating_sub(t))
    }

    fn set_state(&mut self, next: MachineState, now_ms: u64) -> Option<JobTransition> {
        let was_running = self.state == MachineState::Run;
        self.state = next;
        match (was_running, next == MachineState::Run) {
            (false, true) => {
                self.job_running = true;
                self.job_started_ms = Some(now_ms);
                Some(JobTransition::Started)
            }
            (true, false) => {
                self.job_running = false;
                let duration_ms = self.job_started_ms.map_or(0, |t| now_ms.saturating_sub(t));
                Some(JobTransition::Finished { duration_ms })
            }
            _ => None,
        }
    }
}
