// The live poll view: feeds every detection into the terminal and waits for `q` at the end.

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{Terminal, backend::Backend, widgets::ListState};
use std::time::Duration;

pub mod model;
pub mod parser;
pub mod poller;
pub mod systemd;
pub mod ui;

use crate::error::ReadinessError;
use model::{
    DesiredState, DetectionOutcome, ManagedBy, PollProgress, PollRequest, PollResult,
    ServiceDescriptor,
};
use poller::{Clock, ReadinessPoller};
use systemd::CommandRunner;

/// Everything the view needs to draw one frame.
#[derive(Debug, Clone)]
pub struct PollStatus {
    pub unit: String,
    pub desired_state: Option<DesiredState>,
    pub timeout: Duration,
    pub iteration: u32,
    pub elapsed: Duration,
    pub found: bool,
    pub managed_by: Option<ManagedBy>,
    pub descriptor: ServiceDescriptor,
    pub verdict: Option<Verdict>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ready,
    Failed(String),
}

impl PollStatus {
    pub fn new(request: &PollRequest) -> Self {
        Self {
            unit: request.service_name.clone(),
            desired_state: request.desired_state,
            timeout: request.timeout,
            iteration: 0,
            elapsed: Duration::ZERO,
            found: false,
            managed_by: None,
            descriptor: ServiceDescriptor::new(),
            verdict: None,
        }
    }

    pub fn observe(&mut self, progress: &PollProgress<'_>) {
        self.iteration = progress.iteration;
        self.elapsed = progress.elapsed;
        match progress.outcome {
            DetectionOutcome::Found {
                descriptor,
                managed_by,
            } => {
                self.found = true;
                self.managed_by = Some(*managed_by);
                self.descriptor = descriptor.clone();
            }
            DetectionOutcome::NotFound => {
                self.found = false;
                self.managed_by = None;
                self.descriptor = ServiceDescriptor::new();
            }
        }
    }

    pub fn conclude(&mut self, result: &Result<PollResult, ReadinessError>) {
        self.verdict = Some(match result {
            Ok(result) => {
                self.elapsed = result.elapsed;
                Verdict::Ready
            }
            Err(err) => {
                if let ReadinessError::Timeout { elapsed, .. } = err {
                    self.elapsed = *elapsed;
                }
                Verdict::Failed(err.to_string())
            }
        });
    }

    /// Fraction of the timeout already spent, clamped to `0.0..=1.0`.
    pub fn progress_ratio(&self) -> f64 {
        if self.timeout.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.timeout.as_secs_f64()).clamp(0.0, 1.0)
    }
}

pub struct App {
    status: PollStatus,
    list_state: ListState,
    should_quit: bool,
}

impl App {
    pub fn new(request: &PollRequest) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0)); // Start with first item selected

        Self {
            status: PollStatus::new(request),
            list_state,
            should_quit: false,
        }
    }

    /// Polls while redrawing after every detection, then keeps the final frame on
    /// screen until the user quits. The poll's own outcome is returned untouched.
    pub fn run<B, R, C>(
        &mut self,
        terminal: &mut Terminal<B>,
        poller: &ReadinessPoller<R, C>,
        request: &PollRequest,
    ) -> Result<Result<PollResult, ReadinessError>>
    where
        B: Backend,
        R: CommandRunner,
        C: Clock,
    {
        terminal.draw(|f| ui::render(f, &self.status, &mut self.list_state))?;

        let mut draw_error = None;
        let outcome = poller.poll_with(request, |progress| {
            self.status.observe(progress);
            if draw_error.is_none() {
                if let Err(err) =
                    terminal.draw(|f| ui::render(f, &self.status, &mut self.list_state))
                {
                    draw_error = Some(err);
                }
            }
        });
        if let Some(err) = draw_error {
            return Err(err.into());
        }

        self.status.conclude(&outcome);
        self.clamp_selection();

        loop {
            terminal.draw(|f| ui::render(f, &self.status, &mut self.list_state))?;

            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                        KeyCode::Char('j') | KeyCode::Down => self.next(),
                        KeyCode::Char('k') | KeyCode::Up => self.previous(),
                        _ => {}
                    }
                }
            }

            if self.should_quit {
                return Ok(outcome);
            }
        }
    }

    fn clamp_selection(&mut self) {
        if let Some(selected) = self.list_state.selected() {
            if selected >= self.status.descriptor.len() {
                self.list_state
                    .select(Some(self.status.descriptor.len().saturating_sub(1)));
            }
        }
    }

    fn next(&mut self) {
        let len = self.status.descriptor.len();
        let i = match self.list_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    fn previous(&mut self) {
        let len = self.status.descriptor.len();
        let i = match self.list_state.selected() {
            Some(0) | None => len.saturating_sub(1),
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::systemd::testing::ScriptedRunner;
    use crate::app::systemd::ServiceDetector;
    use ratatui::backend::TestBackend;

    #[test]
    fn status_tracks_latest_detection() {
        let request = PollRequest::new("cron").with_desired_state(DesiredState::Started);
        let mut status = PollStatus::new(&request);
        let outcome = DetectionOutcome::Found {
            descriptor: [("ActiveState", "activating")].into_iter().collect(),
            managed_by: ManagedBy::SystemdManaged,
        };

        status.observe(&PollProgress {
            service_name: "cron",
            desired_state: request.desired_state,
            iteration: 2,
            elapsed: Duration::from_secs(150),
            timeout: request.timeout,
            outcome: &outcome,
        });

        assert!(status.found);
        assert_eq!(status.iteration, 2);
        assert_eq!(status.descriptor.active_state(), Some("activating"));
        assert!((status.progress_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn failure_becomes_verdict() {
        let request = PollRequest::new("cron").with_desired_state(DesiredState::Started);
        let mut status = PollStatus::new(&request);
        status.conclude(&Err(ReadinessError::ServiceMissing {
            unit: "cron".into(),
        }));
        assert_eq!(
            status.verdict,
            Some(Verdict::Failed("could not find the requested service cron".into()))
        );
    }

    #[test]
    fn frames_render_during_poll() {
        let runner = ScriptedRunner::new()
            .on(
                "systemctl show cron",
                0,
                "LoadState=loaded\nActiveState=active\nId=cron.service\n",
                "",
            )
            .on("test -f /etc/init.d/cron", 1, "", "");
        let poller = ReadinessPoller::new(ServiceDetector::new(&runner, "systemctl", "/etc/init.d"));
        let request = PollRequest::new("cron");
        let mut app = App::new(&request);
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();

        terminal
            .draw(|f| ui::render(f, &app.status, &mut app.list_state))
            .unwrap();
        let outcome = poller.poll_with(&request, |progress| app.status.observe(progress));
        app.status.conclude(&outcome);
        terminal
            .draw(|f| ui::render(f, &app.status, &mut app.list_state))
            .unwrap();

        let screen: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("cron"));
        assert!(screen.contains("ActiveState"));
        assert!(screen.contains("ready"));
    }
}
