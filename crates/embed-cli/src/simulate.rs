//! Replay a timed input script through the impact pipeline.
//!
//! Time is simulated: the loop jumps straight to the next input, timer
//! deadline or simulated response, so a five-second script runs instantly
//! and always produces the same timeline.

use std::io::Write;
use std::str::FromStr;
use std::time::Duration;

use clap::Args;
use embed_core::{
    Cadence, DeterministicClock, EmbedConfig, Epoch, ImpactEndpoint, ImpactPipeline,
    MonotonicClock, PipelineAction, ResolutionStrategy, ResolvedStatement,
};
use serde::Serialize;

use crate::error::{CliError, Result};

/// Placeholder URL for the in-process statement service.
const SIMULATED_ENDPOINT: &str = "sim://impact";

/// Upper bound on loop iterations; a well-formed script needs a handful per input.
const MAX_STEPS: usize = 100_000;

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Timed inputs `<ms>:<value>`, where value is an amount, `one-time`,
    /// `monthly` or `clear`. Example: `0:4 120:40 900:monthly`.
    #[arg(required = true, allow_hyphen_values = true)]
    pub events: Vec<ScriptEvent>,

    /// Resolve one-time amounts through a simulated remote service.
    #[arg(long)]
    pub remote: bool,

    /// Simulated service latency in remote mode.
    #[arg(long, default_value_t = 200)]
    pub latency_ms: u64,

    /// Emit the timeline as JSON lines.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptInput {
    Amount(f64),
    Cadence(Cadence),
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptEvent {
    pub at: Duration,
    pub input: ScriptInput,
}

impl FromStr for ScriptEvent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (at, value) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <ms>:<value>, got {s:?}"))?;
        let at = at
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid time {at:?} in {s:?}"))?;
        let value = value.trim();
        let input = match value {
            "clear" => ScriptInput::Clear,
            _ => match value.parse::<Cadence>() {
                Ok(cadence) => ScriptInput::Cadence(cadence),
                Err(_) => ScriptInput::Amount(
                    value
                        .parse::<f64>()
                        .map_err(|_| format!("invalid value {value:?} in {s:?}"))?,
                ),
            },
        };
        Ok(Self {
            at: Duration::from_millis(at),
            input,
        })
    }
}

/// One line of the simulated timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub at_ms: u64,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
struct PendingResponse {
    due: Duration,
    epoch: Epoch,
    query: String,
}

/// Drives a pipeline against a script and an in-process endpoint.
pub struct Simulation {
    pipeline: ImpactPipeline,
    service: ImpactEndpoint,
    latency: Duration,
    clock: DeterministicClock,
    cadence: Cadence,
    last_amount: Option<f64>,
    pending: Vec<PendingResponse>,
    timeline: Vec<TimelineEntry>,
}

impl Simulation {
    pub fn new(config: &EmbedConfig, remote: bool, latency: Duration) -> Result<Self> {
        let strategy = if remote {
            ResolutionStrategy::Remote {
                endpoint: SIMULATED_ENDPOINT.to_string(),
            }
        } else {
            ResolutionStrategy::Local
        };
        Ok(Self {
            pipeline: ImpactPipeline::new(
                config.resolver()?,
                strategy,
                config.coordinator_config(),
            ),
            service: config.endpoint()?,
            latency,
            clock: DeterministicClock::new(),
            cadence: Cadence::OneTime,
            last_amount: None,
            pending: Vec::new(),
            timeline: Vec::new(),
        })
    }

    /// Run the script to quiescence and return the timeline.
    pub fn run(
        mut self,
        events: &[ScriptEvent],
    ) -> Result<(Vec<TimelineEntry>, Option<ResolvedStatement>)> {
        let mut script = events.to_vec();
        script.sort_by_key(|e| e.at);
        let mut next = 0;

        for _ in 0..MAX_STEPS {
            let candidates = [
                script.get(next).map(|e| e.at),
                self.pipeline.next_deadline(),
                self.pending.iter().map(|p| p.due).min(),
            ];
            let Some(now) = candidates.into_iter().flatten().min() else {
                let statement = self.pipeline.statement().cloned();
                return Ok((self.timeline, statement));
            };
            self.clock.set(now.max(self.clock.now_mono()));
            let now = self.clock.now_mono();

            self.deliver_responses(now);
            while let Some(event) = script.get(next).filter(|e| e.at <= now) {
                self.apply_input(event.input, now);
                next += 1;
            }
            while let Some(action) = self.pipeline.poll(now) {
                self.record_action(action, now);
            }
        }
        Err(CliError::exit(1, "simulation did not settle"))
    }

    fn apply_input(&mut self, input: ScriptInput, now: Duration) {
        match input {
            ScriptInput::Amount(raw) => self.submit(raw, now),
            ScriptInput::Cadence(cadence) => {
                self.cadence = cadence;
                self.push(now, "type", None, cadence.to_string());
                if let Some(raw) = self.last_amount {
                    self.submit(raw, now);
                }
            }
            ScriptInput::Clear => {
                self.last_amount = None;
                self.pipeline.clear();
                self.push(now, "clear", None, String::new());
            }
        }
    }

    fn submit(&mut self, raw: f64, now: Duration) {
        match self.pipeline.submit(raw, self.cadence, now) {
            Ok(epoch) => {
                self.last_amount = Some(raw);
                self.push(now, "input", Some(epoch), format!("{raw} ({})", self.cadence));
            }
            Err(err) => {
                self.last_amount = None;
                self.push(now, "rejected", None, err.to_string());
            }
        }
    }

    fn record_action(&mut self, action: PipelineAction, now: Duration) {
        match action {
            PipelineAction::Applied(statement) => {
                self.push(now, "applied", None, describe(&statement));
            }
            PipelineAction::TimedOut(statement) => {
                self.push(now, "timeout", None, describe(&statement));
            }
            PipelineAction::Fetch(fetch) => {
                self.push(now, "fetch", Some(fetch.epoch), fetch.url.clone());
                self.pending.push(PendingResponse {
                    due: now.saturating_add(self.latency),
                    epoch: fetch.epoch,
                    query: fetch.query.query_string(),
                });
            }
        }
    }

    fn deliver_responses(&mut self, now: Duration) {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = waiting;
        for response in due {
            let reply = self.service.handle(&response.query);
            let body = reply.body.to_string();
            let applied = self
                .pipeline
                .complete_response(response.epoch, reply.status, &body);
            let detail = match (applied, self.pipeline.statement()) {
                (true, Some(statement)) => describe(statement),
                _ => format!("HTTP {} dropped", reply.status),
            };
            self.push(now, "response", Some(response.epoch), detail);
        }
    }

    fn push(&mut self, now: Duration, kind: &'static str, epoch: Option<Epoch>, detail: String) {
        self.timeline.push(TimelineEntry {
            at_ms: now.as_millis() as u64,
            kind,
            epoch: epoch.map(Epoch::get),
            detail,
        });
    }
}

fn describe(statement: &ResolvedStatement) -> String {
    let source = match (statement.source_range_id, statement.is_fallback) {
        (Some(id), _) => format!("range {id}"),
        (None, true) => "fallback".to_string(),
        (None, false) => "template".to_string(),
    };
    format!("[{source}] {}", statement.text)
}

pub fn run_simulate(
    args: &SimulateArgs,
    config: &EmbedConfig,
    out: &mut dyn Write,
) -> Result<()> {
    let latency = Duration::from_millis(args.latency_ms);
    let simulation = Simulation::new(config, args.remote, latency)?;
    let (timeline, statement) = simulation.run(&args.events)?;

    for entry in &timeline {
        if args.json {
            writeln!(out, "{}", serde_json::to_string(entry)?)?;
        } else {
            let epoch = entry.epoch.map(|e| format!("#{e}")).unwrap_or_default();
            writeln!(
                out,
                "{:>7}ms  {:<9}{:>4}  {}",
                entry.at_ms, entry.kind, epoch, entry.detail
            )?;
        }
    }
    if !args.json {
        match statement {
            Some(statement) => writeln!(out, "final: {}", describe(&statement))?,
            None => writeln!(out, "final: (none)")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn script(items: &[&str]) -> Vec<ScriptEvent> {
        items.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn kinds(timeline: &[TimelineEntry]) -> Vec<(u64, &'static str)> {
        timeline.iter().map(|e| (e.at_ms, e.kind)).collect()
    }

    #[test]
    fn parses_script_events() {
        assert_eq!(
            "120:40".parse::<ScriptEvent>(),
            Ok(ScriptEvent {
                at: Duration::from_millis(120),
                input: ScriptInput::Amount(40.0),
            })
        );
        assert_eq!(
            "5:monthly".parse::<ScriptEvent>().map(|e| e.input),
            Ok(ScriptInput::Cadence(Cadence::Monthly))
        );
        assert_eq!(
            "9:-5".parse::<ScriptEvent>().map(|e| e.input),
            Ok(ScriptInput::Amount(-5.0))
        );
        assert!("x:40".parse::<ScriptEvent>().is_err());
        assert!("40".parse::<ScriptEvent>().is_err());
    }

    #[test]
    fn typing_burst_resolves_once() {
        let sim = Simulation::new(&EmbedConfig::default(), false, Duration::ZERO).unwrap();
        let (timeline, statement) = sim.run(&script(&["0:4", "100:40"])).unwrap();
        assert_eq!(
            kinds(&timeline),
            vec![(0, "input"), (100, "input"), (600, "applied")]
        );
        assert_eq!(statement.unwrap().source_range_id, Some(5));
    }

    #[test]
    fn remote_mode_round_trips_through_endpoint() {
        let sim =
            Simulation::new(&EmbedConfig::default(), true, Duration::from_millis(200)).unwrap();
        let (timeline, statement) = sim.run(&script(&["0:40"])).unwrap();
        assert_eq!(
            kinds(&timeline),
            vec![(0, "input"), (500, "fetch"), (700, "response")]
        );
        let statement = statement.unwrap();
        assert_eq!(statement.source_range_id, Some(5));
        assert!(!statement.is_fallback);
    }

    #[test]
    fn slow_service_times_out_and_late_answer_is_dropped() {
        let sim =
            Simulation::new(&EmbedConfig::default(), true, Duration::from_millis(6_000)).unwrap();
        let (timeline, statement) = sim.run(&script(&["0:40"])).unwrap();
        assert_eq!(
            kinds(&timeline),
            vec![(0, "input"), (500, "fetch"), (5_500, "timeout"), (6_500, "response")]
        );
        assert!(timeline[3].detail.contains("dropped"));
        assert!(statement.unwrap().is_fallback);
    }

    #[test]
    fn rejected_input_clears_and_cadence_resubmits() {
        let sim = Simulation::new(&EmbedConfig::default(), false, Duration::ZERO).unwrap();
        let (timeline, statement) = sim
            .run(&script(&["0:40", "600:-5", "700:monthly", "800:25", "900:one-time"]))
            .unwrap();
        let k = kinds(&timeline);
        assert!(k.contains(&(600, "rejected")));
        assert!(k.contains(&(700, "type")));
        assert_eq!(k.last(), Some(&(1_400, "applied")));
        assert!(statement.is_some());
    }

    #[test]
    fn text_output_ends_with_final_statement() {
        let args = SimulateArgs {
            events: script(&["0:40"]),
            remote: false,
            latency_ms: 0,
            json: false,
        };
        let mut out = Vec::new();
        run_simulate(&args, &EmbedConfig::default(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().last().unwrap().starts_with("final: [range 5]"));
    }
}
