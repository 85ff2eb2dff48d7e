//! Wizard step state machine.
//!
//! A session starts `Active` on the first step and walks forward through
//! each step's `next` link until it is submitted or abandoned. Every
//! "next" click runs one refresh pass: the rule engine over the latest
//! field values, then required-field validation of the active step. When
//! validation is required, invalid fields on the active step block the
//! move and the presentation layer gets a single notice.
//!
//! State-mutating operations take `&mut self`; schema and rules are shared
//! immutably with background work through `Arc`.

use std::sync::Arc;

use serde_json::Value as Json;
use time::{Duration, OffsetDateTime};
use tokio::sync::oneshot;
use tracing::{debug, info};

use formflow_eval::{Environment, RuleRun, RuleSet};

use crate::config::FormConfig;
use crate::error::WizardError;
use crate::executor::{submit, BackgroundExecutor, CancelFlag, InlineExecutor};
use crate::navigator::{bind_environment, extract_required_fields, resolve_step};
use crate::presentation::{CountdownAlarm, Presentation, SilentAlarm};
use crate::schema::{FieldSpec, FormSchema, SelectionKind, COUNTDOWN_TIME_UNIT, COUNTDOWN_TIME_VALUE};
use crate::source::FileSource;
use crate::state::{WizardPhase, WizardState};
use crate::status::{field_address, ValidationReason, ValidationStatus};

// ──────────────────────────────────────────────
// Wiring
// ──────────────────────────────────────────────

/// Collaborators injected into one wizard session.
#[derive(Clone)]
pub struct WizardDeps {
    pub source: Arc<dyn FileSource>,
    pub presentation: Arc<dyn Presentation>,
    pub alarm: Arc<dyn CountdownAlarm>,
    pub executor: Arc<dyn BackgroundExecutor>,
}

impl WizardDeps {
    /// Silent alarm, inline background execution.
    pub fn new(source: Arc<dyn FileSource>, presentation: Arc<dyn Presentation>) -> Self {
        WizardDeps {
            source,
            presentation,
            alarm: Arc::new(SilentAlarm),
            executor: Arc::new(InlineExecutor),
        }
    }

    pub fn with_alarm(mut self, alarm: Arc<dyn CountdownAlarm>) -> Self {
        self.alarm = alarm;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.executor = executor;
        self
    }
}

// ──────────────────────────────────────────────
// Outcomes
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    /// Moved to the named step.
    Advanced(String),
    /// Invalid fields on the active step prevented the move.
    Blocked { invalid: Vec<String> },
    /// The active step is the last one.
    NoNextStep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The session closed; carries the final derived environment.
    Submitted(Environment),
    Blocked { invalid: Vec<String> },
}

/// Result of validating one step against a rule run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepValidation {
    pub step: String,
    pub rule_run: RuleRun,
    /// One required-field status per keyed field of the step.
    pub statuses: Vec<ValidationStatus>,
}

/// Step validation running on the background executor.
#[derive(Debug)]
pub struct PendingValidation {
    step: String,
    receiver: oneshot::Receiver<Result<StepValidation, WizardError>>,
}

impl PendingValidation {
    /// Step the snapshot was taken on.
    pub fn step(&self) -> &str {
        &self.step
    }
}

// ──────────────────────────────────────────────
// Validation (pure, runs on either context)
// ──────────────────────────────────────────────

fn required_statuses(
    schema: &FormSchema,
    step: &str,
    run: &RuleRun,
) -> Result<Vec<ValidationStatus>, WizardError> {
    let spec = schema
        .step(step)
        .ok_or_else(|| WizardError::MissingStepSchema {
            step: step.to_string(),
        })?;
    let required = extract_required_fields(&spec.fields, Some(run));

    Ok(spec
        .all_fields()
        .into_iter()
        .filter(|f| !f.key.is_empty())
        .map(|f| {
            let address = field_address(step, &f.key);
            if required.contains(&f.key) && f.is_empty() {
                ValidationStatus::required_missing(address)
            } else {
                ValidationStatus::valid(address)
            }
        })
        .collect())
}

/// Run the rules over the whole form and validate `step`.
pub fn validate_step(
    schema: &FormSchema,
    rules: &RuleSet,
    step: &str,
) -> Result<StepValidation, WizardError> {
    let env = bind_environment(schema);
    let rule_run = rules.run(&env);
    let statuses = required_statuses(schema, step, &rule_run)?;
    Ok(StepValidation {
        step: step.to_string(),
        rule_run,
        statuses,
    })
}

fn blocked_notice(count: usize) -> String {
    if count == 1 {
        "1 field needs attention before you can continue".to_string()
    } else {
        format!("{count} fields need attention before you can continue")
    }
}

fn countdown_length(field: &FieldSpec) -> Option<Duration> {
    let raw = field.metadata.get(COUNTDOWN_TIME_VALUE)?;
    let amount: i64 = match raw {
        Json::Number(n) => n.as_i64()?,
        Json::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let unit = field
        .metadata
        .get(COUNTDOWN_TIME_UNIT)
        .and_then(Json::as_str)
        .unwrap_or("seconds");
    // Values too large to represent count as undeclared.
    match unit.trim().to_ascii_lowercase().as_str() {
        "ms" | "milliseconds" => Some(Duration::milliseconds(amount)),
        "m" | "min" | "minutes" => amount.checked_mul(60).map(Duration::seconds),
        "h" | "hours" => amount.checked_mul(3600).map(Duration::seconds),
        _ => Some(Duration::seconds(amount)),
    }
}

// ──────────────────────────────────────────────
// Wizard
// ──────────────────────────────────────────────

/// One form-filling session.
pub struct Wizard {
    schema: Arc<FormSchema>,
    rules: Arc<RuleSet>,
    state: WizardState,
    deps: WizardDeps,
    cancel: CancelFlag,
    last_run: RuleRun,
    refresh_count: usize,
}

impl Wizard {
    pub fn new(schema: FormSchema, rules: RuleSet, deps: WizardDeps) -> Result<Self, WizardError> {
        let first = schema
            .first_step()
            .ok_or_else(|| WizardError::malformed("form declares no steps"))?
            .to_string();
        info!(
            first_step = %first,
            steps = schema.steps.len(),
            rules = rules.len(),
            "wizard session started"
        );
        Ok(Wizard {
            schema: Arc::new(schema),
            rules: Arc::new(rules),
            state: WizardState::new(first),
            deps,
            cancel: CancelFlag::new(),
            last_run: RuleRun::default(),
            refresh_count: 0,
        })
    }

    /// Load form `form_id` and every rule file it references from the
    /// injected source.
    pub async fn open(form_id: &str, deps: WizardDeps) -> Result<Self, WizardError> {
        let form = deps.source.get_form_from_file(form_id).await?;
        let schema = FormSchema::from_json(&form)?;
        let mut rules = RuleSet::default();
        for file in schema.rule_files() {
            let specs = deps.source.get_rules_from_file(&file).await?;
            debug!(file = %file, rules = specs.len(), "loaded rule file");
            rules.add_rules(specs);
        }
        Wizard::new(schema, rules, deps)
    }

    // -- Produced interface --------------------------------------

    pub fn current_step(&self) -> &str {
        &self.state.current_step
    }

    pub fn phase(&self) -> WizardPhase {
        self.state.phase
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn config(&self) -> &FormConfig {
        &self.schema.config
    }

    pub fn validation_status_for(&self, address: &str) -> Option<&ValidationStatus> {
        self.state.status(address)
    }

    /// Required keys of `step` under the latest rule run.
    pub fn required_fields(&self, step: &str) -> Result<Vec<String>, WizardError> {
        let spec = self
            .schema
            .step(step)
            .ok_or_else(|| WizardError::MissingStepSchema {
                step: step.to_string(),
            })?;
        Ok(extract_required_fields(&spec.fields, Some(&self.last_run)))
    }

    /// Whether a "next" click would currently move forward.
    ///
    /// Required fields are checked against the current values without
    /// running the rules; rule-dependent requirements use the latest run.
    pub fn can_advance(&self) -> bool {
        if self.state.phase.is_terminal() {
            return false;
        }
        let current = &self.state.current_step;
        let has_next = self.schema.step(current).is_some_and(|s| !s.next.is_empty());
        if !has_next {
            return false;
        }
        if !self.validate_on_submit() {
            return true;
        }

        let Ok(required) = required_statuses(&self.schema, current, &self.last_run) else {
            return false;
        };
        if required.iter().any(|s| !s.valid) {
            return false;
        }
        // Stored required-field verdicts are superseded by the check above.
        self.state
            .invalid_under(current)
            .iter()
            .all(|address| self.state.status(address).is_some_and(|s| s.is_required_missing()))
    }

    /// Whether invalid fields block advancement. Defaults to yes.
    pub fn validate_on_submit(&self) -> bool {
        self.schema.config.validate_on_submit()
    }

    /// Current field values bound as rule variables.
    pub fn environment(&self) -> Environment {
        bind_environment(&self.schema)
    }

    pub fn last_rule_run(&self) -> &RuleRun {
        &self.last_run
    }

    /// Number of refresh passes run so far.
    pub fn refresh_count(&self) -> usize {
        self.refresh_count
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn ensure_active(&self) -> Result<(), WizardError> {
        if self.state.phase.is_terminal() {
            return Err(WizardError::SessionClosed {
                phase: self.state.phase.to_string(),
            });
        }
        Ok(())
    }

    // -- Field mutation ------------------------------------------

    /// Store a field value. For multi-choice fields an array of option keys
    /// selects exactly those options.
    pub fn set_field_value(&mut self, step: &str, key: &str, value: Json) -> Result<(), WizardError> {
        self.ensure_active()?;
        if self.schema.field(step, key).is_none() {
            return Err(WizardError::FieldNotFound {
                step: step.to_string(),
                key: key.to_string(),
            });
        }
        let schema = Arc::make_mut(&mut self.schema);
        let Some(field) = schema.field_mut(step, key) else {
            return Ok(());
        };

        let multi = field.field_type.selection_kind() == SelectionKind::Multi;
        match value {
            Json::Array(items) if multi => {
                for option in &mut field.options {
                    let selected = items.iter().any(|i| i.as_str() == Some(option.key.as_str()));
                    option.value = Some(selected.to_string());
                }
                field.value = None;
            }
            Json::Null => field.value = None,
            other => field.value = Some(other),
        }
        debug!(step, key, "field value set");
        Ok(())
    }

    /// Record a widget-level verdict for a field. `error` of `None` marks
    /// the field valid.
    pub fn report_validation(
        &mut self,
        step: &str,
        key: &str,
        error: Option<&str>,
    ) -> Result<(), WizardError> {
        self.ensure_active()?;
        if self.schema.field(step, key).is_none() {
            return Err(WizardError::FieldNotFound {
                step: step.to_string(),
                key: key.to_string(),
            });
        }
        let address = field_address(step, key);
        let status = match error {
            None => ValidationStatus::valid(address),
            Some(msg) => ValidationStatus::invalid(address, ValidationReason::Widget(msg.to_string())),
        };
        self.state.record(status);
        Ok(())
    }

    /// Apply required-field statuses. Only required-field verdicts are
    /// replaced by a valid status; widget verdicts persist until re-reported.
    fn apply_statuses(&mut self, statuses: Vec<ValidationStatus>) {
        for status in statuses {
            if !status.valid {
                self.state.record(status);
                continue;
            }
            let replace = self
                .state
                .status(&status.field_address)
                .map_or(true, |s| s.is_required_missing());
            if replace {
                self.state.record(status);
            }
        }
    }

    // -- Refresh and navigation ----------------------------------

    /// Re-run the rules, revalidate the active step and resolve its next
    /// step. Returns `None` on the last step.
    pub fn execute_refresh_logic_for_next_step(&mut self) -> Result<Option<String>, WizardError> {
        self.ensure_active()?;
        self.refresh_count += 1;

        let step = self.state.current_step.clone();
        let validation = validate_step(&self.schema, &self.rules, &step)?;
        debug!(
            step = %step,
            fired = validation.rule_run.fired_rules.len(),
            failed = validation.rule_run.failures.len(),
            "refresh pass"
        );
        self.last_run = validation.rule_run;
        self.apply_statuses(validation.statuses);

        let next = resolve_step(&self.schema, &step)?.next;
        if next.is_empty() {
            return Ok(None);
        }
        if self.schema.step(&next).is_none() {
            return Err(WizardError::MissingStepSchema { step: next });
        }
        Ok(Some(next))
    }

    /// Move to the active step's `next` step. Returns `false`, with no side
    /// effects, when there is none. Performs no validation.
    pub fn move_to_next_step(&mut self) -> Result<bool, WizardError> {
        self.ensure_active()?;
        let next = resolve_step(&self.schema, &self.state.current_step)?.next;
        if next.is_empty() {
            return Ok(false);
        }
        if self.schema.step(&next).is_none() {
            return Err(WizardError::MissingStepSchema { step: next });
        }

        self.deps.presentation.hide_input_method();
        self.deps.presentation.transact_to(&next);
        debug!(from = %self.state.current_step, to = %next, "step transition");
        let previous = std::mem::replace(&mut self.state.current_step, next);
        self.state.step_history.push(previous);
        Ok(true)
    }

    /// Handle the "next" button.
    ///
    /// Both validation modes run exactly one refresh pass; only when
    /// validation is required do invalid fields on the active step block
    /// the move.
    pub fn on_next_click(&mut self) -> Result<NextOutcome, WizardError> {
        self.ensure_active()?;
        let validate = self.validate_on_submit();
        self.execute_refresh_logic_for_next_step()?;

        if validate {
            let invalid = self.state.invalid_under(&self.state.current_step);
            if !invalid.is_empty() {
                self.deps.presentation.show_notice(&blocked_notice(invalid.len()));
                debug!(step = %self.state.current_step, invalid = invalid.len(), "advance blocked");
                return Ok(NextOutcome::Blocked { invalid });
            }
        }

        self.check_and_stop_countdown();
        if self.move_to_next_step()? {
            Ok(NextOutcome::Advanced(self.state.current_step.clone()))
        } else {
            Ok(NextOutcome::NoNextStep)
        }
    }

    /// Return to the previous step.
    pub fn move_back(&mut self) -> Result<String, WizardError> {
        self.ensure_active()?;
        let previous = self.state.step_history.pop().ok_or(WizardError::AtFirstStep)?;
        self.deps.presentation.hide_input_method();
        self.deps.presentation.transact_to(&previous);
        debug!(from = %self.state.current_step, to = %previous, "step back");
        self.state.current_step = previous.clone();
        Ok(previous)
    }

    // -- Countdown -----------------------------------------------

    /// Countdown length declared by the active step, falling back to the
    /// form's `countdown_seconds`.
    pub fn countdown_duration(&self) -> Option<Duration> {
        let step = self.schema.step(&self.state.current_step)?;
        let field = step.all_fields().into_iter().find(|f| f.is_countdown())?;
        countdown_length(field).or_else(|| {
            self.schema
                .config
                .countdown_seconds
                .and_then(|s| i64::try_from(s).ok())
                .map(Duration::seconds)
        })
    }

    /// Arm the countdown to expire `duration` after `now`. Only steps that
    /// declare a countdown field can arm one.
    pub fn start_countdown(
        &mut self,
        duration: Duration,
        now: OffsetDateTime,
    ) -> Result<OffsetDateTime, WizardError> {
        self.ensure_active()?;
        let declared = self
            .schema
            .step(&self.state.current_step)
            .is_some_and(|s| s.has_countdown());
        if !declared {
            return Err(WizardError::InvalidCountdown {
                message: format!("step '{}' declares no countdown field", self.state.current_step),
            });
        }
        if duration.is_negative() {
            return Err(WizardError::InvalidCountdown {
                message: format!("negative duration {duration:?}"),
            });
        }
        let deadline = now
            .checked_add(duration)
            .ok_or_else(|| WizardError::InvalidCountdown {
                message: format!("deadline out of range ({now:?} + {duration:?})"),
            })?;
        self.state.countdown_deadline = Some(deadline);
        debug!(?deadline, "countdown started");
        Ok(deadline)
    }

    pub fn is_countdown_expired(&self, now: OffsetDateTime) -> bool {
        self.state.countdown_deadline.is_some_and(|d| now >= d)
    }

    /// Stop the countdown if the active step declares a countdown field.
    /// A no-op otherwise. The alarm is stopped on the background executor.
    pub fn check_and_stop_countdown(&mut self) -> bool {
        let declared = self
            .schema
            .step(&self.state.current_step)
            .is_some_and(|s| s.has_countdown());
        if !declared {
            return false;
        }
        self.stop_countdown();
        true
    }

    fn stop_countdown(&mut self) {
        self.state.countdown_deadline = None;
        let alarm = Arc::clone(&self.deps.alarm);
        self.deps.executor.execute(Box::new(move || alarm.stop_alarm()));
        debug!(step = %self.state.current_step, "countdown stopped");
    }

    // -- Session end ---------------------------------------------

    /// Close the session. When validation is required every step is
    /// validated first and any invalid field refuses the submit.
    pub fn submit(&mut self) -> Result<SubmitOutcome, WizardError> {
        self.ensure_active()?;
        let env = bind_environment(&self.schema);
        let run = self.rules.run(&env);

        if self.validate_on_submit() {
            let steps: Vec<String> = self.schema.steps.iter().map(|s| s.name.clone()).collect();
            for step in &steps {
                let statuses = required_statuses(&self.schema, step, &run)?;
                self.apply_statuses(statuses);
            }
            let invalid: Vec<String> = self.state.invalid_fields().iter().cloned().collect();
            if !invalid.is_empty() {
                self.last_run = run;
                self.deps.presentation.show_notice(&blocked_notice(invalid.len()));
                debug!(invalid = invalid.len(), "submit blocked");
                return Ok(SubmitOutcome::Blocked { invalid });
            }
        }

        if self.state.countdown_deadline.is_some() {
            self.stop_countdown();
        }
        self.state.phase = WizardPhase::Submitted;
        let derived = run.derived.clone();
        self.last_run = run;
        info!(step = %self.state.current_step, "wizard submitted");
        Ok(SubmitOutcome::Submitted(derived))
    }

    /// Close the session without submitting. Pending background work is
    /// cancelled.
    pub fn abandon(&mut self) -> Result<(), WizardError> {
        self.ensure_active()?;
        self.cancel.cancel();
        if self.state.countdown_deadline.is_some() {
            self.stop_countdown();
        }
        self.state.phase = WizardPhase::Abandoned;
        info!(step = %self.state.current_step, "wizard abandoned");
        Ok(())
    }

    // -- Background validation -----------------------------------

    /// Validate the active step on the background executor against a
    /// snapshot of the current values.
    pub fn spawn_step_validation(&self) -> Result<PendingValidation, WizardError> {
        self.ensure_active()?;
        let schema = Arc::clone(&self.schema);
        let rules = Arc::clone(&self.rules);
        let step = self.state.current_step.clone();
        let task_step = step.clone();
        let receiver = submit(self.deps.executor.as_ref(), move || {
            validate_step(&schema, &rules, &task_step)
        });
        Ok(PendingValidation { step, receiver })
    }

    /// Apply a background validation. Returns `false` when the result was
    /// discarded because the session was cancelled or left the step.
    pub async fn apply_step_validation(
        &mut self,
        pending: PendingValidation,
    ) -> Result<bool, WizardError> {
        let result = pending
            .receiver
            .await
            .map_err(|e| WizardError::Background {
                message: e.to_string(),
            })?;

        if self.cancel.is_cancelled() || self.state.phase.is_terminal() {
            debug!(step = %pending.step, "discarding validation: session cancelled");
            return Ok(false);
        }
        if self.state.current_step != pending.step {
            debug!(step = %pending.step, "discarding validation: step changed");
            return Ok(false);
        }

        let validation = result?;
        self.last_run = validation.rule_run;
        self.apply_statuses(validation.statuses);
        Ok(true)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
