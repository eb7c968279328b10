//! Command engine orchestrator.
//!
//! Runs one user command through the full pipeline: date annotation, prompt
//! construction, the provider chain, response extraction, the decision
//! policy, and (when the policy allows it and the caller is still there)
//! execution.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tasklane_core::config::{EngineConfig, PolicyConfig, TasklaneConfig};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::confirmation::ConfirmationGate;
use crate::error::{ChainError, EngineError};
use crate::executor::ActionExecutor;
use crate::extract::{self, ParseOutcome};
use crate::policy::{ambiguity, validate_transition, CommandPhase, DecisionPolicy};
use crate::provider::{Completion, Prompt, ProviderChain};
use crate::telemetry::Telemetry;
use crate::text::truncate;
use crate::types::{
    Action, ActionBody, ActionResult, BulkItem, CallerHandle, CommandOutcome, CommandResponse,
    ExecutionErrorKind, ExecutionOutcome, UserContext,
};
use crate::{date, prompt};

const NOT_UNDERSTOOD: &str = "No entendí el comando. ¿Puedes reformularlo?";
const NEED_DETAILS: &str = "No estoy seguro de qué quieres hacer. ¿Puedes dar más detalles?";
const CALLER_GONE: &str = "La sesión terminó antes de ejecutar las acciones.";

/// Reply to confirming a parked suggestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResponse {
    pub suggestion_id: Uuid,
    pub command: String,
    pub actions: Vec<Action>,
    pub results: Vec<ActionResult>,
    pub message: String,
}

/// Results of executing an action list.
struct Execution {
    results: Vec<ActionResult>,
    abandoned: bool,
}

/// The natural-language command engine.
pub struct CommandEngine {
    chain: Arc<ProviderChain>,
    executor: Arc<dyn ActionExecutor>,
    telemetry: Arc<Telemetry>,
    policy: DecisionPolicy,
    gate: ConfirmationGate,
    config: EngineConfig,
}

impl CommandEngine {
    pub fn new(
        chain: Arc<ProviderChain>,
        executor: Arc<dyn ActionExecutor>,
        telemetry: Arc<Telemetry>,
        policy: PolicyConfig,
        config: EngineConfig,
    ) -> Self {
        Self {
            chain,
            executor,
            telemetry,
            policy: DecisionPolicy::new(policy),
            gate: ConfirmationGate::from_config(&config),
            config,
        }
    }

    /// Engine with HTTP providers built from configuration.
    pub fn from_config(
        config: &TasklaneConfig,
        executor: Arc<dyn ActionExecutor>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let chain = ProviderChain::from_config(&config.providers);
        info!(providers = ?chain.names(), "Command engine configured");
        Ok(Self::new(
            Arc::new(chain),
            executor,
            Arc::new(Telemetry::new()),
            config.policy,
            config.engine.clone(),
        ))
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn pending_suggestions(&self) -> usize {
        self.gate.pending_count()
    }

    /// Interpret one command and act on it according to the decision policy.
    ///
    /// Only total provider failure, content rejection and invalid input
    /// are errors. An unintelligible reply is a `Reject` response.
    pub async fn process_command(
        &self,
        text: &str,
        ctx: &UserContext,
    ) -> Result<CommandResponse, EngineError> {
        let command = text.trim();
        if command.is_empty() {
            return Err(EngineError::EmptyCommand);
        }
        let length = command.chars().count();
        if length > self.config.max_command_length {
            return Err(EngineError::CommandTooLong(self.config.max_command_length));
        }

        self.telemetry.record_request();
        let mut phase = CommandPhase::Received;
        info!(
            user = %ctx.user_id,
            chars = length,
            command = %truncate(command, 80),
            "Command received"
        );

        let mentions = date::scan(command, ctx.reference);
        debug!(mentions = mentions.len(), "Date expressions resolved");
        let prompt = prompt::build(command, &mentions, ctx);

        let (completion, parsed) = match self.interpret(prompt, ctx.reference).await {
            Ok(interpreted) => interpreted,
            Err(e) => {
                error!(user = %ctx.user_id, error = %e, "Command failed before parsing");
                return Err(e);
            }
        };
        advance(&mut phase, CommandPhase::Parsed)?;

        let ParseOutcome {
            actions,
            quality,
            dropped,
            ambiguous: flagged,
            clarification,
        } = parsed;

        let detected = if flagged {
            None
        } else {
            ambiguity::detect(&actions, &ctx.known)
        };
        if let Some(found) = &detected {
            debug!(reference = %found.reference, candidates = found.candidates.len(), "Ambiguous reference");
        }

        let decision = self
            .policy
            .decide(quality, &actions, flagged || detected.is_some());
        advance(&mut phase, decision.outcome.into())?;
        self.telemetry.record_outcome(decision.outcome);
        info!(
            outcome = %decision.outcome,
            reason = %decision.reason,
            min_confidence = ?decision.min_confidence,
            actions = actions.len(),
            dropped = dropped.len(),
            quality = %quality,
            provider = %completion.provider,
            "Command classified"
        );

        let mut response = CommandResponse {
            command: command.to_string(),
            actions,
            results: Vec::new(),
            auto_executed: decision.outcome == CommandOutcome::AutoExecute,
            outcome: decision.outcome,
            message: String::new(),
            clarification: None,
            suggestion_id: None,
            quality,
            dropped,
            provider: Some(completion.provider),
            execution_skipped: false,
        };

        match decision.outcome {
            CommandOutcome::Reject => {
                response.message = clarification
                    .clone()
                    .unwrap_or_else(|| NOT_UNDERSTOOD.to_string());
                response.clarification = clarification;
            }
            CommandOutcome::Clarify => {
                let question = clarification
                    .or_else(|| detected.map(|d| d.question))
                    .unwrap_or_else(|| NEED_DETAILS.to_string());
                response.message = question.clone();
                response.clarification = Some(question);
            }
            CommandOutcome::Suggest => {
                let id = self.gate.park(command, response.actions.clone());
                response.message = suggestion_message(&response.actions);
                response.suggestion_id = Some(id);
                debug!(suggestion_id = %id, "Suggestion parked");
            }
            CommandOutcome::AutoExecute => {
                let execution = self.execute_all(&response.actions, &ctx.caller).await;
                response.execution_skipped = execution.abandoned;
                response.message = if execution.results.is_empty() {
                    CALLER_GONE.to_string()
                } else {
                    summarize(&execution.results)
                };
                response.results = execution.results;
            }
        }

        Ok(response)
    }

    /// Execute a parked suggestion the user approved.
    pub async fn confirm_suggestion(
        &self,
        id: Uuid,
        ctx: &UserContext,
    ) -> Result<ConfirmationResponse, EngineError> {
        if !ctx.caller.is_connected() {
            return Err(EngineError::CallerGone);
        }
        let suggestion = self.gate.approve(id)?;
        info!(suggestion_id = %id, actions = suggestion.actions.len(), "Suggestion confirmed");

        let execution = self.execute_all(&suggestion.actions, &ctx.caller).await;
        let message = if execution.results.is_empty() {
            CALLER_GONE.to_string()
        } else {
            summarize(&execution.results)
        };
        Ok(ConfirmationResponse {
            suggestion_id: id,
            command: suggestion.command,
            actions: suggestion.actions,
            results: execution.results,
            message,
        })
    }

    /// Drop a parked suggestion without executing it.
    pub fn dismiss_suggestion(&self, id: Uuid) -> Result<(), EngineError> {
        if self.gate.dismiss(id) {
            info!(suggestion_id = %id, "Suggestion dismissed");
            Ok(())
        } else {
            Err(EngineError::SuggestionNotFound(id))
        }
    }

    /// Provider call and parsing, on a task of their own.
    ///
    /// The spawned task runs to completion even if the caller's future is
    /// dropped, so quota already spent still yields telemetry.
    async fn interpret(
        &self,
        prompt: Prompt,
        reference: NaiveDateTime,
    ) -> Result<(Completion, ParseOutcome), EngineError> {
        let chain = Arc::clone(&self.chain);
        let telemetry = Arc::clone(&self.telemetry);

        let handle = tokio::spawn(async move {
            let completion = chain.complete(&prompt, &telemetry).await?;
            let parsed = extract::parse(&completion.text, reference);
            telemetry.record_parse(parsed.quality);
            telemetry.record_dropped(parsed.dropped.len());
            for action in &parsed.actions {
                telemetry.record_confidence(action.confidence);
            }
            Ok::<_, ChainError>((completion, parsed))
        });

        let interpreted = handle
            .await
            .map_err(|e| EngineError::Internal(format!("provider task failed: {}", e)))??;
        Ok(interpreted)
    }

    /// Execute every action in order, expanding bulk actions item by item.
    ///
    /// Stops as soon as the caller disconnects; nothing after that point
    /// reaches the executor.
    async fn execute_all(&self, actions: &[Action], caller: &CallerHandle) -> Execution {
        let mut results = Vec::new();
        let mut abandoned = false;

        'actions: for (action_index, action) in actions.iter().enumerate() {
            let steps: Vec<(Option<usize>, Result<Action, String>)> = match &action.body {
                ActionBody::CreateBulk { data } => data
                    .items
                    .iter()
                    .enumerate()
                    .map(|(item_index, item)| (Some(item_index), expand_item(action, item)))
                    .collect(),
                _ => vec![(None, Ok(action.clone()))],
            };

            for (item_index, step) in steps {
                let outcome = match step {
                    Err(reason) => {
                        warn!(action_index, item_index = ?item_index, reason = %reason, "Skipping invalid bulk item");
                        ExecutionOutcome::failed(ExecutionErrorKind::Validation, reason)
                    }
                    Ok(_) if !caller.is_connected() => {
                        abandoned = true;
                        break 'actions;
                    }
                    Ok(step) => self.executor.execute(&step).await,
                };

                self.telemetry.record_execution(outcome.ok);
                results.push(ActionResult {
                    action_index,
                    item_index,
                    kind: action.kind(),
                    entity: action.entity,
                    outcome,
                });
            }
        }

        if abandoned {
            warn!(executed = results.len(), "Caller disconnected, execution abandoned");
            self.telemetry.record_abandoned();
        }

        Execution { results, abandoned }
    }
}

fn advance(phase: &mut CommandPhase, next: CommandPhase) -> Result<(), EngineError> {
    validate_transition(*phase, next)?;
    debug!(from = %phase, to = %next, "Command phase transition");
    *phase = next;
    Ok(())
}

/// The single `create` a bulk item stands for.
fn expand_item(action: &Action, item: &BulkItem) -> Result<Action, String> {
    match item {
        BulkItem::Valid { data } => Ok(Action {
            entity: action.entity,
            body: ActionBody::Create { data: data.clone() },
            confidence: action.confidence,
            explanation: action.explanation.clone(),
        }),
        BulkItem::Invalid { reason } => Err(reason.clone()),
    }
}

fn suggestion_message(actions: &[Action]) -> String {
    let lines: Vec<String> = actions
        .iter()
        .map(|a| {
            if a.explanation.is_empty() {
                a.describe()
            } else {
                format!("{} ({})", a.describe(), a.explanation)
            }
        })
        .collect();
    format!("¿Confirmas estas acciones? {}", lines.join("; "))
}

fn summarize(results: &[ActionResult]) -> String {
    let ok = results.iter().filter(|r| r.outcome.ok).count();
    match results {
        [only] if only.outcome.ok && only.outcome.message.is_some() => {
            only.outcome.message.clone().unwrap_or_default()
        }
        _ => format!("{} de {} acciones completadas.", ok, results.len()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::InMemoryWorkspace;
    use crate::provider::{CompletionProvider, ScriptedProvider};
    use crate::types::ParseQuality;
    use chrono::NaiveDate;
    use tasklane_core::EntityKind;

    fn reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn engine_with(reply: &str, workspace: Arc<InMemoryWorkspace>) -> CommandEngine {
        let provider: Arc<dyn CompletionProvider> =
            Arc::new(ScriptedProvider::new("fast").reply(reply));
        CommandEngine::new(
            Arc::new(ProviderChain::new(vec![provider])),
            workspace,
            Arc::new(Telemetry::new()),
            PolicyConfig::default(),
            EngineConfig::default(),
        )
    }

    fn ctx() -> UserContext {
        UserContext::new("u1", reference())
    }

    #[tokio::test]
    async fn test_empty_and_long_commands_rejected_early() {
        let engine = engine_with("[]", Arc::new(InMemoryWorkspace::new()));
        assert!(matches!(
            engine.process_command("   ", &ctx()).await,
            Err(EngineError::EmptyCommand)
        ));
        let long = "a".repeat(1001);
        assert!(matches!(
            engine.process_command(&long, &ctx()).await,
            Err(EngineError::CommandTooLong(1000))
        ));
        assert_eq!(engine.telemetry().snapshot().total_requests, 0);
    }

    #[tokio::test]
    async fn test_query_auto_executes_with_executor_message() {
        let ws = Arc::new(InMemoryWorkspace::new());
        ws.seed(EntityKind::Task, "Comprar pan");
        let engine = engine_with(
            r#"{"actions":[{"type":"query","entity":"task","query":"pendientes","confidence":0.95}]}"#,
            ws,
        );
        let response = engine.process_command("¿qué tengo pendiente?", &ctx()).await.unwrap();
        assert!(response.auto_executed);
        assert_eq!(response.message, "1 resultados: Comprar pan");
        assert_eq!(response.provider.as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn test_reject_uses_model_clarification() {
        let engine = engine_with(
            r#"{"actions": [], "clarification": "No es un comando de tareas."}"#,
            Arc::new(InMemoryWorkspace::new()),
        );
        let response = engine.process_command("hola", &ctx()).await.unwrap();
        assert_eq!(response.outcome, CommandOutcome::Reject);
        assert_eq!(response.message, "No es un comando de tareas.");
        assert_eq!(response.quality, ParseQuality::Clean);
    }

    #[tokio::test]
    async fn test_detected_ambiguity_asks_which_one() {
        let ws = Arc::new(InMemoryWorkspace::new());
        ws.seed(EntityKind::Task, "Informe mensual");
        ws.seed(EntityKind::Task, "Informe anual");
        let engine = engine_with(
            r#"{"actions":[{"type":"complete","entity":"task","target":"informe","confidence":0.95}]}"#,
            Arc::clone(&ws),
        );
        let ctx = ctx().with_known(ws.known_entities());
        let response = engine.process_command("completa el informe", &ctx).await.unwrap();
        assert_eq!(response.outcome, CommandOutcome::Clarify);
        assert_eq!(
            response.clarification.as_deref(),
            Some("¿A cuál te refieres: \"Informe mensual\", \"Informe anual\"?")
        );
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn test_dismiss_unknown_suggestion() {
        let engine = engine_with("[]", Arc::new(InMemoryWorkspace::new()));
        assert!(matches!(
            engine.dismiss_suggestion(Uuid::new_v4()),
            Err(EngineError::SuggestionNotFound(_))
        ));
    }

    #[test]
    fn test_summarize_counts() {
        let result = |ok: bool| ActionResult {
            action_index: 0,
            item_index: None,
            kind: tasklane_core::ActionKind::Create,
            entity: EntityKind::Task,
            outcome: if ok {
                ExecutionOutcome::succeeded(Some("task-1".to_string()))
            } else {
                ExecutionOutcome::failed(ExecutionErrorKind::NotFound, "x")
            },
        };
        assert_eq!(
            summarize(&[result(true), result(false), result(true)]),
            "2 de 3 acciones completadas."
        );
        assert_eq!(summarize(&[result(true)]), "1 de 1 acciones completadas.");
    }
}
