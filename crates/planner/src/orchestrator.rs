//! The planning loop.
//!
//! One request walks an explicit state machine:
//!
//! ```text
//!                  ┌──────────── next round ◀───────────┐
//!                  ▼                                    │
//! INIT ──▶ AwaitingModel ──tool call──▶ ToolRequested ──┤
//!                  │                          │         └─ ceiling ─▶ Fallback
//!                  │ text                     │ malformed, has text
//!                  ▼                          ▼
//!            FinalCandidate ◀─────────────────┘
//!                  │
//!                  ├─ plan extracted and valid ─▶ Success
//!                  └─ otherwise ────────────────▶ Fallback
//! ```
//!
//! Every blocking point (round delay, model call, search) races the request
//! deadline. A transport failure or expired deadline before any round has
//! completed is a hard error, unless first-call fallback is enabled;
//! afterwards it degrades to the fallback plan.

use crate::extract;
use crate::fallback;
use crate::prompt;
use crate::state::ConversationState;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};
use tripforge_core::error::{PlanError, ProviderError, ToolError};
use tripforge_core::message::{Message, MessageToolCall};
use tripforge_core::provider::{Provider, ProviderRequest, ToolDefinition};
use tripforge_core::search::SearchProvider;
use tripforge_core::tool::{Tool, ToolCall};
use tripforge_core::trip::{TripPlan, TripRequest};
use tripforge_tools::web_search::{SearchLimits, TOOL_NAME, WebSearchTool};

/// Why a run ended with the placeholder plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The model kept asking for searches past the round limit
    IterationCeiling,
    /// The conversation outgrew the context ceiling
    ContextCeiling,
    /// The final reply held no valid plan
    UnusableReply,
    /// A model call failed after at least one completed round
    ModelUnavailable(String),
    /// The request deadline expired after at least one completed round, or
    /// earlier with first-call fallback enabled
    DeadlineExceeded,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationCeiling => write!(f, "search round limit reached"),
            Self::ContextCeiling => write!(f, "context size limit reached"),
            Self::UnusableReply => write!(f, "model reply held no valid plan"),
            Self::ModelUnavailable(e) => write!(f, "model unavailable: {e}"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Where the returned plan came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Model,
    Fallback(FallbackReason),
}

/// A finished planning run.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: TripPlan,
    pub provenance: Provenance,
    /// Completed tool rounds
    pub rounds: u32,
    pub model_calls: u32,
    pub search_calls: u32,
}

impl PlanOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self.provenance, Provenance::Fallback(_))
    }
}

enum State {
    AwaitingModel,
    ToolRequested { text: String, call: MessageToolCall },
    FinalCandidate { text: String },
    Success(TripPlan),
    Fallback(FallbackReason),
}

enum Interruption {
    Deadline,
    Transport(ProviderError),
}

/// Turns a [`TripRequest`] into a [`TripPlan`] by talking to a model that
/// may call web search.
///
/// Holds no per-request state, so one planner serves concurrent requests.
pub struct TripPlanner {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    search: WebSearchTool,
    system_prompt: String,
    max_iterations: u32,
    max_context_chars: usize,
    round_delay: Duration,
    deadline: Duration,
    fallback_on_first_call_failure: bool,
}

impl TripPlanner {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            search: WebSearchTool::new(search, SearchLimits::default()),
            system_prompt: prompt::SYSTEM_PROMPT.to_string(),
            max_iterations: 3,
            max_context_chars: 20_000,
            round_delay: Duration::from_secs(1),
            deadline: Duration::from_secs(180),
            fallback_on_first_call_failure: false,
        }
    }

    /// Build a planner with every setting taken from configuration.
    pub fn from_config(
        config: &tripforge_config::AppConfig,
        provider: Arc<dyn Provider>,
        search: Arc<dyn SearchProvider>,
    ) -> tripforge_core::Result<Self> {
        let settings = &config.planner;
        let mut planner = Self::new(provider, &config.default_model, search)
            .with_temperature(config.default_temperature)
            .with_search_limits(SearchLimits::from(&config.search))
            .with_max_iterations(settings.max_iterations)
            .with_max_context_chars(settings.max_context_chars)
            .with_round_delay(Duration::from_millis(settings.round_delay_ms))
            .with_deadline(Duration::from_secs(settings.deadline_secs))
            .with_first_call_fallback(settings.fallback_on_first_call_failure);

        if let Some(max) = config.default_max_tokens {
            planner = planner.with_max_tokens(max);
        }

        if let Some(path) = &settings.system_prompt_path {
            let system_prompt = prompt::load_system_prompt(std::path::Path::new(path))
                .map_err(|e| tripforge_core::Error::Config {
                    message: format!("cannot load system prompt from {path}: {e}"),
                })?;
            planner = planner.with_system_prompt(system_prompt);
        }

        Ok(planner)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_search_limits(mut self, limits: SearchLimits) -> Self {
        self.search = self.search.with_limits(limits);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Search rounds allowed before the fallback plan is used.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    /// Pause before every model call after the first.
    pub fn with_round_delay(mut self, delay: Duration) -> Self {
        self.round_delay = delay;
        self
    }

    /// Wall-clock budget for one `run`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Return the fallback plan instead of an error when the very first
    /// model call fails.
    pub fn with_first_call_fallback(mut self, enabled: bool) -> Self {
        self.fallback_on_first_call_failure = enabled;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Plan one trip.
    ///
    /// Returns a validated plan on every path except a failure of the first
    /// model call (see [`TripPlanner::with_first_call_fallback`]).
    pub async fn run(&self, request: &TripRequest) -> Result<PlanOutcome, PlanError> {
        let deadline = Instant::now() + self.deadline;
        let mut conv =
            ConversationState::new(&self.system_prompt, prompt::render_user_prompt(request));
        let tools = vec![self.search.to_definition()];

        info!(
            conversation_id = %conv.id(),
            from = %request.start_position,
            to = %request.end_position,
            model = %self.model,
            "Planning trip"
        );

        let mut state = State::AwaitingModel;
        loop {
            state = match state {
                State::AwaitingModel => self.await_model(&mut conv, &tools, deadline).await?,
                State::ToolRequested { text, call } => {
                    self.run_tool(&mut conv, text, call, deadline).await?
                }
                State::FinalCandidate { text } => Self::finalize(&text, request),
                State::Success(plan) => {
                    info!(
                        conversation_id = %conv.id(),
                        rounds = conv.iterations(),
                        searches = conv.search_calls(),
                        days = plan.daily_plan.len(),
                        "Trip planned"
                    );
                    return Ok(Self::outcome(plan, Provenance::Model, &conv));
                }
                State::Fallback(reason) => {
                    warn!(
                        conversation_id = %conv.id(),
                        rounds = conv.iterations(),
                        searches = conv.search_calls(),
                        reason = %reason,
                        "Returning placeholder plan"
                    );
                    let plan = fallback::fallback(request, conv.search_context().as_deref());
                    return Ok(Self::outcome(plan, Provenance::Fallback(reason), &conv));
                }
            };
        }
    }

    async fn await_model(
        &self,
        conv: &mut ConversationState,
        tools: &[ToolDefinition],
        deadline: Instant,
    ) -> Result<State, PlanError> {
        if conv.context_chars() > self.max_context_chars {
            return Ok(State::Fallback(FallbackReason::ContextCeiling));
        }

        if conv.iterations() > 0
            && !self.round_delay.is_zero()
            && timeout_at(deadline, sleep(self.round_delay)).await.is_err()
        {
            return self.interrupted(conv, Interruption::Deadline);
        }

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: conv.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tools.to_vec(),
        };

        debug!(
            conversation_id = %conv.id(),
            round = conv.iterations() + 1,
            context_chars = conv.context_chars(),
            "Calling model"
        );

        let mut reply = match timeout_at(deadline, self.provider.complete(request)).await {
            Err(_) => return self.interrupted(conv, Interruption::Deadline),
            Ok(Err(e)) => return self.interrupted(conv, Interruption::Transport(e)),
            Ok(Ok(response)) => response.message,
        };
        conv.record_model_call();

        // Providers expect a result for every call they issued, so drop the
        // calls that will not be run.
        if reply.tool_calls.len() > 1 {
            debug!(
                ignored = reply.tool_calls.len() - 1,
                "Model requested several tool calls, running the first"
            );
            reply.tool_calls.truncate(1);
        }

        let text = reply.content.clone();
        let call = reply.tool_calls.first().cloned();
        conv.push(reply);

        Ok(match call {
            Some(call) => State::ToolRequested { text, call },
            None => State::FinalCandidate { text },
        })
    }

    fn interrupted(
        &self,
        conv: &ConversationState,
        cause: Interruption,
    ) -> Result<State, PlanError> {
        if conv.iterations() == 0 && !self.fallback_on_first_call_failure {
            let error = match cause {
                Interruption::Deadline => PlanError::DeadlineExceeded {
                    deadline_secs: self.deadline.as_secs(),
                },
                Interruption::Transport(e) => PlanError::ModelUnavailable(e),
            };
            warn!(conversation_id = %conv.id(), error = %error, "Planning failed");
            return Err(error);
        }

        Ok(State::Fallback(match cause {
            Interruption::Deadline => FallbackReason::DeadlineExceeded,
            Interruption::Transport(e) => FallbackReason::ModelUnavailable(e.to_string()),
        }))
    }

    async fn run_tool(
        &self,
        conv: &mut ConversationState,
        text: String,
        call: MessageToolCall,
        deadline: Instant,
    ) -> Result<State, PlanError> {
        let outcome = if call.name != TOOL_NAME {
            Err(ToolError::NotFound(call.name.clone()))
        } else {
            match serde_json::from_str::<Value>(&call.arguments) {
                Ok(arguments) => {
                    let tool_call = ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments,
                    };
                    match timeout_at(deadline, self.search.execute(tool_call)).await {
                        Ok(result) => result,
                        Err(_) => return self.interrupted(conv, Interruption::Deadline),
                    }
                }
                Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
            }
        };

        match outcome {
            Ok(result) => {
                debug!(
                    conversation_id = %conv.id(),
                    has_hits = result.success,
                    output_chars = result.output.chars().count(),
                    "Search result added"
                );
                conv.record_search(&result.output);
                conv.push(Message::tool_result(&call.id, result.output));
            }
            Err(e) => {
                warn!(conversation_id = %conv.id(), tool = %call.name, error = %e, "Malformed tool call");
                if !text.trim().is_empty() {
                    return Ok(State::FinalCandidate { text });
                }
                conv.push(Message::tool_result(&call.id, prompt::MALFORMED_SEARCH_NOTE));
            }
        }

        conv.complete_round();
        Ok(self.next_round(conv))
    }

    fn next_round(&self, conv: &ConversationState) -> State {
        if conv.iterations() >= self.max_iterations {
            State::Fallback(FallbackReason::IterationCeiling)
        } else if conv.context_chars() > self.max_context_chars {
            State::Fallback(FallbackReason::ContextCeiling)
        } else {
            State::AwaitingModel
        }
    }

    fn finalize(text: &str, request: &TripRequest) -> State {
        let Some(mut plan) = extract::extract_plan(text) else {
            debug!(reply_chars = text.chars().count(), "No plan found in model reply");
            return State::Fallback(FallbackReason::UnusableReply);
        };

        plan.backfill_from(request);
        match plan.validate() {
            Ok(()) => State::Success(plan),
            Err(violation) => {
                warn!(violation = %violation, "Model plan failed validation");
                State::Fallback(FallbackReason::UnusableReply)
            }
        }
    }

    fn outcome(plan: TripPlan, provenance: Provenance, conv: &ConversationState) -> PlanOutcome {
        PlanOutcome {
            plan,
            provenance,
            rounds: conv.iterations(),
            model_calls: conv.model_calls(),
            search_calls: conv.search_calls(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tripforge_core::error::SearchError;
    use tripforge_core::message::Role;
    use tripforge_core::provider::ProviderResponse;
    use tripforge_core::search::SearchResultItem;

    enum Step {
        Reply(Message),
        Fail(ProviderError),
        Hang,
    }

    /// Replays a fixed list of model replies and records every request.
    struct ScriptedProvider {
        steps: Mutex<VecDeque<Step>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(message)) => Ok(ProviderResponse {
                    message,
                    usage: None,
                    model: "scripted".into(),
                }),
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Hang) => std::future::pending().await,
                None => Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "script exhausted".into(),
                }),
            }
        }
    }

    struct CountingSearch {
        items: Vec<SearchResultItem>,
        calls: AtomicU32,
        queries: Mutex<Vec<String>>,
    }

    impl CountingSearch {
        fn new(items: Vec<SearchResultItem>) -> Arc<Self> {
            Arc::new(Self {
                items,
                calls: AtomicU32::new(0),
                queries: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for CountingSearch {
        fn name(&self) -> &str {
            "counting"
        }

        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchResultItem>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.items.clone())
        }
    }

    /// Answers the first `answered` searches, then never returns.
    struct StallingSearch {
        answered: u32,
        calls: AtomicU32,
    }

    impl StallingSearch {
        fn new(answered: u32) -> Arc<Self> {
            Arc::new(Self {
                answered,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for StallingSearch {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn search(&self, _: &str, _: usize) -> Result<Vec<SearchResultItem>, SearchError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.answered {
                return Ok(campsites());
            }
            std::future::pending().await
        }
    }

    fn campsites() -> Vec<SearchResultItem> {
        vec![
            SearchResultItem {
                title: "Kabak Bay Camping".into(),
                snippet: "Terraced camp above the bay".into(),
                link: "https://kabak.example".into(),
            },
            SearchResultItem {
                title: "Olympos Tree Houses".into(),
                snippet: "Camping near the ancient ruins".into(),
                link: "https://olympos.example".into(),
            },
        ]
    }

    fn request() -> TripRequest {
        TripRequest {
            user_id: "u-1".into(),
            name: "Aegean coast".into(),
            description: "Beach camping".into(),
            start_position: "Izmir".into(),
            end_position: "Antalya".into(),
            start_date: "2024-08-01".into(),
            end_date: "2024-08-02".into(),
        }
    }

    fn plan_value() -> Value {
        json!({
            "trip": {
                "user_id": "u-1",
                "name": "Aegean coast",
                "description": "Beach camping",
                "start_position": "Izmir",
                "end_position": "Antalya",
                "start_date": "2024-08-01",
                "end_date": "2024-08-02",
                "total_days": 2,
                "route_summary": "South along the coast"
            },
            "daily_plan": [
                {"day": 1, "date": "2024-08-01",
                 "location": {"name": "Kabak Bay Camping", "latitude": 36.46, "longitude": 29.12}},
                {"day": 2, "date": "2024-08-02",
                 "location": {"name": "Olympos Tree Houses", "latitude": 36.39, "longitude": 30.47}}
            ]
        })
    }

    fn plan_reply() -> Step {
        Step::Reply(Message::assistant(format!(
            "Here is your plan:\n```json\n{}\n```",
            plan_value()
        )))
    }

    fn tool_call(id: &str, name: &str, arguments: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn search_reply(id: &str, query: &str) -> Step {
        let arguments = json!({ "query": query }).to_string();
        Step::Reply(Message::assistant_with_tool_calls(
            "",
            vec![tool_call(id, TOOL_NAME, &arguments)],
        ))
    }

    fn planner(provider: Arc<ScriptedProvider>, search: Arc<CountingSearch>) -> TripPlanner {
        TripPlanner::new(provider, "test-model", search).with_round_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn direct_answer_needs_no_search() {
        let provider = ScriptedProvider::new(vec![plan_reply()]);
        let search = CountingSearch::new(campsites());

        let outcome = planner(provider.clone(), search.clone())
            .run(&request())
            .await
            .unwrap();

        assert_eq!(outcome.provenance, Provenance::Model);
        assert_eq!(outcome.plan, serde_json::from_value::<TripPlan>(plan_value()).unwrap());
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(outcome.search_calls, 0);
        assert_eq!(search.calls(), 0);

        let requests = provider.requests();
        assert_eq!(requests[0].model, "test-model");
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].tools[0].name, TOOL_NAME);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].messages[1].content.contains("Izmir"));
    }

    #[tokio::test]
    async fn one_search_then_answer() {
        let provider = ScriptedProvider::new(vec![
            search_reply("c1", "Izmir Antalya camping sites"),
            plan_reply(),
        ]);
        let search = CountingSearch::new(campsites());

        let outcome = planner(provider.clone(), search.clone())
            .run(&request())
            .await
            .unwrap();

        assert_eq!(outcome.provenance, Provenance::Model);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.search_calls, 1);
        assert_eq!(
            *search.queries.lock().unwrap(),
            vec!["Izmir Antalya camping sites".to_string()]
        );

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
        assert!(last.content.starts_with("Search Results:\n1. Kabak Bay Camping"));
    }

    #[tokio::test]
    async fn endless_searching_stops_at_round_limit() {
        let provider = ScriptedProvider::new(vec![
            search_reply("c1", "camping 1"),
            search_reply("c2", "camping 2"),
            search_reply("c3", "camping 3"),
            search_reply("c4", "camping 4"),
        ]);
        let search = CountingSearch::new(campsites());

        let outcome = planner(provider.clone(), search.clone())
            .with_max_iterations(3)
            .run(&request())
            .await
            .unwrap();

        assert_eq!(
            outcome.provenance,
            Provenance::Fallback(FallbackReason::IterationCeiling)
        );
        assert_eq!(search.calls(), 3);
        assert_eq!(outcome.search_calls, 3);
        assert_eq!(provider.requests().len(), 3);

        assert!(outcome.plan.validate().is_ok());
        assert_eq!(outcome.plan.trip.user_id, "u-1");
        let notes = outcome.plan.daily_plan[0].location.notes.as_deref().unwrap();
        assert!(notes.contains("Kabak Bay Camping"));
    }

    #[tokio::test]
    async fn oversized_context_falls_back_without_another_model_call() {
        let bulky: Vec<SearchResultItem> = (0..5)
            .map(|i| SearchResultItem {
                title: format!("Campsite {i}"),
                snippet: "x".repeat(400),
                link: format!("https://camp{i}.example"),
            })
            .collect();
        let provider = ScriptedProvider::new(vec![search_reply("c1", "camping"), plan_reply()]);
        let search = CountingSearch::new(bulky);
        let ceiling = prompt::render_user_prompt(&request()).chars().count() + 200;

        let outcome = planner(provider.clone(), search.clone())
            .with_system_prompt("Plan trips.")
            .with_max_context_chars(ceiling)
            .run(&request())
            .await
            .unwrap();

        assert_eq!(
            outcome.provenance,
            Provenance::Fallback(FallbackReason::ContextCeiling)
        );
        assert_eq!(search.calls(), 1);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn first_call_failure_is_a_hard_error() {
        let provider = ScriptedProvider::new(vec![Step::Fail(ProviderError::Network(
            "connection refused".into(),
        ))]);
        let search = CountingSearch::new(campsites());

        let err = planner(provider, search.clone())
            .run(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, PlanError::ModelUnavailable(ProviderError::Network(_))));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn first_call_failure_can_fall_back() {
        let provider = ScriptedProvider::new(vec![Step::Fail(ProviderError::Network(
            "connection refused".into(),
        ))]);

        let outcome = planner(provider, CountingSearch::new(campsites()))
            .with_first_call_fallback(true)
            .run(&request())
            .await
            .unwrap();

        assert!(matches!(
            outcome.provenance,
            Provenance::Fallback(FallbackReason::ModelUnavailable(ref e)) if e.contains("connection refused")
        ));
        assert!(outcome.plan.validate().is_ok());
    }

    #[tokio::test]
    async fn later_failure_falls_back() {
        let provider = ScriptedProvider::new(vec![
            search_reply("c1", "camping"),
            Step::Fail(ProviderError::RateLimited { retry_after_secs: 5 }),
        ]);
        let search = CountingSearch::new(campsites());

        let outcome = planner(provider, search.clone())
            .run(&request())
            .await
            .unwrap();

        assert!(matches!(
            outcome.provenance,
            Provenance::Fallback(FallbackReason::ModelUnavailable(_))
        ));
        assert_eq!(outcome.search_calls, 1);
        assert_eq!(outcome.plan.trip.start_position, "Izmir");
        assert_eq!(outcome.plan.trip.end_position, "Antalya");
    }

    #[tokio::test]
    async fn malformed_call_with_text_uses_the_text() {
        let reply = Message::assistant_with_tool_calls(
            plan_value().to_string(),
            vec![tool_call("c1", TOOL_NAME, "{}")],
        );
        let provider = ScriptedProvider::new(vec![Step::Reply(reply)]);
        let search = CountingSearch::new(campsites());

        let outcome = planner(provider.clone(), search.clone())
            .run(&request())
            .await
            .unwrap();

        assert_eq!(outcome.provenance, Provenance::Model);
        assert_eq!(search.calls(), 0);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn malformed_call_without_text_gets_a_note() {
        let reply =
            Message::assistant_with_tool_calls("", vec![tool_call("c1", TOOL_NAME, "not json")]);
        let provider = ScriptedProvider::new(vec![Step::Reply(reply), plan_reply()]);
        let search = CountingSearch::new(campsites());

        let outcome = planner(provider.clone(), search.clone())
            .run(&request())
            .await
            .unwrap();

        assert_eq!(outcome.provenance, Provenance::Model);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(search.calls(), 0);

        let requests = provider.requests();
        let note = requests[1].messages.last().unwrap();
        assert_eq!(note.role, Role::Tool);
        assert_eq!(note.content, prompt::MALFORMED_SEARCH_NOTE);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_run() {
        let reply = Message::assistant_with_tool_calls(
            "",
            vec![tool_call("c1", "get_weather", r#"{"city":"Antalya"}"#)],
        );
        let provider = ScriptedProvider::new(vec![Step::Reply(reply), plan_reply()]);
        let search = CountingSearch::new(campsites());

        let outcome = planner(provider, search.clone())
            .run(&request())
            .await
            .unwrap();

        assert_eq!(outcome.provenance, Provenance::Model);
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn only_the_first_tool_call_runs() {
        let reply = Message::assistant_with_tool_calls(
            "",
            vec![
                tool_call("c1", TOOL_NAME, r#"{"query":"first"}"#),
                tool_call("c2", TOOL_NAME, r#"{"query":"second"}"#),
            ],
        );
        let provider = ScriptedProvider::new(vec![Step::Reply(reply), plan_reply()]);
        let search = CountingSearch::new(campsites());

        let outcome = planner(provider.clone(), search.clone())
            .run(&request())
            .await
            .unwrap();

        assert_eq!(outcome.search_calls, 1);
        assert_eq!(*search.queries.lock().unwrap(), vec!["first".to_string()]);

        let requests = provider.requests();
        let assistant = &requests[1].messages[2];
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.tool_calls.len(), 1);
        assert_eq!(assistant.tool_calls[0].id, "c1");
    }

    #[tokio::test]
    async fn prose_reply_falls_back() {
        let provider = ScriptedProvider::new(vec![Step::Reply(Message::assistant(
            "Sorry, I cannot plan this trip.",
        ))]);

        let outcome = planner(provider, CountingSearch::new(campsites()))
            .run(&request())
            .await
            .unwrap();

        assert_eq!(
            outcome.provenance,
            Provenance::Fallback(FallbackReason::UnusableReply)
        );
        assert_eq!(outcome.model_calls, 1);
        assert!(outcome.is_fallback());
        assert!(outcome.plan.validate().is_ok());
    }

    #[tokio::test]
    async fn invalid_plan_falls_back() {
        let mut value = plan_value();
        value["daily_plan"][0]["location"]["latitude"] = json!(123.0);
        let provider =
            ScriptedProvider::new(vec![Step::Reply(Message::assistant(value.to_string()))]);

        let outcome = planner(provider, CountingSearch::new(campsites()))
            .run(&request())
            .await
            .unwrap();

        assert_eq!(
            outcome.provenance,
            Provenance::Fallback(FallbackReason::UnusableReply)
        );
    }

    #[tokio::test]
    async fn blank_trip_fields_are_backfilled() {
        let mut value = plan_value();
        value["trip"]["user_id"] = json!("");
        value["trip"]["total_days"] = json!(0);
        let provider =
            ScriptedProvider::new(vec![Step::Reply(Message::assistant(value.to_string()))]);

        let outcome = planner(provider, CountingSearch::new(campsites()))
            .run(&request())
            .await
            .unwrap();

        assert_eq!(outcome.provenance, Provenance::Model);
        assert_eq!(outcome.plan.trip.user_id, "u-1");
        assert_eq!(outcome.plan.trip.total_days, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_past_deadline_is_a_hard_error() {
        let provider = ScriptedProvider::new(vec![Step::Hang]);

        let err = planner(provider, CountingSearch::new(campsites()))
            .with_deadline(Duration::from_secs(30))
            .run(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, PlanError::DeadlineExceeded { deadline_secs: 30 }));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_after_a_round_falls_back() {
        let provider = ScriptedProvider::new(vec![search_reply("c1", "camping"), Step::Hang]);
        let search = CountingSearch::new(campsites());

        let outcome = planner(provider, search.clone())
            .with_deadline(Duration::from_secs(30))
            .run(&request())
            .await
            .unwrap();

        assert_eq!(
            outcome.provenance,
            Provenance::Fallback(FallbackReason::DeadlineExceeded)
        );
        assert_eq!(search.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rounds_are_spaced_by_the_delay() {
        let provider = ScriptedProvider::new(vec![search_reply("c1", "camping"), plan_reply()]);
        let started = Instant::now();

        let outcome = TripPlanner::new(provider, "test-model", CountingSearch::new(campsites()))
            .with_round_delay(Duration::from_secs(2))
            .run(&request())
            .await
            .unwrap();

        assert_eq!(outcome.provenance, Provenance::Model);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn first_search_past_deadline_is_a_hard_error() {
        let provider = ScriptedProvider::new(vec![search_reply("c1", "camping")]);
        let search = StallingSearch::new(0);

        let err = TripPlanner::new(provider.clone(), "test-model", search.clone())
            .with_deadline(Duration::from_secs(30))
            .run(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, PlanError::DeadlineExceeded { deadline_secs: 30 }));
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_search_past_deadline_can_fall_back() {
        let provider = ScriptedProvider::new(vec![search_reply("c1", "camping")]);

        let outcome = TripPlanner::new(provider, "test-model", StallingSearch::new(0))
            .with_deadline(Duration::from_secs(30))
            .with_first_call_fallback(true)
            .run(&request())
            .await
            .unwrap();

        assert_eq!(
            outcome.provenance,
            Provenance::Fallback(FallbackReason::DeadlineExceeded)
        );
        assert_eq!(outcome.rounds, 0);
        assert_eq!(outcome.search_calls, 0);
        assert!(outcome.plan.validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn later_search_past_deadline_falls_back() {
        let provider = ScriptedProvider::new(vec![
            search_reply("c1", "camping"),
            search_reply("c2", "more camping"),
        ]);
        let search = StallingSearch::new(1);

        let outcome = TripPlanner::new(provider.clone(), "test-model", search.clone())
            .with_round_delay(Duration::ZERO)
            .with_deadline(Duration::from_secs(30))
            .run(&request())
            .await
            .unwrap();

        assert_eq!(
            outcome.provenance,
            Provenance::Fallback(FallbackReason::DeadlineExceeded)
        );
        assert_eq!(outcome.rounds, 1);
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.requests().len(), 2);
        let notes = outcome.plan.daily_plan[0].location.notes.as_deref().unwrap();
        assert!(notes.contains("Kabak Bay Camping"));
    }

    #[tokio::test(start_paused = true)]
    async fn round_delay_past_deadline_falls_back() {
        let provider = ScriptedProvider::new(vec![search_reply("c1", "camping"), plan_reply()]);
        let started = Instant::now();

        let search = CountingSearch::new(campsites());
        let outcome = TripPlanner::new(provider.clone(), "test-model", search)
            .with_round_delay(Duration::from_secs(60))
            .with_deadline(Duration::from_secs(30))
            .run(&request())
            .await
            .unwrap();

        assert_eq!(
            outcome.provenance,
            Provenance::Fallback(FallbackReason::DeadlineExceeded)
        );
        assert_eq!(outcome.search_calls, 1);
        assert_eq!(provider.requests().len(), 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn concurrent_runs_are_independent() {
        let provider = ScriptedProvider::new(vec![plan_reply(), plan_reply()]);
        let planner = planner(provider.clone(), CountingSearch::new(campsites()));

        let other = TripRequest {
            user_id: "u-2".into(),
            ..request()
        };
        let first = request();
        let (a, b) = tokio::join!(planner.run(&first), planner.run(&other));

        assert_eq!(a.unwrap().model_calls, 1);
        assert_eq!(b.unwrap().model_calls, 1);
        for req in provider.requests() {
            // system + user only; no turns leak between runs
            assert_eq!(req.messages.len(), 2);
        }
    }

    #[test]
    fn planner_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TripPlanner>();
    }

    #[test]
    fn from_config_applies_settings() {
        let mut config = tripforge_config::AppConfig::default();
        config.default_model = "gemini-test".into();
        config.default_max_tokens = Some(2048);
        config.search.top_k = 3;
        config.planner.max_iterations = 5;
        config.planner.round_delay_ms = 250;
        config.planner.fallback_on_first_call_failure = true;

        let planner = TripPlanner::from_config(
            &config,
            ScriptedProvider::new(vec![]),
            CountingSearch::new(vec![]),
        )
        .unwrap();

        assert_eq!(planner.model(), "gemini-test");
        assert_eq!(planner.provider_name(), "scripted");
        assert_eq!(planner.max_tokens, Some(2048));
        assert_eq!(planner.search.limits().top_k, 3);
        assert_eq!(planner.max_iterations, 5);
        assert_eq!(planner.round_delay, Duration::from_millis(250));
        assert!(planner.fallback_on_first_call_failure);
        assert_eq!(planner.system_prompt, prompt::SYSTEM_PROMPT);
    }

    #[test]
    fn from_config_reads_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Plan only coastal trips.").unwrap();

        let mut config = tripforge_config::AppConfig::default();
        config.planner.system_prompt_path = Some(path.display().to_string());
        let planner = TripPlanner::from_config(
            &config,
            ScriptedProvider::new(vec![]),
            CountingSearch::new(vec![]),
        )
        .unwrap();
        assert_eq!(planner.system_prompt, "Plan only coastal trips.");

        config.planner.system_prompt_path = Some(dir.path().join("missing.txt").display().to_string());
        let result = TripPlanner::from_config(
            &config,
            ScriptedProvider::new(vec![]),
            CountingSearch::new(vec![]),
        );
        assert!(matches!(result, Err(tripforge_core::Error::Config { .. })));
    }
}
