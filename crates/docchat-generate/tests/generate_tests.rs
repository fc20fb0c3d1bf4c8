use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use docchat_core::traits::{FragmentStream, GenerationBackend};
use docchat_core::types::{ConversationTurn, GenerateOptions};
use docchat_core::{Error, GenerationError};
use docchat_generate::{consume, Orchestrator, StreamParser, StreamState};

enum Script {
    Fragments(Vec<&'static str>),
    RefuseToOpen,
    Hang,
}

struct ScriptedBackend {
    id: &'static str,
    script: Script,
    reply: Result<&'static str, GenerationError>,
    seen: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl ScriptedBackend {
    fn new(id: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self { id, script, reply: Ok("plain reply"), seen: Mutex::new(Vec::new()) })
    }

    fn with_reply(id: &'static str, reply: Result<&'static str, GenerationError>) -> Arc<Self> {
        Arc::new(Self { id, script: Script::RefuseToOpen, reply, seen: Mutex::new(Vec::new()) })
    }

    fn calls(&self) -> Vec<Vec<ConversationTurn>> { self.seen.lock().unwrap().clone() }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn engine_id(&self) -> &str { self.id }

    async fn generate(&self, messages: &[ConversationTurn], _options: &GenerateOptions) -> Result<String, GenerationError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.reply.clone().map(str::to_string)
    }

    async fn generate_streaming(&self, messages: &[ConversationTurn], _options: &GenerateOptions) -> Result<FragmentStream, GenerationError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        match &self.script {
            Script::Fragments(f) => Ok(stream::iter(f.iter().map(|s| Ok(s.to_string())).collect::<Vec<_>>()).boxed()),
            Script::RefuseToOpen => Err(GenerationError::Request { message: "connection refused".into() }),
            Script::Hang => Ok(stream::iter(vec![Ok("data: {\"type\":\"thinking\",\"content\":\"hm\"}\n".to_string())]).chain(stream::pending()).boxed()),
        }
    }
}

fn messages() -> Vec<ConversationTurn> {
    vec![ConversationTurn::system("ctx"), ConversationTurn::user("what is the pump pressure?")]
}

#[test]
fn split_event_line_parses_like_the_whole_line() {
    let mut split = StreamParser::new();
    split.feed("data: {\"ty");
    assert_eq!(split.state(), &StreamState::Accumulating);
    split.feed("pe\":\"final\",\"content\":\"Hello\"}\n");
    split.finish();

    let mut whole = StreamParser::new();
    whole.feed("data: {\"type\":\"final\",\"content\":\"Hello\"}\n");
    whole.finish();

    assert_eq!(split.content(), Some("Hello"));
    assert_eq!(split.content(), whole.content());
    assert_eq!(split.state(), &StreamState::Completed);
}

#[test]
fn thinking_metadata_and_sentinel_are_handled() {
    let mut p = StreamParser::new();
    assert_eq!(p.state(), &StreamState::AwaitingFirstEvent);
    p.feed("data: {\"type\":\"thinking\",\"content\":\"step one\"}\n: keepalive\n\n");
    p.feed("data: {\"type\":\"metadata\",\"data\":{\"a\":1,\"b\":2}}\ndata: {\"type\":\"metadata\",\"data\":{\"a\":3}}\n");
    p.feed("data: {\"type\":\"thinking\",\"content\":\"step two\"}\ndata: {\"type\":\"final\",\"content\":\"Done\"}\ndata: [DONE]\n");
    p.finish();
    assert_eq!(p.thinking_steps(), ["step one", "step two"]);
    assert_eq!(p.metadata().get("a"), Some(&serde_json::json!(3)));
    assert_eq!(p.metadata().get("b"), Some(&serde_json::json!(2)));
    let reply = p.into_result(60).unwrap();
    assert_eq!(reply.content, "Done");
}

#[test]
fn unterminated_last_line_is_parsed_at_end() {
    let mut p = StreamParser::new();
    p.feed("data: {\"type\":\"final\",\"content\":\"tail\"}");
    p.finish();
    assert_eq!(p.content(), Some("tail"));
}

#[test]
fn end_without_final_content_fails() {
    let mut p = StreamParser::new();
    p.feed("data: {\"type\":\"thinking\",\"content\":\"...\"}\n");
    p.finish();
    assert_eq!(p.state(), &StreamState::Failed(GenerationError::EmptyResponse));
}

#[test]
fn events_after_resolution_are_discarded() {
    let mut p = StreamParser::new();
    p.feed("data: {\"type\":\"final\",\"content\":\"first\"}\n");
    p.finish();
    p.feed("data: {\"type\":\"final\",\"content\":\"second\"}\n");
    p.time_out();
    p.fail(GenerationError::Stream { message: "late".into() });
    assert_eq!(p.state(), &StreamState::Completed);
    assert_eq!(p.content(), Some("first"));
}

#[tokio::test]
async fn deadline_forces_timed_out() {
    let stream: FragmentStream = stream::iter(vec![Ok("data: {\"type\":\"final\",\"content\":\"partial\"}\n".to_string())])
        .chain(stream::pending())
        .boxed();
    let parser = consume(stream, Instant::now() + Duration::from_millis(50)).await;
    assert_eq!(parser.state(), &StreamState::TimedOut);
    assert_eq!(parser.into_result(0), Err(GenerationError::Timeout { timeout_secs: 0 }));
}

#[tokio::test]
async fn stream_error_fails_the_parse() {
    let stream: FragmentStream = stream::iter(vec![
        Ok("data: {\"type\":\"final\",\"content\":\"x\"}\n".to_string()),
        Err(GenerationError::Stream { message: "reset".into() }),
    ])
    .boxed();
    let parser = consume(stream, Instant::now() + Duration::from_secs(5)).await;
    assert!(matches!(parser.state(), StreamState::Failed(GenerationError::Stream { .. })));
}

#[tokio::test]
async fn primary_success_is_recorded() {
    let primary = ScriptedBackend::new("primary", Script::Fragments(vec!["data: {\"type\":\"final\",\"content\":\"Hi\"}\n", "data: {\"type\":\"metadata\",\"data\":{\"tokens_used\":42}}\n"]));
    let secondary = ScriptedBackend::new("secondary", Script::RefuseToOpen);
    let orch = Orchestrator::new(primary.clone(), secondary.clone(), Duration::from_secs(5));
    let result = orch.answer(&messages()).await.unwrap();
    assert_eq!(result.content, "Hi");
    assert_eq!(result.engine_used, "primary");
    assert_eq!(result.tokens_used, 42);
    assert_eq!(result.metadata.get("engine_used"), Some(&serde_json::json!("primary")));
    assert!(secondary.calls().is_empty());
}

#[tokio::test]
async fn primary_failure_fails_over_with_identical_request() {
    let primary = ScriptedBackend::new("primary", Script::RefuseToOpen);
    let secondary = ScriptedBackend::new("secondary", Script::Fragments(vec!["data: {\"type\":\"fi", "nal\",\"content\":\"From backup\"}\n"]));
    let orch = Orchestrator::new(primary.clone(), secondary.clone(), Duration::from_secs(5));
    let result = orch.answer(&messages()).await.unwrap();
    assert_eq!(result.engine_used, "secondary");
    assert_eq!(result.content, "From backup");
    assert_eq!(result.tokens_used, 3);
    assert_eq!(primary.calls(), secondary.calls());
    assert_eq!(secondary.calls(), vec![messages()]);
}

#[tokio::test]
async fn primary_without_final_content_fails_over() {
    let primary = ScriptedBackend::new("primary", Script::Fragments(vec!["data: [DONE]\n"]));
    let secondary = ScriptedBackend::new("secondary", Script::Fragments(vec!["data: {\"type\":\"final\",\"content\":\"ok\"}\n"]));
    let orch = Orchestrator::new(primary, secondary, Duration::from_secs(5));
    assert_eq!(orch.answer(&messages()).await.unwrap().engine_used, "secondary");
}

#[tokio::test]
async fn primary_timeout_fails_over() {
    let primary = ScriptedBackend::new("primary", Script::Hang);
    let secondary = ScriptedBackend::new("secondary", Script::Fragments(vec!["data: {\"type\":\"final\",\"content\":\"late but here\"}\n"]));
    let orch = Orchestrator::new(primary, secondary, Duration::from_millis(100));
    let result = orch.answer(&messages()).await.unwrap();
    assert_eq!(result.engine_used, "secondary");
}

#[tokio::test]
async fn both_failing_is_a_typed_error() {
    let primary = ScriptedBackend::new("primary", Script::RefuseToOpen);
    let secondary = ScriptedBackend::new("secondary", Script::Hang);
    let orch = Orchestrator::new(primary, secondary, Duration::from_millis(50));
    match orch.answer(&messages()).await {
        Err(Error::GenerationFailed { primary, secondary }) => {
            assert!(primary.contains("connection refused"));
            assert!(secondary.contains("timed out"));
        }
        other => panic!("expected GenerationFailed, got {:?}", other.map(|r| r.content)),
    }
}

#[tokio::test]
async fn non_streaming_completion_fails_over() {
    let primary = ScriptedBackend::with_reply("primary", Err(GenerationError::Status { status: 503, body: "busy".into() }));
    let secondary = ScriptedBackend::with_reply("secondary", Ok("{\"query\": \"pump pressure\"}"));
    let orch = Orchestrator::new(primary, secondary, Duration::from_secs(5));
    let (text, engine) = orch.complete(&messages(), &GenerateOptions::default()).await.unwrap();
    assert_eq!(engine, "secondary");
    assert!(text.contains("pump pressure"));
}

#[tokio::test]
async fn streaming_through_the_orchestrator_fails_over_on_an_unresolved_stream() {
    let primary = ScriptedBackend::new("primary", Script::Fragments(vec!["data: {\"type\":\"thinking\",\"content\":\"hm\"}\n", "data: [DONE]\n"]));
    let secondary = ScriptedBackend::new("secondary", Script::Fragments(vec![
        "data: {\"type\":\"thinking\",\"content\":\"checking\"}\n",
        "data: {\"type\":\"final\",\"content\":\"From backup\"}\n",
        "data: {\"type\":\"metadata\",\"data\":{\"tokens_used\":9}}\n",
    ]));
    let orch = Orchestrator::new(primary.clone(), secondary.clone(), Duration::from_secs(5));
    let stream = orch.generate_streaming(&messages(), &GenerateOptions::default()).await.unwrap();
    let reply = consume(stream, Instant::now() + Duration::from_secs(5)).await.into_result(5).unwrap();
    assert_eq!(reply.content, "From backup");
    assert_eq!(reply.thinking_steps, vec!["checking".to_string()]);
    assert_eq!(reply.metadata.get("tokens_used"), Some(&serde_json::json!(9)));
    assert_eq!(reply.metadata.get("engine_used"), Some(&serde_json::json!("secondary")));
    assert_eq!(primary.calls().len(), 1);
    assert_eq!(secondary.calls().len(), 1);
}

#[tokio::test]
async fn streaming_through_the_orchestrator_honours_the_attempt_deadline() {
    let primary = ScriptedBackend::new("primary", Script::Hang);
    let secondary = ScriptedBackend::new("secondary", Script::Hang);
    let orch = Orchestrator::new(primary, secondary, Duration::from_millis(50));
    let started = Instant::now();
    let err = orch.generate_streaming(&messages(), &GenerateOptions::default()).await.err().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(err.to_string().contains("timed out"), "got {}", err);
}
