use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use braid_core::traits::ConditionEvaluator;
use braid_engine::{builtin_agent, loader, Engine, ExpressionEvaluator};
use braid_test_utils::{recording_sink, vars, RecordingSink};

fn demo_engine(sink: Arc<RecordingSink>) -> Engine {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/claim_review.json");
    let definition = loader::load_file(&path).expect("demo definition loads");

    let evaluator: Arc<dyn ConditionEvaluator> = Arc::new(ExpressionEvaluator);
    let mut engine = Engine::new(evaluator.clone(), Default::default());
    for agent_id in definition.agent_refs() {
        engine.register_agent(agent_id, Arc::new(builtin_agent(sink.clone(), evaluator.clone())));
    }
    engine.load_process("claim_review", definition);
    engine
}

#[tokio::test]
async fn large_claim_goes_through_review_fork() {
    let sink = recording_sink();
    let engine = demo_engine(sink.clone());

    let ctx = engine
        .execute_process(
            "claim_review",
            vars(&[
                ("amount", json!(5000)),
                ("customer", json!("Ana")),
                ("claim", json!("broken window")),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(
        ctx.path(),
        ["start", "screen", "route", "fork", "summarize", "letter", "join", "end"]
    );
    assert_eq!(ctx.get("needs_review"), Some(&json!(true)));
    assert_eq!(ctx.get_str("summary"), Some("broken window"));
    assert_eq!(
        ctx.get_str("letter"),
        Some("Dear Ana, your claim of 5000 is under review.")
    );
    assert_eq!(sink.task_ids().len(), 3);
}

#[tokio::test]
async fn small_claim_is_approved_directly() {
    let sink = recording_sink();
    let engine = demo_engine(sink.clone());

    let ctx = engine
        .execute_process(
            "claim_review",
            vars(&[("amount", json!(10)), ("customer", json!("Ana"))]),
        )
        .await
        .unwrap();

    assert_eq!(ctx.path(), ["start", "screen", "route", "approve", "end"]);
    assert_eq!(ctx.get_str("letter"), Some("Claim of 10 approved for Ana."));
    assert_eq!(sink.task_ids(), vec!["screen", "approve"]);
}
