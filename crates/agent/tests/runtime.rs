//! Swarm runtime behaviour: live config across agents, auth resume,
//! workspace points and queueing.

mod common;

use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

use common::{HarnessBuilder, LoopingModel, ScriptedModel, agent_doc, module, text, tool_call};
use swarmloop_core::event::AUTH_GRANTED;
use swarmloop_core::{
    Error, InboundEvent, PatchOp, PatchProposal, PatchResult, PatchScope, PatchSource, StepContext,
    TurnStatus,
};
use swarmloop_pipeline::PipelinePoint;

fn live_swarm(extra_policy: Value) -> Value {
    let mut swarm = json!({
        "policy": {
            "maxStepsPerTurn": 8,
            "liveConfig": {
                "enabled": true,
                "applyAt": ["step.config"],
                "allowedPaths": {
                    "swarmAbsolute": ["/policy"],
                    "agentRelative": ["/modelConfig", "/extensions"]
                }
            }
        }
    });
    if let (Some(policy), Value::Object(extra)) = (swarm["policy"].as_object_mut(), extra_policy) {
        policy.extend(extra);
    }
    swarm
}

#[tokio::test]
async fn swarm_patch_applies_at_first_safe_point_and_only_once() {
    let h = HarnessBuilder::new().swarm(live_swarm(json!({}))).build();
    let planner_model = LoopingModel::new();
    let writer_model = ScriptedModel::new(vec![text("drafted")]);
    let planner = h
        .runtime
        .add_agent("planner", agent_doc(&[]), planner_model.clone())
        .await
        .unwrap();
    let writer = h
        .runtime
        .add_agent("writer", agent_doc(&[]), writer_model.clone())
        .await
        .unwrap();

    h.runtime
        .live_config()
        .propose_patch(
            PatchProposal::json6902(vec![PatchOp::replace("/policy/maxStepsPerTurn", json!(2))])
                .scope(PatchScope::Swarm)
                .source(PatchSource::new("sidecar", "budget")),
            "planner",
        )
        .await
        .unwrap();

    let turn = planner.submit(InboundEvent::text("plan")).await.unwrap();
    assert_eq!(turn.steps.len(), 2);
    assert!(turn.metadata.step_limit_reached);

    let first = &planner_model.requests()[0];
    assert_eq!(first.effective_config.revision, 1);
    assert_eq!(first.effective_config.swarm["policy"]["maxStepsPerTurn"], 2);

    let turn = writer.submit(InboundEvent::text("write")).await.unwrap();
    assert_eq!(turn.status, TurnStatus::Completed);
    let seen = &writer_model.requests()[0].effective_config;
    assert_eq!(seen.revision, 0);
    assert_eq!(seen.swarm["policy"]["maxStepsPerTurn"], 2);

    let status = h
        .runtime
        .live_config()
        .statuses("writer")
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(status.result, PatchResult::Applied);
    assert_eq!(status.reason.as_deref(), Some("alreadyApplied"));
}

#[tokio::test]
async fn patch_proposed_by_a_tool_applies_on_the_next_step() {
    let h = HarnessBuilder::new().swarm(live_swarm(json!({}))).build();
    let model = ScriptedModel::new(vec![
        tool_call("t1", "tune", json!({"temperature": 0.9})),
        text("tuned"),
    ]);
    let agent = h
        .runtime
        .add_agent("planner", agent_doc(&[]), model.clone())
        .await
        .unwrap();

    let turn = agent.submit(InboundEvent::text("be creative")).await.unwrap();
    assert_eq!(turn.status, TurnStatus::Completed);
    assert_eq!(turn.tool_results[0].output["result"]["patch"], "p-000001");

    let requests = model.requests();
    assert_eq!(requests[0].params["temperature"], 0);
    assert_eq!(requests[1].params["temperature"], 0.9);
    assert_eq!(requests[1].effective_config.revision, 1);

    let statuses = h.runtime.live_config().statuses("planner").await.unwrap();
    let last = statuses.last().unwrap();
    assert_eq!(last.result, PatchResult::Applied);
    assert_eq!(last.applied_in_step_id.as_deref(), Some(turn.steps[1].id.as_str()));
}

#[tokio::test]
async fn extension_added_by_patch_loads_in_the_same_step() {
    let tagger = module(|api| {
        api.mutate(PipelinePoint::StepConfig, |mut ctx: StepContext| async move {
            ctx.turn.metadata.extra.insert("tagged".into(), json!(true));
            Ok(ctx)
        })?;
        Ok(())
    });
    let h = HarnessBuilder::new()
        .swarm(live_swarm(json!({})))
        .extension("tagger", tagger)
        .build();
    let agent = h
        .runtime
        .add_agent("planner", agent_doc(&[]), ScriptedModel::new(vec![text("a"), text("b")]))
        .await
        .unwrap();

    let turn = agent.submit(InboundEvent::text("first")).await.unwrap();
    assert!(!turn.metadata.extra.contains_key("tagged"));

    h.runtime
        .live_config()
        .propose_patch(
            PatchProposal::json6902(vec![PatchOp::add("/extensions/-", json!("tagger"))]),
            "planner",
        )
        .await
        .unwrap();

    let turn = agent.submit(InboundEvent::text("second")).await.unwrap();
    assert_eq!(turn.metadata.extra["tagged"], true);
}

#[tokio::test]
async fn broken_extension_fails_the_turn() {
    let h = HarnessBuilder::new().build();
    let agent = h
        .runtime
        .add_agent("planner", agent_doc(&["missing"]), ScriptedModel::new(vec![]))
        .await
        .unwrap();

    let turn = agent.submit(InboundEvent::text("hi")).await.unwrap();
    assert_eq!(turn.status, TurnStatus::Failed);
    assert_eq!(turn.metadata.error.as_ref().unwrap().name, "ExtensionError");
}

#[tokio::test]
async fn auth_granted_queues_a_resume_turn() {
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = kinds.clone();
    let observer = module(move |api| {
        let sink = sink.clone();
        api.mutate(PipelinePoint::TurnPre, move |ctx: StepContext| {
            let sink = sink.clone();
            async move {
                let extra = &ctx.turn.metadata.extra;
                sink.lock().unwrap().push((
                    extra.get("type").cloned(),
                    extra.get("resume").and_then(|r| r.get("authSessionId")).cloned(),
                ));
                Ok(ctx)
            }
        })?;
        Ok(())
    });
    let h = HarnessBuilder::new().extension("observer", observer).build();
    let model = ScriptedModel::new(vec![text("resumed"), text("next answer")]);
    let agent = h
        .runtime
        .add_agent("planner", agent_doc(&["observer"]), model.clone())
        .await
        .unwrap();

    h.runtime.events().emit(
        AUTH_GRANTED,
        json!({"agentName": "planner", "authSessionId": "sess-1"}),
    );
    // Unknown agents are ignored.
    h.runtime
        .events()
        .emit(AUTH_GRANTED, json!({"agentName": "ghost"}));

    let turn = agent.submit(InboundEvent::text("next")).await.unwrap();
    assert_eq!(turn.summary.as_deref(), Some("next answer"));
    assert_eq!(agent.completed_turns(), 2);

    let requests = model.requests();
    assert!(requests[0].messages.is_empty());
    assert_eq!(requests[1].messages[0].content, "next");

    let kinds = kinds.lock().unwrap();
    assert_eq!(kinds[0], (Some(json!(AUTH_GRANTED)), Some(json!("sess-1"))));
    assert_eq!(kinds[1], (None, None));
}

#[tokio::test]
async fn workspace_points_run_outside_turns() {
    let indexer = module(|api| {
        api.mutate(PipelinePoint::WorkspaceRepoAvailable, |mut ctx: StepContext| async move {
            if let Some(Value::Object(payload)) = ctx.workspace.as_mut() {
                payload.insert("indexed".into(), json!(true));
            }
            Ok(ctx)
        })?;
        Ok(())
    });
    let h = HarnessBuilder::new().extension("indexer", indexer).build();
    let model = ScriptedModel::new(vec![]);
    h.runtime
        .add_agent("planner", agent_doc(&["indexer"]), model.clone())
        .await
        .unwrap();

    let out = h
        .runtime
        .notify_workspace("planner", PipelinePoint::WorkspaceRepoAvailable, json!({"repo": "acme/app"}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out["repo"], "acme/app");
    assert_eq!(out["indexed"], true);

    let err = h
        .runtime
        .notify_workspace("planner", PipelinePoint::StepPre, json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind_name(), "PipelineError");

    let err = h
        .runtime
        .notify_workspace("nobody", PipelinePoint::WorkspaceRepoAvailable, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn queued_turns_run_in_order() {
    let h = HarnessBuilder::new().build();
    let model = ScriptedModel::new(vec![]);
    let agent = h
        .runtime
        .add_agent("planner", agent_doc(&[]), model.clone())
        .await
        .unwrap();

    for input in ["one", "two", "three"] {
        agent.enqueue(InboundEvent::text(input)).unwrap();
    }
    let last = agent.submit(InboundEvent::text("four")).await.unwrap();
    assert_eq!(last.status, TurnStatus::Completed);

    let inputs: Vec<String> = model
        .requests()
        .iter()
        .map(|r| r.messages[0].content.clone())
        .collect();
    assert_eq!(inputs, vec!["one", "two", "three", "four"]);

    let status = agent.status();
    assert_eq!(status.agent, "planner");
    assert_eq!(status.completed_turns, 4);
    assert_eq!(status.queued, 0);
    assert!(!status.paused);
}

#[tokio::test]
async fn agent_names_are_unique() {
    let h = HarnessBuilder::new().build();
    h.runtime
        .add_agent("planner", agent_doc(&[]), ScriptedModel::new(vec![]))
        .await
        .unwrap();
    let err = h
        .runtime
        .add_agent("planner", agent_doc(&[]), ScriptedModel::new(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
    assert_eq!(h.runtime.agent_names(), vec!["planner"]);
}
