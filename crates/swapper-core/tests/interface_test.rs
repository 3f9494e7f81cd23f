// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Swapper interface tests: queue topology, idempotent deletion, pending queries.

mod common;

use common::*;
use swapper_core::SwapperError;
use swapper_core::queue::DurableQueue;
use swapper_protocol::{
    Command, CommandMethod, InferenceResult, ModelResult, Request, RequestBatch,
    unmarshal_scheduler_notification,
};

async fn pending_requests(ctx: &TestContext, model_id: &str) -> Vec<RequestBatch> {
    ctx.queue
        .pending(&ctx.swapper.input_queue_name(model_id))
        .await
        .iter()
        .map(|body| RequestBatch::from_message(body).unwrap())
        .collect()
}

fn single_command(batch: &RequestBatch) -> &Command {
    assert_eq!(batch.requests.len(), 1);
    match &batch.requests[0] {
        Request::Command(command) => command,
        other => panic!("expected command, got {:?}", other),
    }
}

#[tokio::test]
async fn test_define_model_creates_queue_and_submits_command() {
    let ctx = TestContext::new();

    let batch_id = ctx
        .swapper
        .define_model(MODEL_ID, define_args(), "cmd-define")
        .await
        .unwrap();

    let pending = pending_requests(&ctx, MODEL_ID).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].batch_id, batch_id);
    let command = single_command(&pending[0]);
    assert_eq!(command.command_id, "cmd-define");
    assert_eq!(command.method, CommandMethod::DefineModel);
    assert_eq!(command.args.as_ref(), Some(&define_args()));
}

#[tokio::test]
async fn test_delete_model_is_idempotent() {
    let ctx = TestContext::new();

    ctx.swapper.delete_model(MODEL_ID, "del-1").await.unwrap();
    ctx.swapper.delete_model(MODEL_ID, "del-2").await.unwrap();
    assert!(
        !ctx.queue
            .queue_exists(&ctx.swapper.input_queue_name(MODEL_ID))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_delete_model_purges_pending_input() {
    let ctx = TestContext::new();
    ctx.provision(MODEL_ID).await;
    ctx.swapper
        .submit_requests(MODEL_ID, vec![row(1, 1.0), row(2, 2.0)])
        .await
        .unwrap();

    ctx.swapper.delete_model(MODEL_ID, "del-1").await.unwrap();

    let pending = pending_requests(&ctx, MODEL_ID).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(single_command(&pending[0]).method, CommandMethod::DeleteModel);
}

#[tokio::test]
async fn test_submit_requests_to_unknown_model() {
    let ctx = TestContext::new();
    let err = ctx
        .swapper
        .submit_requests("nope", vec![row(1, 1.0)])
        .await
        .unwrap_err();
    assert!(matches!(err, SwapperError::ModelNotFound { ref model_id } if model_id == "nope"));
}

#[tokio::test]
async fn test_submit_requests_notifies_scheduler() {
    let ctx = TestContext::new();
    ctx.swapper.init_scheduler_notification().await.unwrap();
    ctx.provision(MODEL_ID).await;

    ctx.swapper
        .submit_requests(MODEL_ID, vec![row(1, 1.0)])
        .await
        .unwrap();

    let notices = ctx
        .queue
        .pending(&ctx.swapper.config().scheduler_notification_queue)
        .await;
    assert_eq!(notices.len(), 1);
    assert_eq!(unmarshal_scheduler_notification(&notices[0]).unwrap(), MODEL_ID);

    let mut consumer = ctx
        .swapper
        .consume_model_scheduler_notifications(false)
        .await
        .unwrap();
    let notice = consumer.next().await.unwrap().unwrap();
    assert_eq!(notice.batch.model_id, MODEL_ID);
}

#[tokio::test]
async fn test_submit_succeeds_without_scheduler_queue() {
    let ctx = TestContext::new();
    ctx.provision(MODEL_ID).await;

    ctx.swapper
        .submit_requests(MODEL_ID, vec![row(1, 1.0)])
        .await
        .unwrap();
    assert!(ctx.swapper.model_input_pending(MODEL_ID).await.unwrap());
}

#[tokio::test]
async fn test_submit_results_creates_results_queue() {
    let ctx = TestContext::new();
    let results_queue = ctx.swapper.config().results_queue.clone();
    assert!(!ctx.queue.queue_exists(&results_queue).await.unwrap());

    let results: Vec<ModelResult> = vec![InferenceResult::success(1, 0.5).into()];
    ctx.swapper
        .submit_results(MODEL_ID, results.clone())
        .await
        .unwrap();
    ctx.swapper
        .submit_results(MODEL_ID, results.clone())
        .await
        .unwrap();

    assert_eq!(ctx.queue.published_count(&results_queue).await, 2);
    let batches = ctx.drain_results().await;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].model_id, MODEL_ID);
    assert_eq!(batches[0].results, results);
}

#[tokio::test]
async fn test_consume_requests_requires_queue() {
    let ctx = TestContext::new();
    let err = ctx
        .swapper
        .consume_requests(MODEL_ID, false)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SwapperError::ModelNotFound { .. }));
}

#[tokio::test]
async fn test_consume_requests_redelivers_unacked() {
    let ctx = TestContext::new();
    ctx.provision(MODEL_ID).await;
    let first = ctx
        .swapper
        .submit_requests(MODEL_ID, vec![row(1, 1.0)])
        .await
        .unwrap();
    let second = ctx
        .swapper
        .submit_requests(MODEL_ID, vec![row(2, 2.0)])
        .await
        .unwrap();

    {
        let mut consumer = ctx.swapper.consume_requests(MODEL_ID, false).await.unwrap();
        let consumed = consumer.next().await.unwrap().unwrap();
        assert_eq!(consumed.batch.batch_id, first);
        consumed.ack.ack(false).await.unwrap();
        let consumed = consumer.next().await.unwrap().unwrap();
        assert_eq!(consumed.batch.batch_id, second);
        assert!(consumer.next().await.unwrap().is_none());
    }

    let mut consumer = ctx.swapper.consume_requests(MODEL_ID, false).await.unwrap();
    let consumed = consumer.next().await.unwrap().unwrap();
    assert_eq!(consumed.batch.batch_id, second);
}

#[tokio::test]
async fn test_undecodable_message_is_an_error() {
    let ctx = TestContext::new();
    ctx.provision(MODEL_ID).await;
    ctx.queue
        .publish(
            &ctx.swapper.input_queue_name(MODEL_ID),
            bytes::Bytes::from_static(b"batch-1\n[[\"bogus\"]]"),
            true,
        )
        .await
        .unwrap();

    let mut consumer = ctx.swapper.consume_requests(MODEL_ID, false).await.unwrap();
    let err = consumer.next().await.err().unwrap();
    assert!(matches!(err, SwapperError::Decode(_)));
}

#[tokio::test]
async fn test_models_with_input_pending() {
    let ctx = TestContext::new();
    for model_id in ["a", "b", "c"] {
        ctx.provision(model_id).await;
    }
    ctx.swapper
        .submit_requests("a", vec![row(1, 1.0)])
        .await
        .unwrap();
    ctx.swapper
        .submit_requests("c", vec![row(1, 1.0)])
        .await
        .unwrap();
    ctx.queue.create_queue("unrelated", true).await.unwrap();
    ctx.queue
        .publish("unrelated", bytes::Bytes::from_static(b"x"), true)
        .await
        .unwrap();

    let mut pending = ctx.swapper.get_models_with_input_pending().await.unwrap();
    pending.sort();
    assert_eq!(pending, vec!["a", "c"]);

    assert!(ctx.swapper.model_input_pending("a").await.unwrap());
    assert!(!ctx.swapper.model_input_pending("b").await.unwrap());
    assert!(!ctx.swapper.model_input_pending("missing").await.unwrap());
}

#[tokio::test]
async fn test_clone_model_targets_source_queue() {
    let ctx = TestContext::new();
    ctx.provision(MODEL_ID).await;

    ctx.swapper
        .clone_model(MODEL_ID, "model-2", "clone-1")
        .await
        .unwrap();

    assert!(
        ctx.queue
            .queue_exists(&ctx.swapper.input_queue_name("model-2"))
            .await
            .unwrap()
    );
    let pending = pending_requests(&ctx, MODEL_ID).await;
    let command = single_command(&pending[0]);
    assert_eq!(command.method, CommandMethod::CloneModel);
    assert_eq!(command.args.as_ref().unwrap()["modelID"], "model-2");
    assert!(pending_requests(&ctx, "model-2").await.is_empty());
}

#[tokio::test]
async fn test_clone_of_unknown_source() {
    let ctx = TestContext::new();
    let err = ctx
        .swapper
        .clone_model("nope", "model-2", "clone-1")
        .await
        .unwrap_err();
    assert!(matches!(err, SwapperError::ModelNotFound { .. }));
}

#[tokio::test]
async fn test_cleanup_after_model_deletion() {
    let ctx = TestContext::new();
    ctx.provision(MODEL_ID).await;

    ctx.swapper
        .cleanup_after_model_deletion(MODEL_ID)
        .await
        .unwrap();
    ctx.swapper
        .cleanup_after_model_deletion(MODEL_ID)
        .await
        .unwrap();
    assert!(
        !ctx.queue
            .queue_exists(&ctx.swapper.input_queue_name(MODEL_ID))
            .await
            .unwrap()
    );
}
