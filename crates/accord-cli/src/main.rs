use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::broadcast;

use accord_core::models::{Amount, CoreError, CoreErrorKind, Handle, Notification, TaskFlags};
use accord_core::registry::{
    CallContext, CallbackResult, CallbackTarget, PriceBook, QuorumRequest, RegistryConfig,
    TaskRegistry,
};
use accord_core::worker::{
    CompletionRequest, ComputeFuture, ComputeProvider, ContentStore, MemoryContentStore, Worker,
    WorkerConfig,
};

const WORKERS: &[&str] = &["worker.alpha", "worker.beta", "worker.gamma"];

struct DemoCallback;

impl CallbackTarget for DemoCallback {
    fn invoke(&self, method: &str, args: &Value, result: &str) -> CallbackResult {
        tracing::info!(method, args = %args, result, "result delivered to requester");
        Ok(())
    }
}

/// Stands in for the real compute provider: every model answers the same.
struct CannedProvider {
    answer: String,
}

impl ComputeProvider for CannedProvider {
    fn complete(&self, request: CompletionRequest) -> ComputeFuture {
        let answer = self.answer.clone();
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tracing::debug!(model = %request.model, "canned completion served");
            Ok(answer)
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accord=info,accord_core=info".into()),
        )
        .init();

    let owner = Handle::from("accord.owner");
    let service = Handle::from("accord.service");
    let requester = Handle::from("demo.requester");
    let originator = Handle::from("demo.user");

    let price_book = PriceBook::new(Some(Amount::from_units(1)))
        .with_variant_price("atlas/large", Amount::from_units(2));
    let registry = Arc::new(TaskRegistry::new(RegistryConfig {
        service,
        owner: owner.clone(),
        price_book,
    }));
    let mut events = registry.subscribe();

    let owner_ctx = CallContext::direct(owner);
    for name in WORKERS {
        registry.add_worker(&owner_ctx, Handle::from(*name))?;
    }
    registry.register_callback_target(requester.clone(), Arc::new(DemoCallback));

    let content = Arc::new(MemoryContentStore::new());
    let provider = Arc::new(CannedProvider {
        answer: "The computed value is <result> 42 </result>.".to_string(),
    });
    for name in WORKERS {
        let config = WorkerConfig::new(Handle::from(*name))
            .with_base_interval(Duration::from_millis(50));
        Worker::new(config, registry.clone(), provider.clone(), content.clone()).spawn();
    }

    let ctx = CallContext::relayed(requester, originator);

    let config_ref = content.put(
        "model: canned/echo\n\
         Evaluate the question and wrap the final value in a result tag.\n\
         Question: {{ question }}",
    )?;
    let spec = json!({
        "config": config_ref,
        "input": { "question": "What is 6 times 7?" },
        "redundancy": 2,
        "return_content_within_result_tag": true,
    });
    let task_id =
        registry.create_task(&ctx, Amount::from_units(2), &spec, "on_result", json!({}))?;
    tracing::info!(task_id = task_id.0, "redundancy task created");
    wait_for(&mut events, |notification| {
        matches!(notification, Notification::TaskFinalized { task_id: finalized } if *finalized == task_id)
    })
    .await?;

    let quorum_config_ref = content.put(
        "Answer plainly inside a result tag.\n\
         Question: {{ question }}",
    )?;
    let request = QuorumRequest {
        variants: vec![
            "atlas/large".to_string(),
            "borealis/medium".to_string(),
            "cirrus/small".to_string(),
        ],
        quorum_threshold: None,
        redundancy: 1,
        config_ref: quorum_config_ref,
        inputs: BTreeMap::from([(
            "question".to_string(),
            "What is 6 times 7?".to_string(),
        )]),
        callback_method: "on_quorum_result".to_string(),
        callback_args: json!({}),
        flags: TaskFlags {
            extract_result_tag: true,
            store_result_offchain: false,
        },
    };
    let quorum_task_id = registry.create_quorum_task(&ctx, Amount::from_units(4), request)?;
    tracing::info!(quorum_task_id = quorum_task_id.0, "quorum task created");
    wait_for(&mut events, |notification| {
        matches!(notification, Notification::QuorumReached { quorum_task_id: reached } if *reached == quorum_task_id)
    })
    .await?;

    tracing::info!("demo complete");
    Ok(())
}

async fn wait_for(
    events: &mut broadcast::Receiver<Notification>,
    wanted: impl Fn(&Notification) -> bool,
) -> Result<(), CoreError> {
    let outcome = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(notification) if wanted(&notification) => return Ok(()),
                Ok(_) => {}
                Err(error) => {
                    return Err(delivery_error(format!("notification stream ended: {error}")));
                }
            }
        }
    })
    .await;
    match outcome {
        Ok(result) => result,
        Err(_) => Err(delivery_error("timed out waiting for finalization")),
    }
}

fn delivery_error(message: impl Into<String>) -> CoreError {
    CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::Internal,
        message: message.into(),
    }
}
