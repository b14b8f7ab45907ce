//! Broker round-trip tests against a containerized RabbitMQ: delivery,
//! retry republishing with the attempt header, and dead-lettering.

use async_trait::async_trait;
use lapin::options::BasicGetOptions;
use messaging::{
    topology, BrokerConfig, ConsumerConfig, DeadLetter, IncomingMessage, MessageProcessor,
    Outcome, Publisher, QueueConsumer, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_utils::TestRabbitMq;
use tokio::sync::watch;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TestMessage {
    id: String,
    body: String,
}

/// Processor scripted by attempt number: the outcome for handling N is
/// `script[min(N, len-1)]`.
struct ScriptedProcessor {
    handled: AtomicU32,
    seen_retry_counts: std::sync::Mutex<Vec<u32>>,
    script: Vec<Outcome>,
    done: watch::Sender<bool>,
}

impl ScriptedProcessor {
    fn new(script: Vec<Outcome>) -> (Arc<Self>, watch::Receiver<bool>) {
        let (done, done_rx) = watch::channel(false);
        (
            Arc::new(Self {
                handled: AtomicU32::new(0),
                seen_retry_counts: std::sync::Mutex::new(Vec::new()),
                script,
                done,
            }),
            done_rx,
        )
    }

    fn handled(&self) -> u32 {
        self.handled.load(Ordering::SeqCst)
    }

    fn retry_counts(&self) -> Vec<u32> {
        self.seen_retry_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageProcessor for ScriptedProcessor {
    async fn process(&self, message: &IncomingMessage) -> Outcome {
        let n = self.handled.fetch_add(1, Ordering::SeqCst) as usize;
        self.seen_retry_counts
            .lock()
            .unwrap()
            .push(message.retry_count);

        let outcome = self.script[n.min(self.script.len() - 1)].clone();

        // Signal completion when the script reaches a settling outcome
        if matches!(outcome, Outcome::Ack | Outcome::Dead { .. }) {
            let _ = self.done.send(true);
        }

        outcome
    }

    fn name(&self) -> &'static str {
        "scripted-processor"
    }
}

async fn run_consumer_until_done(
    broker: &TestRabbitMq,
    processor: Arc<ScriptedProcessor>,
    mut done: watch::Receiver<bool>,
) {
    let connection = broker.connect().await;
    let config = BrokerConfig::new(broker.connection_string());

    // Topology is declared by the publisher-side connect in each test
    let consumer = QueueConsumer::new(
        &connection,
        ConsumerConfig::from_broker_config(
            topology::EMAIL_QUEUE,
            "test-consumer",
            &config,
            RetryPolicy::new(3, Duration::from_millis(50), Duration::from_millis(200)),
        ),
    )
    .await
    .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let run = tokio::spawn(async move {
        let _ = consumer.run(processor, shutdown_rx).await;
    });

    tokio::time::timeout(Duration::from_secs(30), done.changed())
        .await
        .expect("processor did not settle in time")
        .unwrap();

    // Give the final ack a moment to reach the broker, then stop
    tokio::time::sleep(Duration::from_millis(250)).await;
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(35), run).await;
}

#[tokio::test]
#[ignore] // Requires Docker
async fn message_is_delivered_and_acked() {
    let broker = TestRabbitMq::new().await;

    let connection = messaging::connect(&BrokerConfig::new(broker.connection_string()))
        .await
        .unwrap();
    let publisher = Publisher::new(&connection).await.unwrap();

    publisher
        .publish_json(
            topology::EMAIL_QUEUE,
            &TestMessage {
                id: "m1".to_string(),
                body: "hello".to_string(),
            },
        )
        .await
        .unwrap();

    let (processor, done) = ScriptedProcessor::new(vec![Outcome::Ack]);
    run_consumer_until_done(&broker, Arc::clone(&processor), done).await;

    assert_eq!(processor.handled(), 1);
    assert_eq!(processor.retry_counts(), vec![0]);

    // Settled: nothing left on the queue
    let channel = connection.create_channel().await.unwrap();
    let leftover = channel
        .basic_get(topology::EMAIL_QUEUE, BasicGetOptions { no_ack: true })
        .await
        .unwrap();
    assert!(leftover.is_none());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn retry_republishes_with_incremented_attempt_header() {
    let broker = TestRabbitMq::new().await;

    let connection = messaging::connect(&BrokerConfig::new(broker.connection_string()))
        .await
        .unwrap();
    let publisher = Publisher::new(&connection).await.unwrap();

    publisher
        .publish_json(
            topology::EMAIL_QUEUE,
            &TestMessage {
                id: "m2".to_string(),
                body: "retry me".to_string(),
            },
        )
        .await
        .unwrap();

    let (processor, done) = ScriptedProcessor::new(vec![
        Outcome::Retry {
            reason: "transient".to_string(),
        },
        Outcome::Retry {
            reason: "transient".to_string(),
        },
        Outcome::Ack,
    ]);
    run_consumer_until_done(&broker, Arc::clone(&processor), done).await;

    assert_eq!(processor.handled(), 3);
    // Each republish carried the incremented attempt count
    assert_eq!(processor.retry_counts(), vec![0, 1, 2]);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn dead_outcome_lands_in_failed_queue() {
    let broker = TestRabbitMq::new().await;

    let connection = messaging::connect(&BrokerConfig::new(broker.connection_string()))
        .await
        .unwrap();
    let publisher = Publisher::new(&connection).await.unwrap();

    publisher
        .publish_json(
            topology::EMAIL_QUEUE,
            &TestMessage {
                id: "m3".to_string(),
                body: "doomed".to_string(),
            },
        )
        .await
        .unwrap();

    let (processor, done) = ScriptedProcessor::new(vec![Outcome::Dead {
        reason: "unrecoverable".to_string(),
    }]);
    run_consumer_until_done(&broker, Arc::clone(&processor), done).await;

    assert_eq!(processor.handled(), 1);

    let channel = connection.create_channel().await.unwrap();
    let delivery = channel
        .basic_get(topology::FAILED_QUEUE, BasicGetOptions { no_ack: true })
        .await
        .unwrap()
        .expect("dead letter should be on failed.queue");

    let dead: DeadLetter = serde_json::from_slice(&delivery.data).unwrap();
    assert_eq!(dead.failure_reason, "unrecoverable");
    assert_eq!(dead.original_message["id"], "m3");
    assert!(!dead.failed_at.is_empty());
}
