//! NATS JetStream consumer for trade events.
//!
//! Delivery is at-least-once; the trade-id conflict rule in the store makes
//! redelivered messages harmless. Handler outcomes map onto the broker
//! protocol: ingested/duplicate ack, invalid payloads terminate (no
//! redelivery), storage failures nak for redelivery up to the delivery cap.

use crate::db::Repository;
use crate::domain::{AccountType, Side};
use crate::ingest::event::TradeEvent;
use async_nats::jetstream::{self, AckKind};
use backoff::ExponentialBackoff;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// JetStream stream name for ledger trades.
pub const STREAM_NAME: &str = "LEDGER_TRADES";
/// Durable consumer name.
pub const CONSUMER_NAME: &str = "ledger-trade-consumer";
/// Default subject prefix; full subjects are
/// `<prefix><account>.<market_type>`.
pub const DEFAULT_SUBJECT_PREFIX: &str = "ledger.trades.";

const ACK_WAIT: Duration = Duration::from_secs(30);
const MAX_DELIVER: i64 = 5;
const STREAM_MAX_BYTES: i64 = 100 * 1024 * 1024;

/// Connect to NATS, retrying with exponential backoff until it succeeds.
pub async fn connect(url: &str) -> Result<async_nats::Client, async_nats::Error> {
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(100),
        max_interval: Duration::from_secs(30),
        max_elapsed_time: None,
        ..Default::default()
    };

    let url = url.to_string();
    let client = backoff::future::retry(policy, || {
        let url = url.clone();
        async move {
            let options = async_nats::ConnectOptions::new()
                .name("ledgerd")
                .event_callback(|event| async move {
                    match event {
                        async_nats::Event::Disconnected => warn!("disconnected from NATS"),
                        async_nats::Event::Connected => info!("reconnected to NATS"),
                        other => debug!("NATS event: {}", other),
                    }
                });
            options.connect(&url).await.map_err(|e| {
                warn!(error = %e, "NATS connect failed, retrying");
                backoff::Error::transient(e)
            })
        }
    })
    .await?;

    Ok(client)
}

/// Outcome of handling one trade event.
#[derive(Debug)]
pub enum EventOutcome {
    /// New trade inserted and position updated.
    Ingested,
    /// Trade id already in the log; nothing changed.
    Duplicate,
    /// Payload failed validation; not worth redelivering.
    Rejected(String),
    /// Transient storage failure; redelivery may succeed.
    Retry(sqlx::Error),
}

/// Process one validated-or-not trade event against the store.
///
/// Broker-independent so it can be exercised without a running NATS server;
/// the consumer loop only maps the outcome to an ack kind.
pub async fn handle_event(repo: &Repository, event: TradeEvent) -> EventOutcome {
    if let Err(e) = event.validate() {
        return EventOutcome::Rejected(e.to_string());
    }

    let account_id = event.account_id.clone();
    let mut trade = match event.into_trade() {
        Ok(trade) => trade,
        Err(e) => return EventOutcome::Rejected(e.to_string()),
    };

    if let Err(e) = repo
        .get_or_create_account(&account_id, AccountType::infer(&account_id))
        .await
    {
        return EventOutcome::Retry(e);
    }

    if trade.side == Side::Sell {
        let avg_entry = match repo
            .get_avg_entry_price(&trade.account_id, &trade.symbol, trade.market_type)
            .await
        {
            Ok(price) => price,
            Err(e) => return EventOutcome::Retry(e),
        };
        trade.stamp_economics(avg_entry);
    }

    match repo.insert_trade_and_update_position(&trade).await {
        Ok(true) => EventOutcome::Ingested,
        Ok(false) => EventOutcome::Duplicate,
        Err(e) => EventOutcome::Retry(e),
    }
}

/// Durable JetStream consumer of trade events.
pub struct Consumer {
    client: async_nats::Client,
    repo: Arc<Repository>,
    subject_prefix: String,
}

impl Consumer {
    pub fn new(client: async_nats::Client, repo: Arc<Repository>, subject_prefix: String) -> Self {
        Consumer {
            client,
            repo,
            subject_prefix,
        }
    }

    /// Consume trade events until the task is cancelled.
    ///
    /// Creates the stream and durable consumer if missing, then pulls
    /// messages indefinitely.
    pub async fn run(&self) -> Result<(), async_nats::Error> {
        let context = jetstream::new(self.client.clone());

        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: STREAM_NAME.to_string(),
                subjects: vec![format!("{}>", self.subject_prefix)],
                max_bytes: STREAM_MAX_BYTES,
                ..Default::default()
            })
            .await?;

        let consumer = stream
            .get_or_create_consumer(
                CONSUMER_NAME,
                jetstream::consumer::pull::Config {
                    durable_name: Some(CONSUMER_NAME.to_string()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    deliver_policy: jetstream::consumer::DeliverPolicy::All,
                    ack_wait: ACK_WAIT,
                    max_deliver: MAX_DELIVER,
                    ..Default::default()
                },
            )
            .await?;

        info!(stream = STREAM_NAME, "consuming trade events");

        let mut messages = consumer.messages().await?;
        while let Some(message) = messages.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "failed to pull message");
                    continue;
                }
            };
            self.handle_message(message).await;
        }

        info!("stopped consuming trade events");
        Ok(())
    }

    async fn handle_message(&self, message: jetstream::Message) {
        let subject = message.subject.clone();

        let event: TradeEvent = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(%subject, error = %e, "undecodable trade event, terminating");
                Self::finish(message, AckKind::Term).await;
                return;
            }
        };

        let trade_id = event.trade_id.clone();
        match handle_event(&self.repo, event).await {
            EventOutcome::Ingested => {
                info!(%trade_id, %subject, "ingested trade");
                Self::finish(message, AckKind::Ack).await;
            }
            EventOutcome::Duplicate => {
                debug!(%trade_id, "duplicate trade, skipped");
                Self::finish(message, AckKind::Ack).await;
            }
            EventOutcome::Rejected(reason) => {
                warn!(%trade_id, %subject, %reason, "invalid trade event, terminating");
                Self::finish(message, AckKind::Term).await;
            }
            EventOutcome::Retry(e) => {
                error!(%trade_id, error = %e, "storage failure, requesting redelivery");
                Self::finish(message, AckKind::Nak(None)).await;
            }
        }
    }

    async fn finish(message: jetstream::Message, kind: AckKind) {
        if let Err(e) = message.ack_with(kind).await {
            warn!(error = %e, "failed to acknowledge message");
        }
    }
}
